use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::upstream::OutputFormat;

#[derive(Parser)]
#[command(
    name = "convert-relay",
    about = "Convert Relay - turn YouTube links into MP3/MP4 downloads through a third-party converter",
    version,
    long_about = "Runs an HTTP relay that forwards token, job and status calls to a third-party conversion service, or drives a single conversion from the command line with bounded polling."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay API server
    Serve {
        /// Bind address (overrides config and HOST)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Bind port (overrides config and PORT)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Convert one video and print the download link
    Convert {
        /// Video URL to convert
        #[arg(value_name = "URL")]
        url: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "audio")]
        format: OutputFormat,

        /// Video quality hint such as 720 (ignored for audio; "best" lets upstream choose)
        #[arg(long, value_name = "QUALITY", default_value = crate::upstream::BEST_QUALITY)]
        quality: String,

        /// Go through a running relay instead of calling upstream directly
        #[arg(long, value_name = "BASE_URL", env = "CONVERT_RELAY_URL")]
        relay: Option<String>,

        /// Download the converted file to this path (file or directory)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// How to print the result
        #[arg(short, long, value_enum, default_value = "text")]
        report: ReportFormat,
    },

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the current configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    /// Plain text
    Text,
    /// JSON
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}
