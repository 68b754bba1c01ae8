//! Convert Relay - drives a third-party YouTube to MP3/MP4 conversion service
//!
//! The crate has three layers: a client for the remote conversion service
//! ([`upstream::UpstreamClient`]), an HTTP relay that exposes the same three
//! operations to a browser ([`relay`]), and an orchestrator that runs one
//! conversion attempt end to end with bounded polling ([`orchestrator`]).

pub mod cli;
pub mod config;
pub mod metadata;
pub mod orchestrator;
pub mod output;
pub mod relay;
pub mod upstream;
pub mod utils;

pub use cli::{Cli, Commands, ReportFormat};
pub use config::Config;
pub use metadata::VideoMetadata;
pub use orchestrator::{AttemptState, Conversion, Orchestrator, PollPolicy};
pub use upstream::{
    ConversionBackend, ConversionRequest, ConversionResult, ConversionToken, JobHandle,
    OutputFormat,
};

/// Result type used at the application edges
pub type Result<T> = anyhow::Result<T>;

/// Errors raised while running the token / job / poll workflow
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("Invalid conversion request: {0}")]
    InvalidRequest(String),

    #[error("Failed to fetch video info: {0}")]
    Metadata(String),

    #[error("Failed to get token: {0}")]
    TokenExtraction(String),

    #[error("Failed to start conversion: {0}")]
    JobSubmission(String),

    #[error("Poll response is not JSON: {0}")]
    PollParse(String),

    #[error("Conversion failed: {0}")]
    UpstreamReported(String),

    #[error("Conversion timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ConvertError {
    /// Poll-loop noise that should be retried rather than surfaced
    pub fn is_transient(&self) -> bool {
        matches!(self, ConvertError::PollParse(_) | ConvertError::Http(_))
    }
}
