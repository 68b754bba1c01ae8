use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::cli::ReportFormat;
use crate::metadata::VideoMetadata;
use crate::orchestrator::{AttemptState, Conversion};
use crate::utils::{format_duration, format_file_size};

#[derive(Serialize)]
struct Report<'a> {
    video: &'a VideoMetadata,
    #[serde(flatten)]
    conversion: &'a Conversion,
}

/// Render a finished conversion with the video it came from
pub fn render(conversion: &Conversion, video: &VideoMetadata, format: &ReportFormat) -> Result<String> {
    let content = match format {
        ReportFormat::Text => {
            let mut text = format!(
                "{} Ready after {} status checks ({})\n",
                style("✓").green().bold(),
                conversion.polls,
                format_duration(conversion.elapsed_secs),
            );
            text.push_str(&format!("  Title: {}\n", video.title));
            if !video.author_name.is_empty() {
                text.push_str(&format!("  Author: {}\n", video.author_name));
            }
            if !video.thumbnail_url.is_empty() {
                text.push_str(&format!("  Thumbnail: {}\n", video.thumbnail_url));
            }
            text.push_str(&conversion.download_url);
            text
        }
        ReportFormat::Json => serde_json::to_string_pretty(&Report { video, conversion })?,
    };

    Ok(content)
}

/// Print a finished conversion to the console
pub fn print_to_console(conversion: &Conversion, video: &VideoMetadata, format: &ReportFormat) -> Result<()> {
    println!("{}", render(conversion, video, format)?);
    Ok(())
}

pub fn print_download_summary(path: &Path, bytes: u64) {
    println!(
        "{} Saved {} to {}",
        style("✓").green().bold(),
        format_file_size(bytes),
        path.display()
    );
}

/// Spinner that mirrors orchestrator state transitions
pub fn state_spinner(quiet: bool) -> Result<(ProgressBar, impl Fn(&AttemptState) + Send + Sync + 'static)> {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };

    let handle = progress.clone();
    let observer = move |state: &AttemptState| {
        if state.is_terminal() {
            handle.finish_with_message(state.to_string());
        } else {
            handle.set_message(state.to_string());
        }
    };

    Ok((progress, observer))
}
