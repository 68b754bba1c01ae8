use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::io::Write;
use std::path::Path;

/// Stream a finished conversion to `output_path`, returning bytes written
pub async fn download_file(
    client: &Client,
    download_url: &str,
    output_path: &Path,
    show_progress: bool,
) -> Result<u64> {
    tracing::info!("Downloading {} to {}", download_url, output_path.display());

    let response = client
        .get(download_url)
        .send()
        .await
        .context("Failed to request converted file")?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to download file: HTTP {}", response.status());
    }

    let progress = if show_progress {
        let bar = ProgressBar::new(response.content_length().unwrap_or(0));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?,
        );
        bar.set_message("Downloading...");
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut file = fs_err::File::create(output_path)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    let written: Result<()> = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download interrupted")?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }
        file.flush()?;
        Ok(())
    }
    .await;

    if let Err(e) = written {
        drop(file);
        progress.abandon_with_message("Download failed");
        // No partial file is left behind
        if let Err(remove_err) = fs_err::remove_file(output_path) {
            tracing::warn!("Failed to remove partial download: {}", remove_err);
        }
        return Err(e);
    }

    progress.finish_with_message("Download complete");

    Ok(downloaded)
}
