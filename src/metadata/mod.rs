//! Video details from the oEmbed endpoint.
//!
//! Looked up before a conversion starts; the title names the saved file.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::upstream::OutputFormat;
use crate::utils::title_file_name;
use crate::ConvertError;

static RE_VIDEO_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*((youtu.be/)|(v/)|(/u/\w/)|(embed/)|(watch\?))\??v?=?([^#&?]*).*").unwrap()
});

/// Eleven-character YouTube video id, if the link carries one
pub fn video_id(url: &str) -> Option<String> {
    RE_VIDEO_ID
        .captures(url.trim())
        .and_then(|caps| caps.get(7))
        .map(|m| m.as_str())
        .filter(|id| id.len() == 11)
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,

    #[serde(default)]
    pub author_name: String,

    #[serde(default)]
    pub thumbnail_url: String,
}

impl VideoMetadata {
    /// File name derived from the title, e.g. `Some Title.mp3`
    pub fn file_name(&self, format: OutputFormat) -> Option<String> {
        title_file_name(&self.title, format)
    }
}

pub struct MetadataClient {
    client: Client,
    oembed_url: String,
}

impl MetadataClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ConvertError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            oembed_url: config.oembed_url.clone(),
        })
    }

    pub async fn fetch(&self, source_url: &str) -> Result<VideoMetadata, ConvertError> {
        let id = video_id(source_url)
            .ok_or_else(|| ConvertError::Metadata("not a YouTube video link".to_string()))?;
        let watch_url = format!("https://www.youtube.com/watch?v={}", id);

        tracing::debug!("Fetching oEmbed metadata for {}", id);

        let response = self
            .client
            .get(&self.oembed_url)
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| ConvertError::Metadata(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConvertError::Metadata(format!("HTTP {}", response.status())));
        }

        let metadata: VideoMetadata = response
            .json()
            .await
            .map_err(|e| ConvertError::Metadata(e.to_string()))?;

        tracing::info!("Video: {} ({})", metadata.title, metadata.author_name);
        Ok(metadata)
    }
}
