use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod client;
pub mod relay_client;
pub mod scrape;

pub use client::UpstreamClient;
pub use relay_client::RelayClient;

use crate::ConvertError;

/// Output container requested from the conversion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MP3 audio
    #[serde(alias = "mp3")]
    #[value(alias = "mp3")]
    Audio,
    /// MP4 video
    #[serde(alias = "mp4")]
    #[value(alias = "mp4")]
    Video,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Audio => "audio",
            OutputFormat::Video => "video",
        }
    }

    /// Page that embeds the session token for this format
    pub fn token_page(&self) -> &'static str {
        match self {
            OutputFormat::Audio => "button",
            OutputFormat::Video => "vidbutton",
        }
    }

    /// Endpoint used both to start and to poll a job
    pub fn job_endpoint(&self) -> &'static str {
        match self {
            OutputFormat::Audio => "convert",
            OutputFormat::Video => "vidconvert",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Audio => "mp3",
            OutputFormat::Video => "mp4",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short-lived credential issued by the upstream token page.
///
/// Only valid for the attempt that acquired it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionToken {
    /// `PHPSESSID` cookie value
    #[serde(alias = "phpsessid")]
    pub session_id: String,

    pub token_id: String,

    pub valid_to: String,
}

/// Identifier of one remote conversion task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    #[serde(alias = "jobid")]
    pub job_id: String,
}

/// Quality hint meaning "let upstream choose"; never forwarded
pub const BEST_QUALITY: &str = "best";

/// Caller-supplied description of one conversion attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub source_url: String,

    pub output_format: OutputFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_hint: Option<String>,
}

impl ConversionRequest {
    pub fn new(source_url: impl Into<String>, output_format: OutputFormat) -> Self {
        Self {
            source_url: source_url.into(),
            output_format,
            quality_hint: None,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality_hint = Some(quality.into());
        self
    }

    /// Quality value to send upstream, if any.
    ///
    /// Only video jobs carry a quality, and never the `best` sentinel.
    pub fn upstream_quality(&self) -> Option<&str> {
        match (self.output_format, self.quality_hint.as_deref()) {
            (OutputFormat::Video, Some(q)) if !q.is_empty() && q != BEST_QUALITY => Some(q),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        crate::utils::validate_url(self.source_url.trim())
            .map(|_| ())
            .map_err(|e| ConvertError::InvalidRequest(e.to_string()))
    }
}

/// Field names the upstream has used for the finished file URL.
///
/// `dlurl` is treated as canonical; the others are compatibility aliases.
pub const DOWNLOAD_URL_KEYS: [&str; 3] = ["dlurl", "dlUrl", "downloadUrl"];

/// Typed view over one poll response.
///
/// The upstream body has no schema, so every field is looked up and
/// validated individually. The raw body is what the relay hands back.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub ready: bool,
    pub download_url: Option<String>,
    pub progress: Option<f64>,
    pub error: Option<String>,
}

impl ConversionResult {
    pub fn from_value(body: &Value) -> Self {
        let ready = body.get("ready").is_some_and(is_ready_flag);

        let download_url = DOWNLOAD_URL_KEYS
            .iter()
            .filter_map(|key| body.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|url| !url.is_empty())
            .map(str::to_string);

        let progress = body.get("progress").and_then(|p| match p {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        });

        let error = body.get("error").filter(|e| is_truthy(e)).map(|e| match e {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

        Self {
            ready,
            download_url,
            progress,
            error,
        }
    }

    /// Ready and carrying a usable download URL
    pub fn is_complete(&self) -> bool {
        self.ready && self.download_url.is_some()
    }
}

/// JavaScript truthiness: only `null`, `false`, `0` and `""` are falsy
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `ready` also arrives as `"true"` / `"1"` from some upstream revisions
fn is_ready_flag(value: &Value) -> bool {
    match value {
        Value::String(s) => matches!(s.trim(), "true" | "1"),
        other => is_truthy(other),
    }
}

/// The three remote operations the orchestrator drives.
///
/// Implemented directly against upstream by [`UpstreamClient`] and through
/// a running relay by [`RelayClient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Obtain a session token for one attempt
    async fn acquire_token(
        &self,
        source_url: &str,
        format: OutputFormat,
    ) -> Result<ConversionToken, ConvertError>;

    /// Start a conversion job
    async fn submit_job(
        &self,
        request: &ConversionRequest,
        token: &ConversionToken,
    ) -> Result<JobHandle, ConvertError>;

    /// Fetch the job status; the body is returned verbatim
    async fn poll_job(
        &self,
        job: &JobHandle,
        token: &ConversionToken,
        format: OutputFormat,
    ) -> Result<Value, ConvertError>;

    /// Name used in logs
    fn backend_name(&self) -> &'static str;
}
