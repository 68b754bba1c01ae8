use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::{ConversionBackend, ConversionRequest, ConversionToken, JobHandle, OutputFormat};
use crate::ConvertError;

/// Drives a running relay over HTTP, the way the browser front end does
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConvertError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST a JSON body; the status decides between payload and failure envelope
    async fn post(&self, path: &str, body: &Value) -> Result<Result<Value, String>, ConvertError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let body: Value = serde_json::from_str(&text)
            .map_err(|_| ConvertError::PollParse(format!("relay returned non-JSON body from {}", path)))?;

        Ok(unwrap_envelope(status, body))
    }
}

/// Split a relay response into its payload or its error message.
///
/// Only a non-success status marks a relay failure. A 2xx body is the
/// payload even when it carries `success: false` or `error`.
fn unwrap_envelope(status: StatusCode, body: Value) -> Result<Value, String> {
    if status.is_success() {
        return Ok(body);
    }

    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("relay answered HTTP {}", status));
    Err(message)
}

#[async_trait]
impl ConversionBackend for RelayClient {
    async fn acquire_token(
        &self,
        source_url: &str,
        format: OutputFormat,
    ) -> Result<ConversionToken, ConvertError> {
        let body = self
            .post("/api/get-token", &json!({ "url": source_url, "format": format }))
            .await
            .map_err(|e| ConvertError::TokenExtraction(e.to_string()))?
            .map_err(ConvertError::TokenExtraction)?;
        let token = body
            .get("token")
            .cloned()
            .ok_or_else(|| ConvertError::TokenExtraction("relay response has no token".to_string()))?;

        serde_json::from_value(token).map_err(|e| ConvertError::TokenExtraction(e.to_string()))
    }

    async fn submit_job(
        &self,
        request: &ConversionRequest,
        token: &ConversionToken,
    ) -> Result<JobHandle, ConvertError> {
        let payload = json!({
            "url": request.source_url,
            "token": token,
            "format": request.output_format,
            "quality": request.quality_hint,
        });

        let body = self
            .post("/api/start-convert", &payload)
            .await
            .map_err(|e| ConvertError::JobSubmission(e.to_string()))?
            .map_err(ConvertError::JobSubmission)?;

        match body.get("jobId") {
            Some(Value::String(id)) if !id.is_empty() => Ok(JobHandle { job_id: id.clone() }),
            Some(Value::Number(n)) => Ok(JobHandle { job_id: n.to_string() }),
            _ => Err(ConvertError::JobSubmission("job id not found".to_string())),
        }
    }

    async fn poll_job(
        &self,
        job: &JobHandle,
        token: &ConversionToken,
        format: OutputFormat,
    ) -> Result<Value, ConvertError> {
        let payload = json!({
            "jobId": job.job_id,
            "token": token,
            "format": format,
        });

        // A relay-side failure means upstream sent noise or was unreachable.
        // Upstream's own `error` field arrives with a 2xx and passes through.
        self.post("/api/poll-convert", &payload)
            .await?
            .map_err(ConvertError::PollParse)
    }

    fn backend_name(&self) -> &'static str {
        "relay"
    }
}
