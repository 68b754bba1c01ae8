use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, ORIGIN, REFERER, SET_COOKIE};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{scrape, ConversionBackend, ConversionRequest, ConversionToken, JobHandle, OutputFormat};
use crate::config::UpstreamConfig;
use crate::ConvertError;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json, text/javascript, */*; q=0.01";

/// Client for the third-party conversion service.
///
/// Every request carries the browser-like headers the service gates on:
/// user agent, referer, session cookie and the AJAX marker.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    accept_language: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ConvertError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            accept_language: config.accept_language.clone(),
        })
    }

    /// Token page for a format, e.g. `https://host/button/?url=...`
    fn token_page_url(&self, source_url: &str, format: OutputFormat) -> String {
        format!(
            "{}/{}/?url={}",
            self.base_url,
            format.token_page(),
            urlencoding::encode(source_url)
        )
    }

    fn job_url(&self, format: OutputFormat) -> String {
        format!("{}/{}/", self.base_url, format.job_endpoint())
    }

    fn session_cookie(token: &ConversionToken) -> String {
        format!("PHPSESSID={}", token.session_id)
    }
}

#[async_trait]
impl ConversionBackend for UpstreamClient {
    async fn acquire_token(
        &self,
        source_url: &str,
        format: OutputFormat,
    ) -> Result<ConversionToken, ConvertError> {
        let url = self.token_page_url(source_url, format);
        tracing::debug!("Requesting token page: {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, self.accept_language.as_str())
            .header(REFERER, format!("{}/", self.base_url))
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Dest", "document")
            .send()
            .await?;

        let status = response.status();
        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        let html = response.text().await?;

        tracing::debug!(%status, cookies = cookies.len(), bytes = html.len(), "Token page received");

        scrape::extract_token(cookies.iter().map(String::as_str), &html)
    }

    async fn submit_job(
        &self,
        request: &ConversionRequest,
        token: &ConversionToken,
    ) -> Result<JobHandle, ConvertError> {
        let format = request.output_format;
        let mut form = vec![
            ("url", request.source_url.as_str()),
            ("convert", "gogogo"),
            ("token_id", token.token_id.as_str()),
            ("token_validto", token.valid_to.as_str()),
        ];
        if let Some(quality) = request.upstream_quality() {
            form.push(("quality", quality));
        }

        tracing::debug!("Submitting {} job for {}", format, request.source_url);

        let response = self
            .client
            .post(self.job_url(format))
            .header(ACCEPT, ACCEPT_JSON)
            .header(ORIGIN, self.base_url.as_str())
            .header(REFERER, self.token_page_url(&request.source_url, format))
            .header(COOKIE, Self::session_cookie(token))
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Dest", "empty")
            .form(&form)
            .send()
            .await
            .map_err(|e| ConvertError::JobSubmission(e.to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|e| ConvertError::JobSubmission(e.to_string()))?;

        let body: Value = serde_json::from_str(&text)
            .map_err(|_| ConvertError::JobSubmission("response is not JSON".to_string()))?;

        match scrape::job_id(&body) {
            Some(job_id) => Ok(JobHandle { job_id }),
            None => {
                let reason = body
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|e| !e.is_empty())
                    .unwrap_or("job id not found");
                Err(ConvertError::JobSubmission(reason.to_string()))
            }
        }
    }

    async fn poll_job(
        &self,
        job: &JobHandle,
        token: &ConversionToken,
        format: OutputFormat,
    ) -> Result<Value, ConvertError> {
        let time = chrono::Utc::now().timestamp_millis().to_string();

        let response = self
            .client
            .get(self.job_url(format))
            .query(&[("jobid", job.job_id.as_str()), ("time", time.as_str())])
            .header(ACCEPT, ACCEPT_JSON)
            .header(REFERER, format!("{}/", self.base_url))
            .header(COOKIE, Self::session_cookie(token))
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;

        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::debug!("Non-JSON poll body for job {}: {:.120}", job.job_id, text);
            ConvertError::PollParse(e.to_string())
        })
    }

    fn backend_name(&self) -> &'static str {
        "upstream"
    }
}
