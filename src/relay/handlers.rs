use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::Response;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{AppState, RelayError, RelayResult};
use crate::upstream::{ConversionRequest, ConversionToken, JobHandle, OutputFormat};
use crate::ConvertError;

type Payload = Result<Json<Value>, JsonRejection>;

/// Body of `get-token`
#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub url: String,
    pub format: OutputFormat,
}

/// Body of `start-convert`
#[derive(Debug, Deserialize)]
pub struct StartConvertBody {
    pub url: String,
    pub token: ConversionToken,
    pub format: OutputFormat,
    #[serde(default)]
    pub quality: Option<String>,
}

/// Body of `poll-convert`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollBody {
    #[serde(alias = "jobid")]
    pub job_id: String,
    pub token: ConversionToken,
    pub format: OutputFormat,
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_token(State(state): State<AppState>, payload: Payload) -> RelayResult<Json<Value>> {
    let body = parse_body(payload)?;
    acquire_token(&state, body).await.map(Json)
}

pub async fn start_convert(State(state): State<AppState>, payload: Payload) -> RelayResult<Json<Value>> {
    let body = parse_body(payload)?;
    submit_job(&state, body).await.map(Json)
}

pub async fn poll_convert(State(state): State<AppState>, payload: Payload) -> RelayResult<Json<Value>> {
    let body = parse_body(payload)?;
    poll_job(&state, body).await.map(Json)
}

/// Single endpoint selecting the operation by its `action` field
pub async fn dispatch(State(state): State<AppState>, payload: Payload) -> RelayResult<Json<Value>> {
    let Json(value) = payload.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let result = match action.as_str() {
        "get-token" => acquire_token(&state, from_value(value)?).await,
        "start-convert" => submit_job(&state, from_value(value)?).await,
        "poll-convert" => poll_job(&state, from_value(value)?).await,
        other => {
            tracing::debug!(action = other, "Rejecting unknown action");
            Err(RelayError::BadRequest("Invalid action".to_string()))
        }
    };

    result.map(Json)
}

/// Stream a finished file through the relay so the browser avoids CORS
pub async fn proxy_download(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> RelayResult<Response> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| RelayError::BadRequest("URL not provided".to_string()))?;

    crate::utils::validate_url(&url).map_err(|e| RelayError::BadRequest(e.to_string()))?;

    let upstream = state
        .http
        .get(&url)
        .send()
        .await
        .map_err(ConvertError::from)?;

    if !upstream.status().is_success() {
        return Err(RelayError::Upstream(format!(
            "Failed to download file: HTTP {}",
            upstream.status()
        )));
    }

    let header = |name: reqwest::header::HeaderName| {
        upstream
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let content_type = header(reqwest::header::CONTENT_TYPE)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = header(reqwest::header::CONTENT_DISPOSITION);

    let mut builder = Response::builder().header(CONTENT_TYPE, content_type);
    if let Some(disposition) = disposition {
        builder = builder.header(CONTENT_DISPOSITION, disposition);
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| RelayError::Internal(e.to_string()))
}

async fn acquire_token(state: &AppState, body: TokenBody) -> RelayResult<Value> {
    let request = ConversionRequest::new(body.url.trim(), body.format);
    request.validate()?;

    let token = state
        .backend
        .acquire_token(&request.source_url, request.output_format)
        .await?;

    Ok(json!({ "success": true, "token": token }))
}

async fn submit_job(state: &AppState, body: StartConvertBody) -> RelayResult<Value> {
    let mut request = ConversionRequest::new(body.url.trim(), body.format);
    request.quality_hint = body.quality;
    request.validate()?;

    let job = state.backend.submit_job(&request, &body.token).await?;

    Ok(json!({ "success": true, "jobId": job.job_id }))
}

/// Upstream's body is returned as-is, without an envelope
async fn poll_job(state: &AppState, body: PollBody) -> RelayResult<Value> {
    if body.job_id.trim().is_empty() {
        return Err(RelayError::BadRequest("jobId is required".to_string()));
    }

    let job = JobHandle {
        job_id: body.job_id,
    };

    Ok(state.backend.poll_job(&job, &body.token, body.format).await?)
}

fn parse_body<T: DeserializeOwned>(payload: Payload) -> RelayResult<T> {
    let Json(value) = payload.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    from_value(value)
}

fn from_value<T: DeserializeOwned>(value: Value) -> RelayResult<T> {
    serde_json::from_value(value)
        .map_err(|e| RelayError::BadRequest(format!("Invalid request body: {}", e)))
}
