//! Shared helpers: a scripted fake of the conversion service and small
//! request/response utilities for the relay router.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use convert_relay::config::{ServerConfig, UpstreamConfig};
use convert_relay::relay::{self, AppState};
use convert_relay::upstream::ConversionBackend;

pub const TOKEN_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<script>
    var converter = {
        'token_id': 'tok-123',
        'token_validto': '1717171717',
    };
</script>
</body></html>"#;

pub const OEMBED_BODY: &str = r#"{"title":"Never Gonna Give You Up! (Official Video)","author_name":"Rick Astley","thumbnail_url":"https://i.ytimg.com/vi/abc12345678/hqdefault.jpg","type":"video"}"#;

pub const READY_BODY: &str = r#"{"ready":true,"dlurl":"https://x/y.mp3"}"#;
pub const PENDING_BODY: &str = r#"{"ready":false,"progress":10}"#;

/// What the fake service answers
#[derive(Clone, Debug)]
pub struct UpstreamScript {
    pub set_cookie: Option<String>,
    pub page: String,
    pub submit_body: String,
    /// Answer for the n-th poll; the last entry repeats
    pub poll_bodies: Vec<String>,
    /// oEmbed answer; `None` answers 404
    pub oembed_body: Option<String>,
}

impl Default for UpstreamScript {
    fn default() -> Self {
        Self {
            set_cookie: Some("PHPSESSID=sess-1; path=/; HttpOnly".to_string()),
            page: TOKEN_PAGE.to_string(),
            submit_body: r#"{"jobid":"J1"}"#.to_string(),
            poll_bodies: vec![READY_BODY.to_string()],
            oembed_body: Some(OEMBED_BODY.to_string()),
        }
    }
}

impl UpstreamScript {
    pub fn with_polls(mut self, bodies: &[&str]) -> Self {
        self.poll_bodies = bodies.iter().map(|b| b.to_string()).collect();
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub form: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct Recorded {
    token_requests: Vec<RecordedRequest>,
    submissions: Vec<RecordedRequest>,
    polls: Vec<RecordedRequest>,
    metadata_requests: Vec<RecordedRequest>,
}

#[derive(Clone)]
struct FakeState {
    script: Arc<UpstreamScript>,
    recorded: Arc<Mutex<Recorded>>,
}

/// Fake conversion service listening on an ephemeral port
pub struct FakeUpstream {
    pub base_url: String,
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeUpstream {
    pub async fn start(script: UpstreamScript) -> Self {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = FakeState {
            script: Arc::new(script),
            recorded: Arc::clone(&recorded),
        };

        let router = Router::new()
            .route("/button/", get(token_page))
            .route("/vidbutton/", get(token_page))
            .route("/convert/", get(poll).post(submit))
            .route("/vidconvert/", get(poll).post(submit))
            .route("/oembed", get(oembed))
            .with_state(state);

        Self {
            base_url: serve(router).await,
            recorded,
        }
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.base_url.clone(),
            request_timeout_secs: 5,
            oembed_url: self.oembed_url(),
            ..UpstreamConfig::default()
        }
    }

    pub fn oembed_url(&self) -> String {
        format!("{}/oembed", self.base_url)
    }

    pub fn metadata_requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().metadata_requests.clone()
    }

    pub fn token_requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().token_requests.clone()
    }

    pub fn submissions(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().submissions.clone()
    }

    pub fn polls(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().polls.clone()
    }
}

fn record(uri: &Uri, headers: &HeaderMap, query: HashMap<String, String>, form: HashMap<String, String>) -> RecordedRequest {
    RecordedRequest {
        path: uri.path().to_string(),
        query,
        headers: headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect(),
        form,
    }
}

async fn token_page(
    State(state): State<FakeState>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state
        .recorded
        .lock()
        .unwrap()
        .token_requests
        .push(record(&uri, &headers, query, HashMap::new()));

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=UTF-8")],
        state.script.page.clone(),
    )
        .into_response();

    response
        .headers_mut()
        .append(header::SET_COOKIE, HeaderValue::from_static("lang=en; path=/"));
    if let Some(cookie) = &state.script.set_cookie {
        response
            .headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
    }
    response
}

async fn submit(
    State(state): State<FakeState>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state
        .recorded
        .lock()
        .unwrap()
        .submissions
        .push(record(&uri, &headers, HashMap::new(), form));

    (
        [(header::CONTENT_TYPE, "text/html; charset=UTF-8")],
        state.script.submit_body.clone(),
    )
        .into_response()
}

async fn poll(
    State(state): State<FakeState>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let index = {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.polls.push(record(&uri, &headers, query, HashMap::new()));
        recorded.polls.len() - 1
    };

    let bodies = &state.script.poll_bodies;
    let body = bodies
        .get(index)
        .or_else(|| bodies.last())
        .cloned()
        .unwrap_or_default();

    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn oembed(
    State(state): State<FakeState>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state
        .recorded
        .lock()
        .unwrap()
        .metadata_requests
        .push(record(&uri, &headers, query, HashMap::new()));

    match &state.script.oembed_body {
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Serve a router on 127.0.0.1 and return its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Relay router over any backend, default server settings
pub fn relay_app(backend: Arc<dyn ConversionBackend>) -> Router {
    relay::build_router(
        AppState::new(backend, reqwest::Client::new()),
        &ServerConfig::default(),
    )
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_request(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
