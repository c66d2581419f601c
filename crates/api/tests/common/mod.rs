#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::Notify;
use tower::ServiceExt;

use scribeflow_api::config::ServerConfig;
use scribeflow_api::router::build_app_router;
use scribeflow_api::state::AppState;
use scribeflow_pipeline::{
    ContentGenerator, GenerationError, LogSink, StepContext, TemplateGenerator,
};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:3000` as CORS origin (matching the dev default),
/// a 30-second request timeout and a 5-second step timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        step_timeout_secs: 5,
        log_retention: 500,
        step_delay_ms: 0,
    }
}

/// State backed by `generator`.
pub fn test_state(generator: Arc<dyn ContentGenerator>) -> AppState {
    AppState::new(test_config(), generator)
}

/// State backed by the built-in generator with no pacing.
pub fn instant_state() -> AppState {
    test_state(Arc::new(TemplateGenerator::new(Duration::ZERO)))
}

/// Build the full application router with all middleware layers.
///
/// Uses the same builder as `main.rs` so integration tests exercise the same
/// middleware stack (CORS, request ID, timeout, tracing, panic recovery)
/// that production uses.
pub fn build_test_app(state: AppState) -> Router {
    build_app_router(state, &test_config())
}

/// Serve the app on an ephemeral local port for live WebSocket tests.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let app = build_test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty(), None).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty(), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(
        app,
        Method::POST,
        uri,
        Body::from(body.to_string()),
        Some("application/json"),
    )
    .await
}

pub async fn post_raw(app: Router, uri: &str, body: &'static str) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body), Some("application/json")).await
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Body,
    content_type: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET /api/v1/tasks/{id}` until the job is terminal.
pub async fn wait_for_terminal(app: &Router, task_id: &str) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let response = get(app.clone(), &format!("/api/v1/tasks/{task_id}")).await;
        let job = body_json(response).await["data"].clone();
        if job["status"] == "completed" || job["status"] == "failed" {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} never finished"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Holds step 1 until the gate is opened, then succeeds on every step.
pub struct GatedGenerator {
    pub gate: Arc<Notify>,
}

impl GatedGenerator {
    pub fn new() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Arc::new(Self {
                gate: Arc::clone(&gate),
            }),
            gate,
        )
    }
}

#[async_trait]
impl ContentGenerator for GatedGenerator {
    async fn run_step(&self, ctx: StepContext, logs: LogSink) -> Result<String, GenerationError> {
        if ctx.step.index == 1 {
            self.gate.notified().await;
        }
        logs.log(format!("{} done", ctx.step.name)).await;
        Ok(format!("# {}\n\n{} output", ctx.topic, ctx.step.name))
    }
}

/// Fails every job at step 2 with a network error.
pub struct FlakyNetworkGenerator;

#[async_trait]
impl ContentGenerator for FlakyNetworkGenerator {
    async fn run_step(&self, ctx: StepContext, _logs: LogSink) -> Result<String, GenerationError> {
        if ctx.step.index == 2 {
            return Err(GenerationError::failed("Connection reset by peer"));
        }
        Ok(String::new())
    }
}
