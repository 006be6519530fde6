//! Stateless HTTP proxy in front of the video-search and LLM providers.
//!
//! Attaches the server-held credentials, forwards each request, and relays
//! the provider's answer or a structured error back to the caller.

mod error;
mod handlers;

use anyhow::{Context, Result};
use axum::{
  Router,
  extract::{Request, State},
  http::{HeaderValue, Method, header},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::llm::LlmClient;
use crate::twelvelabs::TwelveLabsClient;
use error::ApiError;

pub struct AppState {
  pub config: ServerConfig,
  pub twelvelabs: TwelveLabsClient,
  /// Present only when an LLM credential is configured.
  pub llm: Option<LlmClient>,
}

impl AppState {
  pub fn new(config: ServerConfig) -> Result<Self> {
    let http = Client::builder().build().context("Failed to build HTTP client")?;
    let twelvelabs = TwelveLabsClient::new(http.clone(), config.twelvelabs_base_url.clone());
    let llm = config
      .openai_api_key
      .as_ref()
      .map(|key| LlmClient::new(http, config.openai_base_url.clone(), key.clone(), config.llm_model.clone()));
    Ok(Self { config, twelvelabs, llm })
  }

  /// The server-held key when configured, otherwise whatever the caller sent.
  pub fn search_credential(&self, supplied: Option<String>) -> Option<String> {
    self
      .config
      .twelvelabs_api_key
      .clone()
      .or_else(|| supplied.map(|k| k.trim().to_string()))
      .filter(|k| !k.is_empty())
  }
}

/// Fixed allow-list of browser origins.
#[derive(Clone)]
pub struct OriginPolicy {
  allowed: Arc<Vec<HeaderValue>>,
}

impl OriginPolicy {
  pub fn new(origins: &[String]) -> Self {
    let allowed = origins
      .iter()
      .map(|o| o.trim().trim_end_matches('/'))
      .filter(|o| !o.is_empty() && *o != "*")
      .filter_map(|o| match HeaderValue::from_str(o) {
        Ok(value) => Some(value),
        Err(_) => {
          warn!(origin = o, "ignoring invalid allowed origin");
          None
        }
      })
      .collect();
    Self { allowed: Arc::new(allowed) }
  }

  pub fn allows(&self, origin: &HeaderValue) -> bool {
    self.allowed.iter().any(|o| o == origin)
  }

  fn cors_layer(&self) -> CorsLayer {
    CorsLayer::new()
      .allow_origin(AllowOrigin::list(self.allowed.iter().cloned()))
      .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
      .allow_headers([header::CONTENT_TYPE])
  }
}

/// Requests without an `Origin` header (non-browser callers) pass through.
async fn enforce_origin(State(policy): State<OriginPolicy>, request: Request, next: Next) -> Response {
  if let Some(origin) = request.headers().get(header::ORIGIN)
    && !policy.allows(origin)
  {
    warn!(origin = ?origin, path = %request.uri().path(), "rejecting request from disallowed origin");
    return ApiError::ForbiddenOrigin.into_response();
  }
  next.run(request).await
}

pub fn router(state: Arc<AppState>) -> Router {
  let policy = OriginPolicy::new(&state.config.allowed_origins);
  Router::new()
    .route("/api/health", get(handlers::health))
    .route("/api/search", post(handlers::search))
    .route("/api/engineer-prompt", post(handlers::engineer_prompt))
    .route("/api/analyze", post(handlers::analyze))
    .route("/api/videos", post(handlers::video_info_body))
    .route("/api/videos/{index_id}/{video_id}", get(handlers::video_info_path))
    .layer(middleware::from_fn_with_state(policy.clone(), enforce_origin))
    .layer(policy.cors_layer())
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

pub async fn serve(config: ServerConfig) -> Result<()> {
  if config.twelvelabs_api_key.is_none() {
    warn!("TWELVE_LABS_API_KEY not set; video endpoints will rely on caller-supplied credentials");
  }
  if config.openai_api_key.is_none() {
    warn!("OPENAI_API_KEY not set; /api/engineer-prompt will fail");
  }

  let port = config.port;
  let state = Arc::new(AppState::new(config)?);
  let app = router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {}", addr))?;
  info!("Server listening at http://localhost:{}", port);

  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("Server error")?;
  info!("Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(err = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::body::Body;
  use axum::http::StatusCode;
  use tower::ServiceExt;

  fn app(origins: &[&str]) -> Router {
    let config = ServerConfig {
      allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
      ..ServerConfig::default()
    };
    router(Arc::new(AppState::new(config).unwrap()))
  }

  fn health(origin: Option<&str>) -> axum::http::Request<Body> {
    let mut builder = axum::http::Request::builder().uri("/api/health");
    if let Some(origin) = origin {
      builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::empty()).unwrap()
  }

  #[tokio::test]
  async fn allowed_origin_gets_cors_headers() {
    let response = app(&["http://localhost:5173"]).oneshot(health(Some("http://localhost:5173"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "http://localhost:5173");
  }

  #[tokio::test]
  async fn disallowed_origin_is_rejected() {
    let response = app(&["http://localhost:5173"]).oneshot(health(Some("https://evil.example"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn missing_origin_passes() {
    let response = app(&["http://localhost:5173"]).oneshot(health(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  #[test]
  fn policy_normalises_and_skips_wildcards() {
    let policy = OriginPolicy::new(&["https://app.example/".to_string(), "*".to_string(), " ".to_string()]);
    assert!(policy.allows(&HeaderValue::from_static("https://app.example")));
    assert_eq!(policy.allowed.len(), 1);
  }

  #[test]
  fn server_credential_takes_precedence() {
    let mut config = ServerConfig::default();
    let state = AppState::new(config.clone()).unwrap();
    assert_eq!(state.search_credential(Some(" caller ".into())).as_deref(), Some("caller"));
    assert_eq!(state.search_credential(Some("".into())), None);

    config.twelvelabs_api_key = Some("server".into());
    let state = AppState::new(config).unwrap();
    assert_eq!(state.search_credential(Some("caller".into())).as_deref(), Some("server"));
  }
}
