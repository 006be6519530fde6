use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::twelvelabs::ProviderError;

/// Error taxonomy of the proxy. Every variant renders as `{"error": ..., "details"?: ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  /// Missing required input; the caller's fault.
  #[error("{0}")]
  Validation(String),
  /// The provider does not have the resource yet (e.g. still transcoding).
  #[error("{0}")]
  UpstreamNotFound(String),
  /// Any other provider failure.
  #[error("{message}")]
  Upstream { status: StatusCode, message: String, details: Option<Value> },
  /// A credential the endpoint needs is not configured on the server.
  #[error("{0}")]
  Configuration(String),
  #[error("Origin not allowed")]
  ForbiddenOrigin,
}

impl ApiError {
  /// Wrap a provider failure, keeping its status (falling back to 500) and raw body.
  pub fn upstream(err: &ProviderError, message: &str) -> Self {
    let status = err.status().filter(|s| s.is_client_error() || s.is_server_error());
    let details = err.body().cloned().unwrap_or_else(|| Value::String(err.to_string()));
    ApiError::Upstream {
      status: status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
      message: message.to_string(),
      details: Some(details),
    }
  }

  /// Provider failure reported as a plain 500, whatever status the provider used.
  pub fn internal(message: &str, details: Option<Value>) -> Self {
    ApiError::Upstream { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.to_string(), details }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) => StatusCode::BAD_REQUEST,
      ApiError::UpstreamNotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Upstream { status, .. } => *status,
      ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::ForbiddenOrigin => StatusCode::FORBIDDEN,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = match &self {
      ApiError::Upstream { message, details: Some(details), .. } => json!({ "error": message, "details": details }),
      other => json!({ "error": other.to_string() }),
    };
    (status, Json(body)).into_response()
  }
}
