//! HTTP client for the Twelve Labs video understanding API.
//!
//! Every call takes the credential explicitly; the proxy decides per request
//! whether it is the server-held key or one supplied by the caller.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
  #[error("provider responded with {status}")]
  Status { status: StatusCode, body: Value },
  #[error("provider request failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("task {id} finished with status '{status}'")]
  TaskFailed { id: String, status: String },
  #[error("task {id} did not complete within {timeout:?}")]
  TaskTimeout { id: String, timeout: Duration },
  #[error("provider response is missing {0}")]
  Malformed(&'static str),
}

impl ProviderError {
  /// HTTP status reported by the provider, if the failure came from a response.
  pub fn status(&self) -> Option<StatusCode> {
    match self {
      ProviderError::Status { status, .. } => Some(*status),
      ProviderError::Transport(e) => e.status(),
      _ => None,
    }
  }

  /// Raw provider error body for diagnostics.
  pub fn body(&self) -> Option<&Value> {
    match self {
      ProviderError::Status { body, .. } => Some(body),
      _ => None,
    }
  }

  pub fn is_not_found(&self) -> bool {
    self.status() == Some(StatusCode::NOT_FOUND)
  }
}

#[derive(Debug, Serialize)]
pub struct SearchRequest<'a> {
  pub index_id: &'a str,
  pub query_text: &'a str,
  pub search_options: &'a [String],
  pub page_limit: u32,
}

#[derive(Debug, Serialize)]
pub struct TaskRequest<'a> {
  pub index_id: &'a str,
  pub video_id: &'a str,
  pub features: &'a [&'a str],
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prompt: Option<&'a str>,
}

#[derive(Clone)]
pub struct TwelveLabsClient {
  http: Client,
  base_url: String,
}

impl TwelveLabsClient {
  pub fn new(http: Client, base_url: impl Into<String>) -> Self {
    Self { http, base_url: base_url.into().trim_end_matches('/').to_string() }
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  async fn send(&self, request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    if !status.is_success() {
      return Err(ProviderError::Status { status, body });
    }
    Ok(body)
  }

  /// Run a semantic search and return the provider's envelope untouched.
  pub async fn search(&self, api_key: &str, request: &SearchRequest<'_>) -> Result<Value, ProviderError> {
    debug!(index_id = request.index_id, page_limit = request.page_limit, "twelvelabs: search");
    self.send(self.http.post(self.url("/search")).header(API_KEY_HEADER, api_key).json(request)).await
  }

  /// Fetch the video object, which carries `hls.video_url` once transcoding is done.
  pub async fn retrieve_video(&self, api_key: &str, index_id: &str, video_id: &str) -> Result<Value, ProviderError> {
    let path = format!("/indexes/{}/videos/{}", index_id, video_id);
    self.send(self.http.get(self.url(&path)).header(API_KEY_HEADER, api_key)).await
  }

  /// Synchronous gist; returns the generated title if the provider produced one.
  pub async fn gist_title(&self, api_key: &str, video_id: &str) -> Result<Option<String>, ProviderError> {
    let body = json!({ "video_id": video_id, "types": ["title"] });
    let value = self.send(self.http.post(self.url("/gist")).header(API_KEY_HEADER, api_key).json(&body)).await?;
    Ok(non_empty_str(value.get("title")))
  }

  /// Synchronous summary for the whole video.
  pub async fn summarize(&self, api_key: &str, video_id: &str, prompt: &str) -> Result<Option<String>, ProviderError> {
    let body = json!({ "video_id": video_id, "type": "summary", "prompt": prompt });
    let value = self.send(self.http.post(self.url("/summarize")).header(API_KEY_HEADER, api_key).json(&body)).await?;
    Ok(non_empty_str(value.get("summary")))
  }

  /// Submit an asynchronous task and return its id.
  pub async fn create_task(&self, api_key: &str, request: &TaskRequest<'_>) -> Result<String, ProviderError> {
    let value = self.send(self.http.post(self.url("/tasks")).header(API_KEY_HEADER, api_key).json(request)).await?;
    non_empty_str(value.get("_id").or_else(|| value.get("id"))).ok_or(ProviderError::Malformed("task id"))
  }

  pub async fn retrieve_task(&self, api_key: &str, task_id: &str) -> Result<Value, ProviderError> {
    let path = format!("/tasks/{}", task_id);
    self.send(self.http.get(self.url(&path)).header(API_KEY_HEADER, api_key)).await
  }

  /// Poll a task every `interval` until it is ready or failed, giving up after `timeout`.
  pub async fn wait_for_task(
    &self,
    api_key: &str,
    task_id: &str,
    timeout: Duration,
    interval: Duration,
  ) -> Result<Value, ProviderError> {
    match tokio::time::timeout(timeout, self.poll_task(api_key, task_id, interval)).await {
      Ok(result) => result,
      Err(_) => Err(ProviderError::TaskTimeout { id: task_id.to_string(), timeout }),
    }
  }

  async fn poll_task(&self, api_key: &str, task_id: &str, interval: Duration) -> Result<Value, ProviderError> {
    loop {
      let task = self.retrieve_task(api_key, task_id).await?;
      match task.get("status").and_then(Value::as_str).unwrap_or_default() {
        "ready" => {
          info!(task_id, "twelvelabs: task ready");
          return Ok(task);
        }
        status @ "failed" => {
          return Err(ProviderError::TaskFailed { id: task_id.to_string(), status: status.to_string() });
        }
        status => debug!(task_id, status, "twelvelabs: task still running"),
      }
      tokio::time::sleep(interval).await;
    }
  }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
  value.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Title computed by a finished gist task.
pub fn task_gist_title(task: &Value) -> Option<String> {
  non_empty_str(task.pointer("/video/metadata/gist/title"))
}

/// Summary computed by a finished summarize task.
pub fn task_summary(task: &Value) -> Option<String> {
  non_empty_str(task.pointer("/video/metadata/summary/content"))
}
