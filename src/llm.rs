//! OpenAI-compatible chat completion client used to engineer search prompts.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("LLM provider responded with {status}: {body}")]
  Status { status: StatusCode, body: String },
  #[error("LLM request failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("LLM returned an empty completion")]
  EmptyCompletion,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
  content: Option<String>,
}

#[derive(Clone)]
pub struct LlmClient {
  http: Client,
  base_url: String,
  api_key: String,
  model: String,
}

impl LlmClient {
  pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      http,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      api_key: api_key.into(),
      model: model.into(),
    }
  }

  /// Single, non-streaming completion: system instruction plus one user message.
  /// Returns the trimmed text of the first choice.
  pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
    let url = format!("{}/chat/completions", self.base_url);
    let body = json!({
      "model": self.model,
      "messages": [
        { "role": "system", "content": system },
        { "role": "user", "content": user }
      ]
    });

    debug!(model = %self.model, "llm: chat completion");
    let response = self.http.post(&url).bearer_auth(&self.api_key).json(&body).send().await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(LlmError::Status { status, body });
    }

    let parsed: ChatResponse = response.json().await?;
    parsed
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .map(|c| c.trim().to_string())
      .filter(|c| !c.is_empty())
      .ok_or(LlmError::EmptyCompletion)
  }
}
