//! Client for the proxy's HTTP API, plus the data types the UI works with.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use tracing::debug;

/// A time-bounded clip returned as a search match.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClipMatch {
  pub video_id: String,
  #[serde(rename = "start")]
  pub start_seconds: f64,
  #[serde(rename = "end")]
  pub end_seconds: f64,
  #[serde(default)]
  pub confidence: String,
  #[serde(default)]
  pub thumbnail_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
  #[serde(default)]
  data: Vec<ClipMatch>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Analysis {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub summary: String,
}

/// One submission; immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
  pub index_id: String,
  pub prompt_text: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub credential: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  /// 404 from the proxy: the resource is not there yet.
  #[error("not found")]
  NotFound,
  #[error("{message}")]
  Server { status: u16, message: String },
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),
}

/// The calls the UI makes against the proxy.
pub trait Backend: Send + Sync + 'static {
  fn search(&self, query: &SearchQuery) -> impl Future<Output = Result<Vec<ClipMatch>, ClientError>> + Send;

  fn engineer_prompt(&self, raw_prompt: &str) -> impl Future<Output = Result<String, ClientError>> + Send;

  fn analyze(&self, index_id: &str, video_id: &str) -> impl Future<Output = Result<Analysis, ClientError>> + Send;

  /// The ready stream URL, or `None` while the provider is still transcoding.
  fn video_info(
    &self,
    index_id: &str,
    video_id: &str,
  ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send;

  fn thumbnail(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ClientError>> + Send;
}

/// Extract the playable HLS locator from a provider video object.
pub fn stream_url(video: &Value) -> Option<String> {
  video.pointer("/hls/video_url").and_then(Value::as_str).filter(|u| !u.is_empty()).map(str::to_string)
}

pub struct ProxyClient {
  http: Client,
  base_url: String,
  /// Sent with video-search calls only when configured.
  credential: Option<String>,
}

impl ProxyClient {
  pub fn new(http: Client, base_url: impl Into<String>, credential: Option<String>) -> Self {
    Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), credential }
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  async fn read(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Err(ClientError::NotFound);
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
      return Err(ClientError::Server { status: status.as_u16(), message });
    }
    Ok(response.json().await?)
  }
}

impl Backend for ProxyClient {
  async fn search(&self, query: &SearchQuery) -> Result<Vec<ClipMatch>, ClientError> {
    let mut query = query.clone();
    if query.credential.is_none() {
      query.credential = self.credential.clone();
    }
    debug!(index_id = %query.index_id, prompt = %query.prompt_text, "proxy: search");
    let response = self.http.post(self.url("/api/search")).json(&query).send().await?;
    let envelope: SearchEnvelope = serde_json::from_value(Self::read(response).await?)
      .map_err(|e| ClientError::Server { status: 200, message: format!("Malformed search response: {}", e) })?;
    Ok(envelope.data)
  }

  async fn engineer_prompt(&self, raw_prompt: &str) -> Result<String, ClientError> {
    let body = json!({ "promptText": raw_prompt });
    let response = self.http.post(self.url("/api/engineer-prompt")).json(&body).send().await?;
    let value = Self::read(response).await?;
    value
      .get("engineeredPrompt")
      .and_then(Value::as_str)
      .map(str::trim)
      .filter(|p| !p.is_empty())
      .map(str::to_string)
      .ok_or_else(|| ClientError::Server { status: 200, message: "Engineered prompt was empty".to_string() })
  }

  async fn analyze(&self, index_id: &str, video_id: &str) -> Result<Analysis, ClientError> {
    let mut body = json!({ "indexId": index_id, "videoId": video_id });
    if let Some(credential) = &self.credential {
      body["credential"] = Value::String(credential.clone());
    }
    let response = self.http.post(self.url("/api/analyze")).json(&body).send().await?;
    serde_json::from_value(Self::read(response).await?)
      .map_err(|e| ClientError::Server { status: 200, message: format!("Malformed analysis response: {}", e) })
  }

  async fn video_info(&self, index_id: &str, video_id: &str) -> Result<Option<String>, ClientError> {
    let response = if let Some(credential) = &self.credential {
      let body = json!({ "indexId": index_id, "videoId": video_id, "credential": credential });
      self.http.post(self.url("/api/videos")).json(&body).send().await?
    } else {
      self.http.get(self.url(&format!("/api/videos/{}/{}", index_id, video_id))).send().await?
    };
    Ok(stream_url(&Self::read(response).await?))
  }

  async fn thumbnail(&self, url: &str) -> Result<Vec<u8>, ClientError> {
    let response = self.http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      let message = format!("Thumbnail fetch failed ({})", status);
      return Err(ClientError::Server { status: status.as_u16(), message });
    }
    Ok(response.bytes().await?.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn query() -> SearchQuery {
    SearchQuery { index_id: "idx".into(), prompt_text: "bike".into(), credential: None }
  }

  #[tokio::test]
  async fn search_preserves_result_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/search"))
      .and(body_json(json!({ "indexId": "idx", "promptText": "bike" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": [
          {
            "video_id": "b", "start": 10.0, "end": 12.5, "confidence": "high",
            "thumbnail_url": "https://t/b.jpg", "score": 90.1
          },
          { "video_id": "a", "start": 0.0, "end": 4.0, "confidence": "medium", "thumbnail_url": "https://t/a.jpg" }
        ],
        "page_info": {}
      })))
      .mount(&server)
      .await;

    let client = ProxyClient::new(Client::new(), server.uri(), None);
    let clips = client.search(&query()).await.unwrap();
    let ids: Vec<&str> = clips.iter().map(|c| c.video_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(clips[0].start_seconds, 10.0);
    assert_eq!(clips[1].confidence, "medium");
  }

  #[tokio::test]
  async fn configured_credential_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/search"))
      .and(body_json(json!({ "indexId": "idx", "promptText": "bike", "credential": "tl" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
      .expect(1)
      .mount(&server)
      .await;

    let client = ProxyClient::new(Client::new(), server.uri(), Some("tl".into()));
    assert!(client.search(&query()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn server_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/engineer-prompt"))
      .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "Failed to engineer prompt" })))
      .mount(&server)
      .await;

    let client = ProxyClient::new(Client::new(), server.uri(), None);
    match client.engineer_prompt("bike").await {
      Err(ClientError::Server { status, message }) => {
        assert_eq!(status, 500);
        assert_eq!(message, "Failed to engineer prompt");
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn video_info_maps_404_and_missing_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/videos/idx/pending"))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Video not ready or not found." })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/videos/idx/indexing"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_id": "indexing" })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/videos/idx/ready"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hls": { "video_url": "https://cdn/x.m3u8" } })))
      .mount(&server)
      .await;

    let client = ProxyClient::new(Client::new(), server.uri(), None);
    assert!(matches!(client.video_info("idx", "pending").await, Err(ClientError::NotFound)));
    assert_eq!(client.video_info("idx", "indexing").await.unwrap(), None);
    assert_eq!(client.video_info("idx", "ready").await.unwrap().as_deref(), Some("https://cdn/x.m3u8"));
  }

  #[tokio::test]
  async fn plain_text_error_falls_back_to_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/analyze"))
      .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
      .mount(&server)
      .await;

    let client = ProxyClient::new(Client::new(), server.uri(), None);
    let err = client.analyze("idx", "v1").await.unwrap_err();
    assert_eq!(err.to_string(), "Request failed with status 502");
  }

  #[test]
  fn stream_url_ignores_empty_locator() {
    assert_eq!(stream_url(&json!({ "hls": { "video_url": "" } })), None);
    assert_eq!(stream_url(&json!({ "hls": { "video_url": "u" } })).as_deref(), Some("u"));
  }
}
