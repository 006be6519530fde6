//! Request handlers for the proxy endpoints.

use axum::{
  Json,
  extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::AppState;
use super::error::ApiError;
use crate::config::AnalysisMode;
use crate::constants::constants;
use crate::twelvelabs::{ProviderError, SearchRequest, TaskRequest, task_gist_title, task_summary};

const MISSING_SEARCH_KEY: &str = "TWELVE_LABS_API_KEY is not configured on the server";
const MISSING_LLM_KEY: &str = "OPENAI_API_KEY is not configured on the server";

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
  index_id: Option<String>,
  #[serde(alias = "prompt")]
  prompt_text: Option<String>,
  #[serde(alias = "apiKey")]
  credential: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EngineerBody {
  #[serde(alias = "prompt")]
  prompt_text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoBody {
  index_id: Option<String>,
  video_id: Option<String>,
  #[serde(alias = "apiKey")]
  credential: Option<String>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
  pub title: String,
  pub summary: String,
}

/// Trim a field and treat blank as missing.
fn required(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn health() -> &'static str {
  "Backend is healthy"
}

/// POST /api/search
pub async fn search(State(state): State<Arc<AppState>>, Json(body): Json<SearchBody>) -> Result<Json<Value>, ApiError> {
  let (Some(index_id), Some(prompt), Some(credential)) =
    (required(body.index_id), required(body.prompt_text), state.search_credential(body.credential))
  else {
    return Err(ApiError::Validation("indexId, promptText, and credential are required".to_string()));
  };

  let request = SearchRequest {
    index_id: &index_id,
    query_text: &prompt,
    search_options: &constants().search_options,
    page_limit: state.config.effective_page_limit(),
  };
  info!(index_id = %index_id, "search: forwarding query");
  match state.twelvelabs.search(&credential, &request).await {
    Ok(envelope) => Ok(Json(envelope)),
    Err(e) => {
      error!(err = %e, index_id = %index_id, "search: provider call failed");
      Err(ApiError::upstream(&e, "Failed to perform search"))
    }
  }
}

/// POST /api/engineer-prompt
pub async fn engineer_prompt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EngineerBody>,
) -> Result<Json<Value>, ApiError> {
  let Some(prompt) = required(body.prompt_text) else {
    return Err(ApiError::Validation("promptText is required".to_string()));
  };
  let Some(llm) = state.llm.as_ref() else {
    return Err(ApiError::Configuration(MISSING_LLM_KEY.to_string()));
  };

  match llm.complete(&constants().engineer_system_prompt, &prompt).await {
    Ok(engineered) => {
      info!(raw = %prompt, engineered = %engineered, "engineer-prompt: completed");
      Ok(Json(json!({ "engineeredPrompt": engineered })))
    }
    Err(e) => {
      error!(err = %e, "engineer-prompt: LLM call failed");
      Err(ApiError::internal("Failed to engineer prompt", Some(Value::String(e.to_string()))))
    }
  }
}

/// POST /api/analyze
///
/// Title and summary are computed concurrently and joined under one timeout
/// budget. A failed half degrades to its placeholder; both failing is an error.
pub async fn analyze(
  State(state): State<Arc<AppState>>,
  Json(body): Json<VideoBody>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
  let (Some(index_id), Some(video_id)) = (required(body.index_id), required(body.video_id)) else {
    return Err(ApiError::Validation("indexId and videoId are required".to_string()));
  };
  let Some(credential) = state.search_credential(body.credential) else {
    return Err(ApiError::Configuration(MISSING_SEARCH_KEY.to_string()));
  };

  let budget = state.config.task_timeout();
  let pair = async {
    tokio::join!(
      state.video_title(&credential, &index_id, &video_id),
      state.video_summary(&credential, &index_id, &video_id)
    )
  };

  let (title, summary) = match tokio::time::timeout(budget, pair).await {
    Ok(results) => results,
    Err(_) => {
      error!(video_id = %video_id, ?budget, "analyze: timed out");
      return Err(ApiError::internal(
        "Failed to analyze video",
        Some(json!({ "reason": format!("analysis did not finish within {}s", budget.as_secs()) })),
      ));
    }
  };

  match (title, summary) {
    (Err(title_err), Err(summary_err)) => {
      error!(video_id = %video_id, title = %title_err, summary = %summary_err, "analyze: both sub-operations failed");
      Err(ApiError::internal(
        "Failed to analyze video",
        Some(json!({ "title": title_err.to_string(), "summary": summary_err.to_string() })),
      ))
    }
    (title, summary) => {
      if let Err(e) = &title {
        warn!(video_id = %video_id, err = %e, "analyze: title unavailable");
      }
      if let Err(e) = &summary {
        warn!(video_id = %video_id, err = %e, "analyze: summary unavailable");
      }
      let c = constants();
      Ok(Json(AnalyzeResponse {
        title: title.ok().flatten().unwrap_or_else(|| c.untitled_placeholder.clone()),
        summary: summary.ok().flatten().unwrap_or_else(|| c.summary_placeholder.clone()),
      }))
    }
  }
}

/// GET /api/videos/{index_id}/{video_id}
pub async fn video_info_path(
  State(state): State<Arc<AppState>>,
  Path((index_id, video_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
  video_info(&state, Some(index_id), Some(video_id), None).await
}

/// POST /api/videos
pub async fn video_info_body(
  State(state): State<Arc<AppState>>,
  Json(body): Json<VideoBody>,
) -> Result<Json<Value>, ApiError> {
  video_info(&state, body.index_id, body.video_id, body.credential).await
}

async fn video_info(
  state: &AppState,
  index_id: Option<String>,
  video_id: Option<String>,
  credential: Option<String>,
) -> Result<Json<Value>, ApiError> {
  let (Some(index_id), Some(video_id)) = (required(index_id), required(video_id)) else {
    return Err(ApiError::Validation("indexId and videoId are required".to_string()));
  };
  let Some(credential) = state.search_credential(credential) else {
    return Err(ApiError::Configuration(MISSING_SEARCH_KEY.to_string()));
  };

  match state.twelvelabs.retrieve_video(&credential, &index_id, &video_id).await {
    Ok(video) => Ok(Json(video)),
    Err(e) if e.is_not_found() => Err(ApiError::UpstreamNotFound("Video not ready or not found.".to_string())),
    Err(e) => {
      error!(err = %e, video_id = %video_id, "videos: provider call failed");
      Err(ApiError::internal("Failed to retrieve video stream info.", e.body().cloned()))
    }
  }
}

impl AppState {
  async fn video_title(&self, key: &str, index_id: &str, video_id: &str) -> Result<Option<String>, ProviderError> {
    match self.config.analysis_mode {
      AnalysisMode::Sync => self.twelvelabs.gist_title(key, video_id).await,
      AnalysisMode::Task => {
        let request = TaskRequest { index_id, video_id, features: &["gist"], prompt: None };
        let task = self.run_task(key, &request).await?;
        Ok(task_gist_title(&task))
      }
    }
  }

  async fn video_summary(&self, key: &str, index_id: &str, video_id: &str) -> Result<Option<String>, ProviderError> {
    let prompt = constants().summary_prompt.as_str();
    match self.config.analysis_mode {
      AnalysisMode::Sync => self.twelvelabs.summarize(key, video_id, prompt).await,
      AnalysisMode::Task => {
        let request = TaskRequest { index_id, video_id, features: &["summarize"], prompt: Some(prompt) };
        let task = self.run_task(key, &request).await?;
        Ok(task_summary(&task))
      }
    }
  }

  async fn run_task(&self, key: &str, request: &TaskRequest<'_>) -> Result<Value, ProviderError> {
    let task_id = self.twelvelabs.create_task(key, request).await?;
    info!(task_id = %task_id, features = ?request.features, "analyze: task submitted");
    self.twelvelabs.wait_for_task(key, &task_id, self.config.task_timeout(), self.config.task_poll_interval()).await
  }
}
