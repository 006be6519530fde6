//! Search orchestration: direct and engineered submissions, one pipeline at a time.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{Backend, ClientError, ClipMatch, SearchQuery};

pub const MISSING_INDEX_MESSAGE: &str = "Please enter an Index ID";
pub const MISSING_PROMPT_MESSAGE: &str = "Please enter a prompt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
  Idle,
  Engineering,
  Searching,
  Done,
  Errored,
}

#[derive(Debug)]
enum SessionEvent {
  Engineered(String),
  Results(Vec<ClipMatch>),
  Failed(String),
}

pub struct SearchSession<B: Backend> {
  backend: Arc<B>,
  pub phase: SearchPhase,
  pub results: Vec<ClipMatch>,
  /// Index the current results were searched in.
  pub results_index_id: String,
  pub engineered_prompt: Option<String>,
  pub error: Option<String>,
  pending_index_id: String,
  task: Option<JoinHandle<()>>,
  events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl<B: Backend> SearchSession<B> {
  pub fn new(backend: Arc<B>) -> Self {
    Self {
      backend,
      phase: SearchPhase::Idle,
      results: Vec::new(),
      results_index_id: String::new(),
      engineered_prompt: None,
      error: None,
      pending_index_id: String::new(),
      task: None,
      events: None,
    }
  }

  pub fn is_busy(&self) -> bool {
    matches!(self.phase, SearchPhase::Engineering | SearchPhase::Searching)
  }

  /// Search with the prompt exactly as given.
  pub fn submit_direct(&mut self, index_id: &str, prompt: &str, credential: Option<String>) -> bool {
    let Some(query) = self.validate(index_id, prompt, credential) else { return false };
    info!(index_id = %query.index_id, prompt = %query.prompt_text, "session: direct search");
    self.engineered_prompt = None;
    self.start(query, false);
    true
  }

  /// Engineer the prompt through the LLM first, then search with the result.
  pub fn submit_custom(&mut self, index_id: &str, prompt: &str, credential: Option<String>) -> bool {
    let Some(query) = self.validate(index_id, prompt, credential) else { return false };
    info!(index_id = %query.index_id, prompt = %query.prompt_text, "session: engineered search");
    self.results.clear();
    self.engineered_prompt = None;
    self.start(query, true);
    true
  }

  fn validate(&mut self, index_id: &str, prompt: &str, credential: Option<String>) -> Option<SearchQuery> {
    let index_id = index_id.trim();
    let prompt = prompt.trim();
    if index_id.is_empty() {
      self.error = Some(MISSING_INDEX_MESSAGE.to_string());
      return None;
    }
    if prompt.is_empty() {
      self.error = Some(MISSING_PROMPT_MESSAGE.to_string());
      return None;
    }
    Some(SearchQuery { index_id: index_id.to_string(), prompt_text: prompt.to_string(), credential })
  }

  fn start(&mut self, query: SearchQuery, engineer: bool) {
    self.cancel();
    self.error = None;
    self.phase = if engineer { SearchPhase::Engineering } else { SearchPhase::Searching };
    self.pending_index_id = query.index_id.clone();

    let (tx, rx) = mpsc::unbounded_channel();
    let backend = Arc::clone(&self.backend);
    self.task = Some(tokio::spawn(run_pipeline(backend, query, engineer, tx)));
    self.events = Some(rx);
  }

  /// Drop any in-flight pipeline; its results are never applied.
  pub fn cancel(&mut self) {
    if let Some(handle) = self.task.take() {
      handle.abort();
    }
    self.events = None;
  }

  /// Apply pipeline events. Returns true when the result set was replaced.
  pub fn check_pending(&mut self) -> bool {
    let Some(rx) = self.events.as_mut() else { return false };
    let mut replaced = false;
    while let Ok(event) = rx.try_recv() {
      match event {
        SessionEvent::Engineered(prompt) => {
          self.engineered_prompt = Some(prompt);
          self.phase = SearchPhase::Searching;
        }
        SessionEvent::Results(results) => {
          info!(count = results.len(), "session: results received");
          self.results = results;
          self.results_index_id = self.pending_index_id.clone();
          self.error = None;
          self.phase = SearchPhase::Done;
          replaced = true;
        }
        SessionEvent::Failed(message) => {
          self.error = Some(message);
          self.results.clear();
          self.phase = SearchPhase::Errored;
          replaced = true;
        }
      }
    }
    if !self.is_busy() {
      self.events = None;
      self.task = None;
    }
    replaced
  }
}

impl<B: Backend> Drop for SearchSession<B> {
  fn drop(&mut self) {
    self.cancel();
  }
}

fn user_message(err: &ClientError, fallback: &str) -> String {
  match err {
    ClientError::Server { message, .. } if !message.is_empty() => message.clone(),
    _ => fallback.to_string(),
  }
}

async fn run_pipeline<B: Backend>(
  backend: Arc<B>,
  mut query: SearchQuery,
  engineer: bool,
  tx: mpsc::UnboundedSender<SessionEvent>,
) {
  if engineer {
    match backend.engineer_prompt(&query.prompt_text).await {
      Ok(prompt) => {
        query.prompt_text = prompt.clone();
        if tx.send(SessionEvent::Engineered(prompt)).is_err() {
          return;
        }
      }
      Err(e) => {
        warn!(err = %e, "session: prompt engineering failed");
        let _ = tx.send(SessionEvent::Failed(user_message(&e, "Failed to engineer prompt")));
        return;
      }
    }
  }

  let event = match backend.search(&query).await {
    Ok(results) => SessionEvent::Results(results),
    Err(e) => {
      warn!(err = %e, "session: search failed");
      SessionEvent::Failed(user_message(&e, "Failed to perform search"))
    }
  };
  let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FakeBackend, clip};
  use std::time::Duration;

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
  }

  fn results() -> Vec<ClipMatch> {
    vec![clip("v2", 4.0, 9.0), clip("v1", 0.0, 2.5), clip("v3", 30.0, 31.0)]
  }

  #[tokio::test(start_paused = true)]
  async fn direct_search_keeps_result_order() {
    let backend = Arc::new(FakeBackend::new().with_results(results()));
    let mut session = SearchSession::new(Arc::clone(&backend));
    assert!(session.submit_direct("idx", "Find cigarettes", None));
    assert_eq!(session.phase, SearchPhase::Searching);

    settle().await;
    assert!(session.check_pending());
    assert_eq!(session.phase, SearchPhase::Done);
    let ids: Vec<&str> = session.results.iter().map(|c| c.video_id.as_str()).collect();
    assert_eq!(ids, vec!["v2", "v1", "v3"]);
    assert_eq!(session.results_index_id, "idx");
    assert_eq!(FakeBackend::calls(&backend.engineer_calls), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn custom_prompt_searches_with_engineered_text() {
    let backend =
      Arc::new(FakeBackend::new().with_engineered("a person riding a bicycle, bell ringing").with_results(results()));
    let mut session = SearchSession::new(Arc::clone(&backend));
    assert!(session.submit_custom("idx", "bike", None));
    assert_eq!(session.phase, SearchPhase::Engineering);

    settle().await;
    session.check_pending();
    assert_eq!(session.phase, SearchPhase::Done);
    assert_eq!(session.engineered_prompt.as_deref(), Some("a person riding a bicycle, bell ringing"));
    assert_eq!(backend.engineered_inputs(), vec!["bike"]);
    let searched = backend.searched();
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].prompt_text, "a person riding a bicycle, bell ringing");
  }

  #[tokio::test(start_paused = true)]
  async fn engineering_failure_never_searches() {
    let backend = Arc::new(FakeBackend::new().with_results(results()));
    let mut session = SearchSession::new(Arc::clone(&backend));
    session.submit_custom("idx", "bike", None);

    settle().await;
    assert!(session.check_pending());
    assert_eq!(session.phase, SearchPhase::Errored);
    assert_eq!(session.error.as_deref(), Some("Failed to engineer prompt"));
    assert!(session.results.is_empty());
    assert_eq!(FakeBackend::calls(&backend.search_calls), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn repeated_search_replaces_results() {
    let backend = Arc::new(FakeBackend::new().with_results(results()));
    let mut session = SearchSession::new(Arc::clone(&backend));
    for _ in 0..2 {
      session.submit_direct("idx", "Find maps of India", None);
      settle().await;
      assert!(session.check_pending());
      assert_eq!(session.results.len(), 3);
    }
    assert_eq!(FakeBackend::calls(&backend.search_calls), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn blank_index_blocks_every_call() {
    let backend = Arc::new(FakeBackend::new().with_engineered("x").with_results(results()));
    let mut session = SearchSession::new(Arc::clone(&backend));
    assert!(!session.submit_direct("   ", "Find swearing", None));
    assert!(!session.submit_custom("", "bike", None));
    settle().await;

    assert!(!session.check_pending());
    assert_eq!(session.error.as_deref(), Some(MISSING_INDEX_MESSAGE));
    assert_eq!(session.phase, SearchPhase::Idle);
    assert_eq!(FakeBackend::calls(&backend.search_calls), 0);
    assert_eq!(FakeBackend::calls(&backend.engineer_calls), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn blank_prompt_is_ignored() {
    let backend = Arc::new(FakeBackend::new());
    let mut session = SearchSession::new(Arc::clone(&backend));
    assert!(!session.submit_direct("idx", " ", None));
    assert_eq!(session.error.as_deref(), Some(MISSING_PROMPT_MESSAGE));
  }

  #[tokio::test(start_paused = true)]
  async fn rejected_submission_message_clears_when_results_land() {
    let backend = Arc::new(FakeBackend::new().with_results(results()));
    let mut session = SearchSession::new(Arc::clone(&backend));
    assert!(session.submit_direct("idx", "Find swearing", None));
    assert!(!session.submit_direct(" ", "Find maps of India", None));
    assert_eq!(session.error.as_deref(), Some(MISSING_INDEX_MESSAGE));

    settle().await;
    assert!(session.check_pending());
    assert_eq!(session.phase, SearchPhase::Done);
    assert_eq!(session.results.len(), 3);
    assert!(session.error.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn newer_submission_supersedes_older() {
    let backend = Arc::new(FakeBackend::new().with_engineered("engineered").with_results(results()));
    let mut session = SearchSession::new(Arc::clone(&backend));
    session.submit_custom("idx", "bike", None);
    session.submit_direct("other", "Find alcohol bottles", None);

    settle().await;
    session.check_pending();
    assert_eq!(session.phase, SearchPhase::Done);
    assert!(session.engineered_prompt.is_none());
    assert_eq!(session.results_index_id, "other");
    assert_eq!(backend.searched().last().map(|q| q.prompt_text.as_str()), Some("Find alcohol bottles"));
  }

  #[tokio::test(start_paused = true)]
  async fn credential_travels_with_query() {
    let backend = Arc::new(FakeBackend::new());
    let mut session = SearchSession::new(Arc::clone(&backend));
    session.submit_direct(" idx ", " Find nudity ", Some("tl".into()));
    settle().await;
    session.check_pending();
    let searched = backend.searched();
    assert_eq!(searched[0].index_id, "idx");
    assert_eq!(searched[0].prompt_text, "Find nudity");
    assert_eq!(searched[0].credential.as_deref(), Some("tl"));
  }
}
