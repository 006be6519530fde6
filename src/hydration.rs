//! Per-clip hydration: stream URL polling, one-shot analysis and thumbnail fetch.
//!
//! Each `ClipCard` owns a cancellation token, the handles of the tasks it
//! spawned and the receiving end of their event channel. Tasks never touch
//! card state; they send `HydrationEvent`s that the UI loop applies through
//! `check_pending`, the same way it drains every other background result.

use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{Analysis, Backend, ClientError, ClipMatch};
use crate::constants::constants;
use crate::player::ClipPlayer;

pub const GENERATING_TITLE: &str = "Generating title...";
pub const GENERATING_SUMMARY: &str = "Generating summary...";
pub const PROCESSING_MESSAGE: &str = "Video is processing...";
pub const STREAM_FAILED_MESSAGE: &str = "Failed to load video stream.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
  Processing,
  Ready,
  Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
  Analyzing,
  Analyzed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipHydrationState {
  pub stream_url: Option<String>,
  pub title: String,
  pub summary: String,
  pub status_message: Option<String>,
  pub stream: StreamPhase,
  pub analysis: AnalysisPhase,
}

impl Default for ClipHydrationState {
  fn default() -> Self {
    Self {
      stream_url: None,
      title: GENERATING_TITLE.to_string(),
      summary: GENERATING_SUMMARY.to_string(),
      status_message: None,
      stream: StreamPhase::Processing,
      analysis: AnalysisPhase::Analyzing,
    }
  }
}

impl ClipHydrationState {
  fn apply_analysis(&mut self, analysis: Option<Analysis>) {
    let c = constants();
    let (title, summary) = match analysis {
      Some(a) => (a.title, a.summary),
      None => (String::new(), String::new()),
    };
    self.title = if title.trim().is_empty() { c.untitled_placeholder.clone() } else { title };
    self.summary = if summary.trim().is_empty() { c.summary_placeholder.clone() } else { summary };
    self.analysis = AnalysisPhase::Analyzed;
  }
}

#[derive(Debug)]
enum HydrationEvent {
  StreamPending,
  StreamReady(String),
  StreamFailed,
  Analysis(Option<Analysis>),
  Thumbnail(DynamicImage),
}

pub struct ClipCard<B: Backend> {
  pub clip: ClipMatch,
  pub index_id: String,
  pub state: ClipHydrationState,
  pub thumbnail: Option<DynamicImage>,
  /// Attached once the stream is ready; launched only on demand.
  pub player: Option<ClipPlayer>,
  backend: Arc<B>,
  poll_interval: Duration,
  token: CancellationToken,
  tasks: Vec<JoinHandle<()>>,
  events: mpsc::UnboundedReceiver<HydrationEvent>,
}

impl<B: Backend> ClipCard<B> {
  pub fn mount(clip: ClipMatch, index_id: impl Into<String>, backend: Arc<B>, poll_interval: Duration) -> Self {
    let (_, events) = mpsc::unbounded_channel();
    let mut card = Self {
      clip,
      index_id: index_id.into(),
      state: ClipHydrationState::default(),
      thumbnail: None,
      player: None,
      backend,
      poll_interval,
      token: CancellationToken::new(),
      tasks: Vec::new(),
      events,
    };
    card.spawn_tasks();
    card
  }

  fn spawn_tasks(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.events = rx;
    self.token = CancellationToken::new();
    let video_id = self.clip.video_id.clone();
    debug!(video_id = %video_id, index_id = %self.index_id, "hydration: mounting card");

    self.tasks.push(tokio::spawn(poll_stream(
      Arc::clone(&self.backend),
      self.index_id.clone(),
      video_id.clone(),
      self.poll_interval,
      self.token.clone(),
      tx.clone(),
    )));
    self.tasks.push(tokio::spawn(fetch_analysis(
      Arc::clone(&self.backend),
      self.index_id.clone(),
      video_id,
      self.token.clone(),
      tx.clone(),
    )));
    if !self.clip.thumbnail_url.is_empty() {
      self.tasks.push(tokio::spawn(fetch_thumbnail(
        Arc::clone(&self.backend),
        self.clip.thumbnail_url.clone(),
        self.token.clone(),
        tx,
      )));
    }
  }

  /// Cancel everything the card started. No event is applied afterwards.
  pub fn teardown(&mut self) {
    self.token.cancel();
    for handle in self.tasks.drain(..) {
      handle.abort();
    }
    let (_, events) = mpsc::unbounded_channel();
    self.events = events;
    self.player = None;
  }

  pub fn is_ready(&self) -> bool {
    self.state.stream == StreamPhase::Ready
  }

  /// Apply queued events. Returns whether anything changed.
  pub fn check_pending(&mut self) -> bool {
    let mut changed = false;
    while let Ok(event) = self.events.try_recv() {
      changed = true;
      match event {
        HydrationEvent::StreamPending => {
          self.state.status_message = Some(PROCESSING_MESSAGE.to_string());
        }
        HydrationEvent::StreamReady(url) => {
          info!(video_id = %self.clip.video_id, "hydration: stream ready");
          self.player = Some(ClipPlayer::new(&self.clip.video_id, &url, self.clip.start_seconds));
          self.state.stream_url = Some(url);
          self.state.stream = StreamPhase::Ready;
          self.state.status_message = None;
        }
        HydrationEvent::StreamFailed => {
          self.state.stream = StreamPhase::Failed;
          self.state.status_message = Some(STREAM_FAILED_MESSAGE.to_string());
        }
        HydrationEvent::Analysis(analysis) => self.state.apply_analysis(analysis),
        HydrationEvent::Thumbnail(image) => self.thumbnail = Some(image),
      }
    }
    changed
  }
}

impl<B: Backend> Drop for ClipCard<B> {
  fn drop(&mut self) {
    self.teardown();
  }
}

async fn poll_stream<B: Backend>(
  backend: Arc<B>,
  index_id: String,
  video_id: String,
  interval: Duration,
  token: CancellationToken,
  tx: mpsc::UnboundedSender<HydrationEvent>,
) {
  loop {
    let outcome = tokio::select! {
      _ = token.cancelled() => return,
      outcome = backend.video_info(&index_id, &video_id) => outcome,
    };
    if token.is_cancelled() {
      return;
    }
    match outcome {
      Ok(Some(url)) => {
        let _ = tx.send(HydrationEvent::StreamReady(url));
        return;
      }
      Ok(None) | Err(ClientError::NotFound) => {
        debug!(video_id = %video_id, retry_in = ?interval, "hydration: stream not ready");
        if tx.send(HydrationEvent::StreamPending).is_err() {
          return;
        }
      }
      Err(e) => {
        warn!(video_id = %video_id, err = %e, "hydration: stream lookup failed");
        let _ = tx.send(HydrationEvent::StreamFailed);
        return;
      }
    }
    tokio::select! {
      _ = token.cancelled() => return,
      _ = tokio::time::sleep(interval) => {}
    }
  }
}

async fn fetch_analysis<B: Backend>(
  backend: Arc<B>,
  index_id: String,
  video_id: String,
  token: CancellationToken,
  tx: mpsc::UnboundedSender<HydrationEvent>,
) {
  let outcome = tokio::select! {
    _ = token.cancelled() => return,
    outcome = backend.analyze(&index_id, &video_id) => outcome,
  };
  if token.is_cancelled() {
    return;
  }
  let analysis = match outcome {
    Ok(analysis) => Some(analysis),
    Err(e) => {
      warn!(video_id = %video_id, err = %e, "hydration: analysis failed");
      None
    }
  };
  let _ = tx.send(HydrationEvent::Analysis(analysis));
}

async fn fetch_thumbnail<B: Backend>(
  backend: Arc<B>,
  url: String,
  token: CancellationToken,
  tx: mpsc::UnboundedSender<HydrationEvent>,
) {
  let bytes = tokio::select! {
    _ = token.cancelled() => return,
    bytes = backend.thumbnail(&url) => bytes,
  };
  let image = match bytes {
    Ok(bytes) => match image::load_from_memory(&bytes) {
      Ok(image) => image,
      Err(e) => {
        debug!(url = %url, err = %e, "hydration: thumbnail decode failed");
        return;
      }
    },
    Err(e) => {
      debug!(url = %url, err = %e, "hydration: thumbnail fetch failed");
      return;
    }
  };
  if !token.is_cancelled() {
    let _ = tx.send(HydrationEvent::Thumbnail(image));
  }
}
