//! In-memory `Backend` used by the session and hydration tests.

use image::{DynamicImage, ImageFormat};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::{Analysis, Backend, ClientError, ClipMatch, SearchQuery};

/// Scripted answer for one video-info call.
#[derive(Debug, Clone)]
pub enum VideoInfo {
  Ready(String),
  Processing,
  NotFound,
  Fails(u16),
}

#[derive(Default)]
pub struct FakeBackend {
  /// Consumed front to back; the last entry repeats once the queue is down to one.
  video_info: Mutex<VecDeque<VideoInfo>>,
  analysis: Mutex<Option<Analysis>>,
  engineered: Mutex<Option<String>>,
  results: Mutex<Vec<ClipMatch>>,
  thumbnail: Mutex<Option<Vec<u8>>>,
  searched: Mutex<Vec<SearchQuery>>,
  engineered_inputs: Mutex<Vec<String>>,
  pub video_info_calls: AtomicUsize,
  pub analyze_calls: AtomicUsize,
  pub search_calls: AtomicUsize,
  pub engineer_calls: AtomicUsize,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_video_info(self, script: impl IntoIterator<Item = VideoInfo>) -> Self {
    *self.video_info.lock().unwrap() = script.into_iter().collect();
    self
  }

  pub fn with_analysis(self, title: &str, summary: &str) -> Self {
    *self.analysis.lock().unwrap() = Some(Analysis { title: title.into(), summary: summary.into() });
    self
  }

  pub fn with_engineered(self, prompt: &str) -> Self {
    *self.engineered.lock().unwrap() = Some(prompt.into());
    self
  }

  pub fn with_results(self, results: Vec<ClipMatch>) -> Self {
    self.set_results(results);
    self
  }

  /// Bytes served for every thumbnail URL. Without them thumbnail fetches fail.
  pub fn with_thumbnail(self, bytes: Vec<u8>) -> Self {
    *self.thumbnail.lock().unwrap() = Some(bytes);
    self
  }

  /// Change what the next search returns.
  pub fn set_results(&self, results: Vec<ClipMatch>) {
    *self.results.lock().unwrap() = results;
  }

  pub fn searched(&self) -> Vec<SearchQuery> {
    self.searched.lock().unwrap().clone()
  }

  pub fn engineered_inputs(&self) -> Vec<String> {
    self.engineered_inputs.lock().unwrap().clone()
  }

  pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
  }
}

/// A `width`x`height` PNG, encoded in memory.
pub fn png(width: u32, height: u32) -> Vec<u8> {
  let mut bytes = Vec::new();
  DynamicImage::new_rgb8(width, height).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
  bytes
}

pub fn clip(video_id: &str, start: f64, end: f64) -> ClipMatch {
  ClipMatch {
    video_id: video_id.into(),
    start_seconds: start,
    end_seconds: end,
    confidence: "high".into(),
    thumbnail_url: format!("https://thumbs.example/{}.jpg", video_id),
  }
}

impl Backend for FakeBackend {
  async fn search(&self, query: &SearchQuery) -> Result<Vec<ClipMatch>, ClientError> {
    self.search_calls.fetch_add(1, Ordering::SeqCst);
    self.searched.lock().unwrap().push(query.clone());
    Ok(self.results.lock().unwrap().clone())
  }

  async fn engineer_prompt(&self, raw_prompt: &str) -> Result<String, ClientError> {
    self.engineer_calls.fetch_add(1, Ordering::SeqCst);
    self.engineered_inputs.lock().unwrap().push(raw_prompt.to_string());
    self
      .engineered
      .lock()
      .unwrap()
      .clone()
      .ok_or_else(|| ClientError::Server { status: 500, message: "Failed to engineer prompt".into() })
  }

  async fn analyze(&self, _index_id: &str, _video_id: &str) -> Result<Analysis, ClientError> {
    self.analyze_calls.fetch_add(1, Ordering::SeqCst);
    self
      .analysis
      .lock()
      .unwrap()
      .clone()
      .ok_or_else(|| ClientError::Server { status: 500, message: "Failed to analyze video".into() })
  }

  async fn video_info(&self, _index_id: &str, _video_id: &str) -> Result<Option<String>, ClientError> {
    self.video_info_calls.fetch_add(1, Ordering::SeqCst);
    let next = {
      let mut script = self.video_info.lock().unwrap();
      if script.len() > 1 { script.pop_front() } else { script.front().cloned() }
    };
    match next.unwrap_or(VideoInfo::Processing) {
      VideoInfo::Ready(url) => Ok(Some(url)),
      VideoInfo::Processing => Ok(None),
      VideoInfo::NotFound => Err(ClientError::NotFound),
      VideoInfo::Fails(status) => {
        Err(ClientError::Server { status, message: "Failed to retrieve video stream info.".into() })
      }
    }
  }

  async fn thumbnail(&self, _url: &str) -> Result<Vec<u8>, ClientError> {
    self
      .thumbnail
      .lock()
      .unwrap()
      .clone()
      .ok_or_else(|| ClientError::Server { status: 404, message: "no thumbnail".into() })
  }
}
