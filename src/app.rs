use anyhow::Result;
use image::DynamicImage;
use ratatui::widgets::ListState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::api::{Backend, ProxyClient};
use crate::config::{ClientConfig, Prefs};
use crate::display::DisplayMode;
use crate::hydration::ClipCard;
use crate::input::TextInput;
use crate::session::{SearchPhase, SearchSession};
use crate::theme::{THEMES, Theme, theme_index};

const SPINNER: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  /// Typing the index ID.
  Index,
  /// Choosing one of the canned prompts.
  Prompts,
  /// Editing the selected canned prompt in place.
  EditPrompt,
  /// Typing a free-form prompt for the engineer-and-search path.
  Custom,
  Results,
}

/// Resized copy of the selected card's thumbnail, keyed by video and target size.
#[derive(Default)]
pub struct ThumbCache {
  pub resized: Option<(String, u16, u16, DynamicImage)>,
}

pub struct App<B: Backend = ProxyClient> {
  pub mode: AppMode,
  pub index_id: TextInput,
  pub custom: TextInput,
  pub prompts: Vec<String>,
  pub prompt_state: ListState,
  pub prompt_edit: TextInput,
  pub session: SearchSession<B>,
  /// One hydration controller per rendered result, in result order.
  pub cards: Vec<ClipCard<B>>,
  pub list_state: ListState,
  /// Show the selected card's back (summary and details).
  pub show_details: bool,
  pub theme_index: usize,
  pub display_mode: DisplayMode,
  pub thumbs: ThumbCache,
  pub last_error: Option<String>,
  pub should_quit: bool,
  pub started_at: Instant,
  backend: Arc<B>,
  credential: Option<String>,
  poll_interval: Duration,
  prefs_path: Option<PathBuf>,
  error_time: Option<Instant>,
}

impl<B: Backend> App<B> {
  pub fn new(
    backend: Arc<B>,
    client: &ClientConfig,
    prefs: Prefs,
    prefs_path: Option<PathBuf>,
    display_mode: DisplayMode,
  ) -> Self {
    let mut prompt_state = ListState::default();
    if !client.prompts.is_empty() {
      prompt_state.select(Some(0));
    }
    let index_id = TextInput::new(prefs.index_id.unwrap_or_default());
    let mode = if index_id.value.trim().is_empty() { AppMode::Index } else { AppMode::Prompts };

    Self {
      mode,
      index_id,
      custom: TextInput::default(),
      prompts: client.prompts.clone(),
      prompt_state,
      prompt_edit: TextInput::default(),
      session: SearchSession::new(Arc::clone(&backend)),
      cards: Vec::new(),
      list_state: ListState::default(),
      show_details: false,
      theme_index: theme_index(prefs.theme_name.as_deref()),
      display_mode,
      thumbs: ThumbCache::default(),
      last_error: None,
      should_quit: false,
      started_at: Instant::now(),
      backend,
      credential: client.api_key.clone(),
      poll_interval: client.poll_interval(),
      prefs_path,
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    &THEMES[self.theme_index % THEMES.len()]
  }

  pub fn spinner(&self) -> &'static str {
    let tick = (self.started_at.elapsed().as_millis() / 100) as usize;
    SPINNER[tick % SPINNER.len()]
  }

  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after 5 seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(5)
    {
      self.clear_error();
    }
  }

  fn save_prefs(&self) {
    let Some(path) = &self.prefs_path else { return };
    let prefs = Prefs {
      theme_name: Some(self.theme().name.to_string()),
      index_id: Some(self.index_id.value.trim().to_string()).filter(|id| !id.is_empty()),
    };
    prefs.save_to(path);
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.save_prefs();
  }

  pub fn set_index_id(&mut self, index_id: &str) {
    self.index_id = TextInput::new(index_id.to_string());
  }

  // --- Search ---

  pub fn selected_prompt(&self) -> Option<&str> {
    self.prompt_state.selected().and_then(|i| self.prompts.get(i)).map(String::as_str)
  }

  pub fn search_selected_prompt(&mut self) {
    let Some(prompt) = self.selected_prompt().map(str::to_string) else { return };
    self.clear_error();
    if self.session.submit_direct(&self.index_id.value, &prompt, self.credential.clone()) {
      self.clear_cards();
      self.save_prefs();
    }
  }

  pub fn search_custom(&mut self) {
    let prompt = self.custom.value.clone();
    self.clear_error();
    if self.session.submit_custom(&self.index_id.value, &prompt, self.credential.clone()) {
      self.clear_cards();
      self.save_prefs();
    }
  }

  /// Status line text for the current search phase.
  pub fn search_status(&self) -> Option<&'static str> {
    match self.session.phase {
      SearchPhase::Engineering => Some("Engineering prompt…"),
      SearchPhase::Searching => Some("Searching…"),
      _ => None,
    }
  }

  // --- Canned prompts ---

  pub fn move_prompt_selection(&mut self, forward: bool) {
    let count = self.prompts.len();
    if count == 0 {
      return;
    }
    let i = match (self.prompt_state.selected(), forward) {
      (Some(i), true) => (i + 1) % count,
      (Some(0), false) | (None, false) => count - 1,
      (Some(i), false) => i - 1,
      (None, true) => 0,
    };
    self.prompt_state.select(Some(i));
  }

  pub fn start_edit_prompt(&mut self) {
    if let Some(prompt) = self.selected_prompt().map(str::to_string) {
      self.prompt_edit = TextInput::new(prompt);
      self.mode = AppMode::EditPrompt;
    }
  }

  pub fn commit_edit_prompt(&mut self) {
    let text = self.prompt_edit.value.trim().to_string();
    if text.is_empty() {
      self.set_error("Prompt cannot be empty.".to_string());
      return;
    }
    if let Some(slot) = self.prompt_state.selected().and_then(|i| self.prompts.get_mut(i)) {
      *slot = text;
    }
    self.mode = AppMode::Prompts;
  }

  pub fn cancel_edit_prompt(&mut self) {
    self.prompt_edit = TextInput::default();
    self.mode = AppMode::Prompts;
  }

  /// Insert a copy of the selected prompt right after it and select the copy.
  pub fn duplicate_prompt(&mut self) {
    let Some(i) = self.prompt_state.selected() else { return };
    let Some(prompt) = self.prompts.get(i).cloned() else { return };
    self.prompts.insert(i + 1, prompt);
    self.prompt_state.select(Some(i + 1));
  }

  // --- Results ---

  pub fn selected_card(&self) -> Option<&ClipCard<B>> {
    self.list_state.selected().and_then(|i| self.cards.get(i))
  }

  pub fn move_result_selection(&mut self, forward: bool) {
    let count = self.cards.len();
    if count == 0 {
      return;
    }
    let i = match self.list_state.selected() {
      Some(i) if forward => (i + 1) % count,
      Some(0) | None => {
        if forward {
          0
        } else {
          count - 1
        }
      }
      Some(i) => i - 1,
    };
    self.list_state.select(Some(i));
  }

  /// Drop every card; each one tears down its own tasks and player.
  fn clear_cards(&mut self) {
    self.cards.clear();
    self.list_state.select(None);
    self.thumbs.resized = None;
  }

  /// Mount one fresh card per clip of the session's result set.
  fn sync_cards(&mut self) {
    self.clear_cards();
    let index_id = self.session.results_index_id.clone();
    for clip in self.session.results.clone() {
      self.cards.push(ClipCard::mount(clip, index_id.as_str(), Arc::clone(&self.backend), self.poll_interval));
    }
    if !self.cards.is_empty() {
      self.list_state.select(Some(0));
    } else if self.mode == AppMode::Results {
      self.mode = AppMode::Prompts;
    }
    info!(cards = self.cards.len(), "app: result cards rebuilt");
  }

  pub fn check_pending(&mut self) {
    if self.session.check_pending() {
      self.sync_cards();
    }
    for card in &mut self.cards {
      card.check_pending();
      if let Some(player) = card.player.as_mut() {
        player.check_status();
      }
    }
  }

  pub fn playing_card(&self) -> Option<&ClipCard<B>> {
    self.cards.iter().find(|c| c.player.as_ref().is_some_and(|p| p.is_playing()))
  }

  /// Launch the selected card's player, stopping any other clip first.
  pub async fn play_selected(&mut self) -> Result<()> {
    let Some(selected) = self.list_state.selected() else { return Ok(()) };
    if !self.selected_card().is_some_and(ClipCard::is_ready) {
      self.set_error("Clip is not ready to play yet.".to_string());
      return Ok(());
    }
    self.stop_playback().await;
    let result = match self.cards.get_mut(selected).and_then(|c| c.player.as_mut()) {
      Some(player) => player.play().await,
      None => Ok(()),
    };
    if let Err(e) = result {
      self.set_error(format!("Playback error: {:#}", e));
    }
    Ok(())
  }

  pub async fn toggle_pause(&mut self) {
    let playing = self.cards.iter_mut().filter_map(|c| c.player.as_mut()).find(|p| p.is_playing());
    let result = match playing {
      Some(player) => player.toggle_pause().await,
      None => Ok(()),
    };
    if let Err(e) = result {
      self.set_error(format!("Pause error: {}", e));
    }
  }

  pub async fn stop_playback(&mut self) {
    for player in self.cards.iter_mut().filter_map(|c| c.player.as_mut()) {
      if player.is_playing()
        && let Err(e) = player.stop().await
      {
        warn!(err = %e, "app: failed to stop player");
      }
    }
  }

  /// Tear down every card. Used on exit.
  pub async fn shutdown(&mut self) {
    self.stop_playback().await;
    self.session.cancel();
    self.cards.clear();
  }
}
