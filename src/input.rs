use anyhow::{Context, Result};
use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::api::Backend;
use crate::app::{App, AppMode};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Single-line text field: value, char cursor and horizontal scroll.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
  pub value: String,
  pub cursor: usize,
  pub scroll: usize,
}

impl TextInput {
  pub fn new(value: String) -> Self {
    let cursor = value.chars().count();
    Self { value, cursor, scroll: 0 }
  }

  pub fn clear(&mut self) {
    *self = Self::default();
  }

  /// Apply an editing key. Returns false for keys the field does not handle.
  pub fn handle(&mut self, code: KeyCode) -> bool {
    match code {
      KeyCode::Char(c) => {
        let byte_idx = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_idx, c);
        self.cursor += 1;
      }
      KeyCode::Backspace => {
        if self.cursor > 0 {
          self.cursor -= 1;
          let byte_idx = char_to_byte_index(&self.value, self.cursor);
          self.value.remove(byte_idx);
        }
      }
      KeyCode::Delete => {
        if self.cursor < self.value.chars().count() {
          let byte_idx = char_to_byte_index(&self.value, self.cursor);
          self.value.remove(byte_idx);
        }
      }
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
      }
      KeyCode::Right => {
        if self.cursor < self.value.chars().count() {
          self.cursor += 1;
        }
      }
      KeyCode::Home => {
        self.cursor = 0;
      }
      KeyCode::End => {
        self.cursor = self.value.chars().count();
      }
      _ => return false,
    }
    true
  }
}

// --- Event Handling ---

fn next_focus<B: Backend>(app: &App<B>, forward: bool) -> AppMode {
  let mut order = vec![AppMode::Index, AppMode::Prompts, AppMode::Custom];
  if !app.cards.is_empty() {
    order.push(AppMode::Results);
  }
  let current = order.iter().position(|m| *m == app.mode).unwrap_or(0);
  let next = if forward { (current + 1) % order.len() } else { (current + order.len() - 1) % order.len() };
  order[next]
}

pub async fn handle_key_event<B: Backend>(app: &mut App<B>, key: event::KeyEvent) -> Result<()> {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t') {
    app.next_theme();
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('s') {
    app.stop_playback().await;
    return Ok(());
  }

  if app.mode != AppMode::EditPrompt && matches!(key.code, KeyCode::Tab | KeyCode::BackTab) {
    app.mode = next_focus(app, key.code == KeyCode::Tab);
    return Ok(());
  }

  match app.mode {
    AppMode::Index => handle_index_key(app, key),
    AppMode::Prompts => handle_prompts_key(app, key),
    AppMode::EditPrompt => handle_edit_key(app, key),
    AppMode::Custom => handle_custom_key(app, key),
    AppMode::Results => handle_results_key(app, key).await.context("Failed to handle results key event")?,
  }
  Ok(())
}

fn handle_index_key<B: Backend>(app: &mut App<B>, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter | KeyCode::Down => {
      app.mode = AppMode::Prompts;
    }
    KeyCode::Esc => {
      if !app.index_id.value.is_empty() {
        app.index_id.clear();
      } else {
        app.should_quit = true;
      }
    }
    code => {
      app.index_id.handle(code);
    }
  }
}

fn handle_prompts_key<B: Backend>(app: &mut App<B>, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => app.search_selected_prompt(),
    KeyCode::Down | KeyCode::Char('j') => app.move_prompt_selection(true),
    KeyCode::Up | KeyCode::Char('k') => app.move_prompt_selection(false),
    KeyCode::Char('e') => app.start_edit_prompt(),
    KeyCode::Char('d') => app.duplicate_prompt(),
    KeyCode::Char('c') => app.mode = AppMode::Custom,
    KeyCode::Char('r') if !app.cards.is_empty() => app.mode = AppMode::Results,
    KeyCode::Esc => app.mode = AppMode::Index,
    _ => {}
  }
}

fn handle_edit_key<B: Backend>(app: &mut App<B>, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => app.commit_edit_prompt(),
    KeyCode::Esc => app.cancel_edit_prompt(),
    code => {
      app.prompt_edit.handle(code);
    }
  }
}

fn handle_custom_key<B: Backend>(app: &mut App<B>, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => app.search_custom(),
    KeyCode::Esc => {
      if !app.custom.value.is_empty() {
        app.custom.clear();
      } else {
        app.mode = AppMode::Prompts;
      }
    }
    code => {
      app.custom.handle(code);
    }
  }
}

async fn handle_results_key<B: Backend>(app: &mut App<B>, key: event::KeyEvent) -> Result<()> {
  match key.code {
    KeyCode::Enter => app.play_selected().await?,
    KeyCode::Char(' ') => app.toggle_pause().await,
    KeyCode::Char('b') => app.show_details = !app.show_details,
    KeyCode::Down | KeyCode::Char('j') => app.move_result_selection(true),
    KeyCode::Up | KeyCode::Char('k') => app.move_result_selection(false),
    KeyCode::Esc => app.mode = AppMode::Prompts,
    _ => {}
  }
  Ok(())
}
