use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::api::Backend;
use crate::app::{App, AppMode};
use crate::graphics::{ThumbnailWidget, fit_thumbnail};
use crate::hydration::{AnalysisPhase, ClipCard, StreamPhase};
use crate::input::TextInput;
use crate::session::SearchPhase;
use crate::theme::Theme;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// `HH:MM:SS` for a clip offset in seconds.
pub fn format_timestamp(seconds: f64) -> String {
  let delta = chrono::TimeDelta::seconds(seconds.max(0.0).floor() as i64);
  format!("{:02}:{:02}:{:02}", delta.num_hours(), delta.num_minutes() % 60, delta.num_seconds() % 60)
}

pub fn format_range(start: f64, end: f64) -> String {
  format!("{} - {}", format_timestamp(start), format_timestamp(end))
}

fn panel<'a>(title: &'a str, theme: &Theme, focused: bool) -> Block<'a> {
  let color = if focused { theme.accent } else { theme.border };
  Block::bordered()
    .title(format!(" {} ", title))
    .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(color))
}

// --- UI Rendering ---

pub fn ui<B: Backend>(frame: &mut Frame, app: &mut App<B>) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, inputs_area, main_area, engineered_area, status_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Min(6),
    Constraint::Length(1),
    Constraint::Length(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  let [index_area, custom_area] =
    Layout::horizontal([Constraint::Percentage(32), Constraint::Percentage(68)]).areas(inputs_area);
  let [prompts_area, results_area, card_area] =
    Layout::horizontal([Constraint::Percentage(26), Constraint::Percentage(42), Constraint::Percentage(32)])
      .areas(main_area);

  render_header(frame, theme, header_area);

  let mode = app.mode;
  let index_cursor = render_text_input(frame, theme, &mut app.index_id, "Index ID", mode == AppMode::Index, index_area);
  let custom_cursor =
    render_text_input(frame, theme, &mut app.custom, "Custom prompt", mode == AppMode::Custom, custom_area);

  let edit_cursor = render_prompts(frame, app, prompts_area);
  render_results(frame, app, results_area);
  render_card(frame, app, card_area);
  render_engineered(frame, app, engineered_area);
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);

  let cursor = match mode {
    AppMode::Index => index_cursor,
    AppMode::Custom => custom_cursor,
    AppMode::EditPrompt => edit_cursor,
    _ => None,
  };
  if let Some(position) = cursor {
    frame.set_cursor_position(position);
  }
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left = Line::from(Span::styled(" ◉ clipfind ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

/// Draw a bordered single-line input; returns the cursor cell.
fn render_text_input(
  frame: &mut Frame,
  theme: &Theme,
  input: &mut TextInput,
  title: &str,
  focused: bool,
  area: Rect,
) -> Option<(u16, u16)> {
  let block = panel(title, theme, focused).padding(Padding::horizontal(1));
  let inner_w = area.width.saturating_sub(4) as usize;
  let visible = scroll_into_view(input, inner_w);
  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block), area);

  let cursor_col = display_width(&input.value, input.cursor);
  Some((area.x + 2 + (cursor_col.saturating_sub(input.scroll)) as u16, area.y + 1))
}

/// Adjust `input.scroll` so the cursor stays visible and return the visible slice.
fn scroll_into_view(input: &mut TextInput, inner_w: usize) -> String {
  let cursor_col = display_width(&input.value, input.cursor);
  if cursor_col < input.scroll {
    input.scroll = cursor_col;
  } else if inner_w > 0 && cursor_col >= input.scroll + inner_w {
    input.scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let scroll = input.scroll;
  input
    .value
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= scroll)
    .take_while(|(start, _, _)| *start < scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect()
}

fn render_prompts<B: Backend>(frame: &mut Frame, app: &mut App<B>, area: Rect) -> Option<(u16, u16)> {
  let theme = app.theme();
  let focused = matches!(app.mode, AppMode::Prompts | AppMode::EditPrompt);
  let inner_w = area.width.saturating_sub(4) as usize;
  let editing = app.mode == AppMode::EditPrompt;
  let selected = app.prompt_state.selected();

  let mut edit_cursor = None;
  if editing {
    scroll_into_view(&mut app.prompt_edit, inner_w);
  }
  let items: Vec<ListItem> = app
    .prompts
    .iter()
    .enumerate()
    .map(|(i, prompt)| {
      let text = if editing && Some(i) == selected {
        let visible = scroll_into_view(&mut app.prompt_edit.clone(), inner_w);
        Span::styled(visible, Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED))
      } else {
        Span::styled(truncate_str(prompt, inner_w), Style::default().fg(theme.fg))
      };
      let bg = if i % 2 == 1 { theme.stripe_bg } else { theme.bg };
      ListItem::new(Line::from(text)).bg(bg)
    })
    .collect();

  if editing && let Some(i) = selected {
    let offset = app.prompt_state.offset();
    let row = i.saturating_sub(offset) as u16;
    let col = display_width(&app.prompt_edit.value, app.prompt_edit.cursor).saturating_sub(app.prompt_edit.scroll);
    edit_cursor = Some((area.x + 3 + col as u16, area.y + 1 + row));
  }

  let list = List::new(items)
    .block(panel("Prompts", theme, focused))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));
  frame.render_stateful_widget(list, area, &mut app.prompt_state);
  edit_cursor
}

fn card_marker<B: Backend>(app: &App<B>, card: &ClipCard<B>) -> &'static str {
  if card.player.as_ref().is_some_and(|p| p.is_playing()) {
    return "♪";
  }
  match card.state.stream {
    StreamPhase::Processing => app.spinner(),
    StreamPhase::Ready => "▶",
    StreamPhase::Failed => "✗",
  }
}

fn render_results<B: Backend>(frame: &mut Frame, app: &mut App<B>, area: Rect) {
  let theme = app.theme();
  let block = panel("Results", theme, app.mode == AppMode::Results);

  if app.cards.is_empty() {
    let message = match app.session.phase {
      SearchPhase::Engineering | SearchPhase::Searching => format!("{} Loading results…", app.spinner()),
      SearchPhase::Done => "No clips matched this prompt.".to_string(),
      SearchPhase::Errored => "Search failed. See the status line.".to_string(),
      SearchPhase::Idle => "Pick a prompt and press Enter.".to_string(),
    };
    let lines = vec![Line::from(""), Line::from(Span::styled(message, Style::default().fg(theme.muted)))];
    let paragraph = Paragraph::new(lines).alignment(Alignment::Center).block(block);
    frame.render_widget(paragraph, area);
    return;
  }

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;
  let items: Vec<ListItem> = app
    .cards
    .iter()
    .enumerate()
    .map(|(i, card)| {
      let is_selected = Some(i) == app.list_state.selected();
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let marker = card_marker(app, card);
      let right = format!("{}  {}", format_range(card.clip.start_seconds, card.clip.end_seconds), card.clip.confidence);
      let right_w = right.chars().count();
      let title_max = inner_w.saturating_sub(right_w + 4);
      let title = truncate_str(&card.state.title, title_max);
      let gap = inner_w.saturating_sub(title.chars().count() + right_w + 2);

      let line = Line::from(vec![
        Span::styled(format!("{} ", marker), Style::default().fg(theme.accent)),
        Span::styled(title, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(right, Style::default().fg(theme.muted)),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  let title = format!("Results ({})", app.cards.len());
  let list = List::new(items)
    .block(panel(&title, theme, app.mode == AppMode::Results))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));
  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_card<B: Backend>(frame: &mut Frame, app: &mut App<B>, area: Rect) {
  let theme = app.theme();
  let title = if app.show_details { "Details" } else { "Clip" };
  let block = panel(title, theme, false).padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let Some(selected) = app.list_state.selected() else { return };
  let Some(card) = app.cards.get(selected) else { return };

  let [thumb_area, text_area] = Layout::vertical([Constraint::Percentage(45), Constraint::Min(3)]).areas(inner);

  if let Some(image) = &card.thumbnail {
    let video_id = &card.clip.video_id;
    let needs_resize = match &app.thumbs.resized {
      Some((id, w, h, _)) => id != video_id || *w != thumb_area.width || *h != thumb_area.height,
      None => true,
    };
    if needs_resize {
      let resized = fit_thumbnail(image, thumb_area, app.display_mode);
      app.thumbs.resized = Some((video_id.clone(), thumb_area.width, thumb_area.height, resized));
    }
    if let Some((_, _, _, resized)) = &app.thumbs.resized {
      frame.render_widget(ThumbnailWidget { image: resized, display_mode: app.display_mode }, thumb_area);
    }
  } else {
    let placeholder = match card.state.stream {
      StreamPhase::Processing => {
        format!("{} {}", app.spinner(), card.state.status_message.as_deref().unwrap_or("Loading…"))
      }
      _ => "No thumbnail".to_string(),
    };
    let lines = vec![Line::from(""), Line::from(Span::styled(placeholder, Style::default().fg(theme.muted)))];
    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, thumb_area);
  }

  let muted = Style::default().fg(theme.muted);
  let title_line = match card.state.analysis {
    AnalysisPhase::Analyzing => format!("{} {}", app.spinner(), card.state.title),
    AnalysisPhase::Analyzed => card.state.title.clone(),
  };
  let mut lines = vec![
    Line::from(""),
    Line::from(Span::styled(title_line, Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
    Line::from(vec![
      Span::styled(format_range(card.clip.start_seconds, card.clip.end_seconds), Style::default().fg(theme.fg)),
      Span::styled(format!("  {}", card.clip.confidence), muted),
    ]),
  ];
  if let Some(message) = &card.state.status_message {
    let color = if card.state.stream == StreamPhase::Failed { theme.error } else { theme.status };
    lines.push(Line::from(Span::styled(message.clone(), Style::default().fg(color))));
  }
  if app.show_details {
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(card.state.summary.clone(), Style::default().fg(theme.fg))));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(format!("Video  {}", card.clip.video_id), muted)));
    if let Some(url) = &card.state.stream_url {
      lines.push(Line::from(Span::styled(format!("Stream {}", url), muted)));
    }
    if let Some(player) = &card.player {
      lines.push(Line::from(Span::styled(format!("Plays from {}", format_timestamp(player.start_seconds())), muted)));
    }
  } else if let Some(status) = card.player.as_ref().and_then(|p| p.last_status()) {
    lines.push(Line::from(Span::styled(format!("♪ {}", status), Style::default().fg(theme.status))));
  }
  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), text_area);
}

fn render_engineered<B: Backend>(frame: &mut Frame, app: &App<B>, area: Rect) {
  let theme = app.theme();
  let Some(prompt) = &app.session.engineered_prompt else { return };
  let line = Line::from(vec![
    Span::styled(" Engineered prompt: ", Style::default().fg(theme.muted)),
    Span::styled(truncate_str(prompt, area.width.saturating_sub(21) as usize), Style::default().fg(theme.accent)),
  ]);
  frame.render_widget(line, area);
}

fn render_status<B: Backend>(frame: &mut Frame, app: &App<B>, area: Rect) {
  let theme = app.theme();
  let player_status = app.playing_card().and_then(|c| c.player.as_ref()).and_then(|p| p.last_status());
  let (text, style) = if let Some(msg) = app.search_status() {
    (format!(" {} {}", app.spinner(), msg), Style::default().fg(theme.status))
  } else if let Some(err) = app.last_error.as_ref().or(app.session.error.as_ref()) {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(status) = player_status {
    (format!(" ♪ {}", status), Style::default().fg(theme.status))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer<B: Backend>(frame: &mut Frame, app: &App<B>, area: Rect) {
  let theme = app.theme();
  let is_playing = app.playing_card().is_some();
  let mut keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Index => vec![("Enter", "Prompts"), ("Tab", "Next")],
    AppMode::Prompts => vec![("Enter", "Search"), ("e", "Edit"), ("d", "Duplicate"), ("c", "Custom"), ("Tab", "Next")],
    AppMode::EditPrompt => vec![("Enter", "Save"), ("Esc", "Cancel")],
    AppMode::Custom => vec![("Enter", "Engineer & search"), ("Tab", "Next")],
    AppMode::Results => {
      let mut k = vec![("Enter", "Play"), ("j/k", "Navigate"), ("b", "Flip card")];
      if is_playing {
        let pause_label = if app.playing_card().and_then(|c| c.player.as_ref()).is_some_and(|p| p.paused) {
          "Resume"
        } else {
          "Pause"
        };
        k.push(("Space", pause_label));
      }
      k
    }
  };
  if is_playing {
    keys.push(("^s", "Stop"));
  }
  keys.push(("^t", "Theme"));
  keys.push(("^c", "Quit"));

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
