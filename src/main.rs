mod api;
mod app;
mod config;
mod constants;
mod display;
mod graphics;
mod hydration;
mod input;
mod llm;
mod player;
mod server;
mod session;
#[cfg(test)]
mod testing;
mod theme;
mod twelvelabs;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use api::ProxyClient;
use app::App;
use config::{Config, Prefs};
use display::CliDisplayMode;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Path to config.toml (default: platform config directory)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Thumbnail rendering: 'auto', 'direct' (half-block) or 'ascii'
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Base URL of the clipfind proxy
  #[arg(long)]
  proxy_url: Option<String>,

  /// Video-search index to query
  #[arg(long, env = "CLIPFIND_INDEX_ID")]
  index_id: Option<String>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the HTTP proxy in front of the video-search and LLM providers
  Serve {
    #[arg(short, long)]
    port: Option<u16>,
  },
  /// Print shell completions
  Completions { shell: clap_complete::Shell },
}

// --- Logging ---

fn env_filter(default: &str) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn init_server_logging() {
  tracing_subscriber::fmt().with_env_filter(env_filter("clipfind=info,tower_http=info")).init();
}

/// The terminal belongs to the UI, so logs go to a file in the data directory.
fn init_tui_logging() -> Option<WorkerGuard> {
  let dir = config::project_dirs()?.data_dir().to_path_buf();
  std::fs::create_dir_all(&dir).ok()?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "clipfind.log"));
  tracing_subscriber::fmt().with_env_filter(env_filter("clipfind=info")).with_writer(writer).with_ansi(false).init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let mut config = Config::load(args.config.as_deref())?;

  match args.command {
    Some(Command::Completions { shell }) => {
      clap_complete::generate(shell, &mut Args::command(), env!("CARGO_PKG_NAME"), &mut std::io::stdout());
      Ok(())
    }
    Some(Command::Serve { port }) => {
      init_server_logging();
      if let Some(port) = port {
        config.server.port = port;
      }
      server::serve(config.server).await
    }
    None => {
      let _guard = init_tui_logging();
      if let Some(url) = args.proxy_url {
        config.client.proxy_url = url;
      }

      let default_hook = std::panic::take_hook();
      std::panic::set_hook(Box::new(move |info| {
        ratatui::restore();
        default_hook(info);
      }));

      let mut terminal = ratatui::init();
      let result = run(&mut terminal, config, args.display_mode, args.index_id).await;
      ratatui::restore();
      result
    }
  }
}

async fn run(
  terminal: &mut DefaultTerminal,
  config: Config,
  display_mode: CliDisplayMode,
  index_id: Option<String>,
) -> Result<()> {
  let display_mode = display::resolve_display_mode(display_mode);
  let http = reqwest::Client::builder().build().context("Failed to build HTTP client")?;
  let backend = Arc::new(ProxyClient::new(http, config.client.proxy_url.clone(), config.client.api_key.clone()));

  let prefs_path = Prefs::default_path();
  let prefs = prefs_path.as_deref().map(Prefs::load_from).unwrap_or_default();
  let mut app = App::new(backend, &config.client, prefs, prefs_path, display_mode);
  if let Some(index_id) = index_id {
    app.set_index_id(&index_id);
  }
  info!(proxy = %config.client.proxy_url, mode = display_mode.label(), "tui: started");

  loop {
    app.check_pending();
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key).await?;
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  app.shutdown().await;
  info!("tui: exiting");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_definition_is_consistent() {
    Args::command().debug_assert();
  }

  #[test]
  fn serve_accepts_port_and_global_config() {
    let args = Args::try_parse_from(["clipfind", "serve", "--port", "4001", "--config", "/tmp/c.toml"]).unwrap();
    assert_eq!(args.config.as_deref(), Some(std::path::Path::new("/tmp/c.toml")));
    assert!(matches!(args.command, Some(Command::Serve { port: Some(4001) })));
  }

  #[test]
  fn tui_flags_parse_without_subcommand() {
    let args = Args::try_parse_from(["clipfind", "--display-mode", "ascii", "--index-id", "idx"]).unwrap();
    assert!(args.command.is_none());
    assert!(matches!(args.display_mode, CliDisplayMode::Ascii));
    assert_eq!(args.index_id.as_deref(), Some("idx"));
  }
}
