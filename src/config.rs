use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::constants;

const APP_NAME: &str = "clipfind";

pub fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", APP_NAME)
}

/// How the analyze endpoint obtains title and summary from the provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
  /// Call the provider's synchronous gist/summarize endpoints.
  #[default]
  Sync,
  /// Submit one provider task per feature and poll it to completion.
  Task,
}

/// Runtime configuration, read from `config.toml` and environment overrides.
#[derive(Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  pub client: ClientConfig,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub port: u16,
  pub allowed_origins: Vec<String>,
  /// Server-held video-search credential. Takes precedence over one sent by a caller.
  pub twelvelabs_api_key: Option<String>,
  pub twelvelabs_base_url: String,
  /// LLM credential; never accepted from callers.
  pub openai_api_key: Option<String>,
  pub openai_base_url: String,
  pub llm_model: String,
  pub analysis_mode: AnalysisMode,
  pub page_limit: u32,
  pub task_timeout_secs: u64,
  pub task_poll_interval_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let c = constants();
    Self {
      port: c.default_port,
      allowed_origins: c.default_allowed_origins.clone(),
      twelvelabs_api_key: None,
      twelvelabs_base_url: c.twelvelabs_base_url.clone(),
      openai_api_key: None,
      openai_base_url: c.openai_base_url.clone(),
      llm_model: c.llm_model.clone(),
      analysis_mode: AnalysisMode::default(),
      page_limit: c.max_page_limit,
      task_timeout_secs: c.task_timeout_secs,
      task_poll_interval_secs: c.task_poll_interval_secs,
    }
  }
}

impl ServerConfig {
  /// Page size sent to the provider, never above the provider cap.
  pub fn effective_page_limit(&self) -> u32 {
    self.page_limit.clamp(1, constants().max_page_limit)
  }

  pub fn task_timeout(&self) -> Duration {
    Duration::from_secs(self.task_timeout_secs)
  }

  pub fn task_poll_interval(&self) -> Duration {
    Duration::from_secs(self.task_poll_interval_secs)
  }
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
  pub proxy_url: String,
  /// Optional per-request credential. Left unset, the proxy uses its own.
  pub api_key: Option<String>,
  pub poll_interval_secs: u64,
  pub prompts: Vec<String>,
}

impl Default for ClientConfig {
  fn default() -> Self {
    let c = constants();
    Self {
      proxy_url: c.default_proxy_url.clone(),
      api_key: None,
      poll_interval_secs: c.stream_poll_interval_secs,
      prompts: c.default_prompts.clone(),
    }
  }
}

impl ClientConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs.max(1))
  }
}

impl Config {
  pub fn default_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
  }

  /// Load configuration from `path` (or the default location) and apply environment overrides.
  ///
  /// An explicit path must exist; a missing default file means defaults.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut config = match path {
      Some(path) => {
        let content =
          std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))?
      }
      None => match Self::default_path() {
        Some(default) if default.exists() => {
          let content = std::fs::read_to_string(&default)
            .with_context(|| format!("Failed to read config file {}", default.display()))?;
          Self::parse(&content).with_context(|| format!("Invalid config file {}", default.display()))?
        }
        _ => Self::default(),
      },
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
  }

  pub fn parse(content: &str) -> Result<Self> {
    toml::from_str(content).context("Failed to parse TOML")
  }

  /// Environment overrides for secrets and deployment settings.
  pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(key) = non_empty("TWELVE_LABS_API_KEY") {
      self.server.twelvelabs_api_key = Some(key);
    }
    if let Some(key) = non_empty("OPENAI_API_KEY") {
      self.server.openai_api_key = Some(key);
    }
    if let Some(port) = non_empty("PORT").and_then(|p| p.parse().ok()) {
      self.server.port = port;
    }
    if let Some(origins) = non_empty("CLIPFIND_ALLOWED_ORIGINS") {
      self.server.allowed_origins =
        origins.split(',').map(str::trim).filter(|o| !o.is_empty()).map(str::to_string).collect();
    }
    if let Some(url) = non_empty("CLIPFIND_PROXY_URL") {
      self.client.proxy_url = url;
    }
  }
}

/// UI preferences persisted between sessions.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct Prefs {
  pub theme_name: Option<String>,
  pub index_id: Option<String>,
}

impl Prefs {
  pub fn default_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("prefs.toml"))
  }

  /// Missing or unreadable preferences are not an error.
  pub fn load_from(path: &Path) -> Self {
    if let Ok(content) = std::fs::read_to_string(path)
      && let Ok(prefs) = toml::from_str(&content)
    {
      return prefs;
    }
    Self::default()
  }

  pub fn save_to(&self, path: &Path) {
    if let Some(dir) = path.parent()
      && std::fs::create_dir_all(dir).is_ok()
      && let Ok(content) = toml::to_string(self)
    {
      let _ = std::fs::write(path, content);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn empty_file_yields_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.server.port, 3001);
    assert_eq!(config.server.analysis_mode, AnalysisMode::Sync);
    assert_eq!(config.client.proxy_url, "http://localhost:3001");
    assert_eq!(config.client.prompts.len(), 5);
    assert!(config.server.twelvelabs_api_key.is_none());
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let config = Config::parse(
      r#"
      [server]
      port = 8080
      analysis_mode = "task"

      [client]
      prompts = ["Find dogs"]
      "#,
    )
    .unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.analysis_mode, AnalysisMode::Task);
    assert_eq!(config.server.llm_model, "gpt-4o");
    assert_eq!(config.client.prompts, vec!["Find dogs"]);
    assert_eq!(config.client.poll_interval(), Duration::from_secs(5));
  }

  #[test]
  fn env_overrides_secrets_and_origins() {
    let env: HashMap<&str, &str> = HashMap::from([
      ("TWELVE_LABS_API_KEY", "tl-key"),
      ("OPENAI_API_KEY", " sk-key "),
      ("PORT", "4000"),
      ("CLIPFIND_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
    ]);
    let mut config = Config::default();
    config.apply_env(|k| env.get(k).map(|v| v.to_string()));

    assert_eq!(config.server.twelvelabs_api_key.as_deref(), Some("tl-key"));
    assert_eq!(config.server.openai_api_key.as_deref(), Some("sk-key"));
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.server.allowed_origins, vec!["https://a.example", "https://b.example"]);
  }

  #[test]
  fn blank_env_values_are_ignored() {
    let mut config = Config::default();
    config.apply_env(|k| (k == "OPENAI_API_KEY" || k == "PORT").then(|| "  ".to_string()));
    assert!(config.server.openai_api_key.is_none());
    assert_eq!(config.server.port, 3001);
  }

  #[test]
  fn page_limit_is_capped() {
    let mut server = ServerConfig::default();
    server.page_limit = 50;
    assert_eq!(server.effective_page_limit(), 10);
    server.page_limit = 0;
    assert_eq!(server.effective_page_limit(), 1);
  }

  #[test]
  fn prefs_round_trip_through_file() {
    let path = std::env::temp_dir().join(format!("clipfind-prefs-{}.toml", std::process::id()));
    let prefs = Prefs { theme_name: Some("Paper".into()), index_id: Some("idx-1".into()) };
    prefs.save_to(&path);
    let loaded = Prefs::load_from(&path);
    let _ = std::fs::remove_file(&path);
    assert_eq!(loaded.theme_name.as_deref(), Some("Paper"));
    assert_eq!(loaded.index_id.as_deref(), Some("idx-1"));
  }

  #[test]
  fn missing_prefs_are_defaults() {
    let prefs = Prefs::load_from(Path::new("/nonexistent/prefs.toml"));
    assert!(prefs.theme_name.is_none());
  }

  #[test]
  fn explicit_missing_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/clipfind.toml"))).err().unwrap();
    assert!(format!("{:#}", err).contains("Failed to read config file"));
  }
}
