//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available
//! with no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Proxy server
  pub default_port: u16,
  pub default_allowed_origins: Vec<String>,

  // Video-search provider
  pub twelvelabs_base_url: String,
  pub search_options: Vec<String>,
  pub max_page_limit: u32,
  pub task_timeout_secs: u64,
  pub task_poll_interval_secs: u64,
  pub summary_prompt: String,

  // LLM provider
  pub openai_base_url: String,
  pub llm_model: String,
  pub engineer_system_prompt: String,

  // Client
  pub default_proxy_url: String,
  pub stream_poll_interval_secs: u64,
  pub untitled_placeholder: String,
  pub summary_placeholder: String,
  pub default_prompts: Vec<String>,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; a malformed file fails the first test run.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
