use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliDisplayMode {
  Auto,
  Direct,
  Ascii,
}

/// How card thumbnails are drawn into the terminal buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  Ascii,
  Direct,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Ascii => "ASCII",
      DisplayMode::Direct => "Half-block",
    }
  }

  /// Rows of image pixels one terminal row holds.
  pub fn pixels_per_row(self) -> u32 {
    match self {
      DisplayMode::Direct => 2,
      DisplayMode::Ascii => 1,
    }
  }
}

/// True-color terminals get half-block thumbnails; everything else gets ASCII.
fn detect_from(colorterm: &str) -> DisplayMode {
  match colorterm.to_lowercase().as_str() {
    "truecolor" | "24bit" => DisplayMode::Direct,
    _ => DisplayMode::Ascii,
  }
}

pub fn detect_display_mode() -> DisplayMode {
  detect_from(&std::env::var("COLORTERM").unwrap_or_default())
}

pub fn resolve_display_mode(cli: CliDisplayMode) -> DisplayMode {
  match cli {
    CliDisplayMode::Auto => detect_display_mode(),
    CliDisplayMode::Direct => DisplayMode::Direct,
    CliDisplayMode::Ascii => DisplayMode::Ascii,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truecolor_selects_half_blocks() {
    assert_eq!(detect_from("truecolor"), DisplayMode::Direct);
    assert_eq!(detect_from("24BIT"), DisplayMode::Direct);
    assert_eq!(detect_from(""), DisplayMode::Ascii);
  }
}
