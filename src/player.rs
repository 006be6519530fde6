use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  process::{Child, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::{debug, info};

/// mpv bound to one clip's HLS stream, opened at the clip's start offset.
///
/// Created when the stream becomes ready; the process only starts on `play`.
/// Dropping the player kills mpv and removes its IPC socket.
pub struct ClipPlayer {
  video_id: String,
  stream_url: String,
  start_seconds: f64,
  process: Option<Child>,
  monitor_handle: Option<JoinHandle<()>>,
  status_rx: Option<mpsc::Receiver<String>>,
  last_status: Option<String>,
  ipc_socket_path: Option<PathBuf>,
  pub paused: bool,
}

impl ClipPlayer {
  pub fn new(video_id: &str, stream_url: &str, start_seconds: f64) -> Self {
    Self {
      video_id: video_id.to_string(),
      stream_url: stream_url.to_string(),
      start_seconds,
      process: None,
      monitor_handle: None,
      status_rx: None,
      last_status: None,
      ipc_socket_path: None,
      paused: false,
    }
  }

  pub fn start_seconds(&self) -> f64 {
    self.start_seconds
  }

  pub fn is_playing(&self) -> bool {
    self.process.is_some()
  }

  pub fn check_status(&mut self) {
    if let Some(rx) = &mut self.status_rx {
      while let Ok(status) = rx.try_recv() {
        self.last_status = Some(status);
      }
    }
  }

  pub fn last_status(&self) -> Option<&str> {
    self.last_status.as_deref()
  }

  fn mpv_args(&self, socket_path: &str) -> Vec<String> {
    vec![
      format!("--start={:.3}", self.start_seconds.max(0.0)),
      "--force-window=yes".to_string(),
      "--term-status-msg=Time: ${time-pos/full} / ${duration/full} | ${pause} ${percent-pos}%".to_string(),
      format!("--input-ipc-server={}", socket_path),
      self.stream_url.clone(),
    ]
  }

  pub async fn play(&mut self) -> Result<()> {
    self.stop().await.context("Failed to stop previous playback")?;
    self.paused = false;

    let socket_path = std::env::temp_dir().join(format!("clipfind-mpv-{}-{}.sock", std::process::id(), self.video_id));
    let socket_path_str = socket_path.to_str().context("Temp dir path is not valid UTF-8")?.to_string();
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let mut cmd = Command::new("mpv");
    cmd.args(self.mpv_args(&socket_path_str));
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    let stdout = child.stdout.take().context("Failed to get mpv stdout")?;
    let (tx, rx) = mpsc::channel::<String>(10);
    self.status_rx = Some(rx);

    let monitor_handle = tokio::spawn(async move {
      let mut lines = BufReader::new(stdout).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
          break;
        }
      }
    });

    info!(video_id = %self.video_id, start = self.start_seconds, "player: launched mpv");
    self.process = Some(child);
    self.monitor_handle = Some(monitor_handle);
    self.ipc_socket_path = Some(socket_path);
    Ok(())
  }

  pub async fn toggle_pause(&mut self) -> Result<()> {
    let Some(ref socket_path) = self.ipc_socket_path else {
      return Ok(());
    };
    let stream = tokio::net::UnixStream::connect(socket_path).await.context("Failed to connect to mpv IPC socket")?;
    stream.writable().await.context("mpv IPC socket not writable")?;
    let cmd = b"{\"command\":[\"cycle\",\"pause\"]}\n";
    let written = stream.try_write(cmd).context("Failed to send pause command to mpv")?;
    if written < cmd.len() {
      return Err(anyhow!("Partial write to mpv IPC socket: wrote {} of {} bytes", written, cmd.len()));
    }
    self.paused = !self.paused;
    Ok(())
  }

  pub async fn stop(&mut self) -> Result<()> {
    if let Some(handle) = self.monitor_handle.take() {
      handle.abort();
      let _ = handle.await;
    }
    self.status_rx = None;
    self.last_status = None;

    if let Some(mut child) = self.process.take() {
      debug!(video_id = %self.video_id, "player: stopping mpv");
      child.kill().await.context("Failed to kill mpv process")?;
      let _ = child.wait().await;
    }
    self.paused = false;

    if let Some(path) = self.ipc_socket_path.take() {
      let _ = std::fs::remove_file(&path);
    }
    Ok(())
  }
}

impl Drop for ClipPlayer {
  fn drop(&mut self) {
    if let Some(handle) = self.monitor_handle.take() {
      handle.abort();
    }
    if let Some(path) = self.ipc_socket_path.take() {
      let _ = std::fs::remove_file(&path);
    }
  }
}
