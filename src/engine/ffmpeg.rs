//! FFmpeg-backed engine for native hosts.
//!
//! Scratch entries are files in a private directory; `exec` runs the ffmpeg
//! binary inside it and turns `-progress` output into progress events.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use uuid::Uuid;

use super::{Engine, EngineEvent, EventSender};
use crate::config::ConverterConfig;
use crate::error::EngineError;

/// Number of stderr lines kept for failure diagnostics.
const STDERR_TAIL: usize = 12;

/// Engine that shells out to an ffmpeg binary.
pub struct FfmpegEngine {
    /// Explicit binary, searched for when absent
    configured_path: Option<PathBuf>,
    /// Binary resolved by `load`
    ffmpeg_path: Mutex<Option<PathBuf>>,
    /// Private directory holding scratch entries
    scratch_dir: PathBuf,
}

impl FfmpegEngine {
    /// Create an engine whose scratch directory lives under `scratch_parent`.
    pub fn new(configured_path: Option<PathBuf>, scratch_parent: Option<PathBuf>) -> Self {
        let parent = scratch_parent.unwrap_or_else(std::env::temp_dir);
        Self {
            configured_path,
            ffmpeg_path: Mutex::new(None),
            scratch_dir: parent.join(format!("remux-{}", Uuid::new_v4())),
        }
    }

    /// Create an engine from the `ffmpeg_path` and `scratch_dir` settings.
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.scratch_dir.clone())
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Find FFmpeg binary in various locations.
    fn find_ffmpeg(&self) -> Result<PathBuf, EngineError> {
        if let Some(path) = &self.configured_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(EngineError::Init(format!(
                "configured ffmpeg not found at {}",
                path.display()
            )));
        }

        if let Ok(path) = which::which("ffmpeg") {
            return Ok(path);
        }

        let common_paths: &[&str] = if cfg!(target_os = "macos") {
            &[
                "/usr/local/bin/ffmpeg",
                "/opt/homebrew/bin/ffmpeg",
                "/opt/local/bin/ffmpeg",
            ]
        } else if cfg!(target_os = "windows") {
            &[
                "C:\\ffmpeg\\bin\\ffmpeg.exe",
                "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
            ]
        } else {
            &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"]
        };

        common_paths
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .ok_or_else(|| EngineError::Init("ffmpeg binary not found".to_string()))
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        let plain = Path::new(name)
            .file_name()
            .map(|f| f == std::ffi::OsStr::new(name))
            .unwrap_or(false);
        if !plain {
            return Err(EngineError::Io(format!("invalid entry name {:?}", name)));
        }
        Ok(self.scratch_dir.join(name))
    }

    fn binary(&self) -> Result<PathBuf, EngineError> {
        self.ffmpeg_path
            .lock()
            .clone()
            .ok_or_else(|| EngineError::Init("engine not loaded".to_string()))
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    async fn load(&self) -> Result<(), EngineError> {
        let path = self.find_ffmpeg()?;

        let status = Command::new(&path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| EngineError::Init(format!("failed to run {}: {}", path.display(), e)))?;
        if !status.success() {
            return Err(EngineError::Init(format!(
                "{} -version exited with {:?}",
                path.display(),
                status.code()
            )));
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| EngineError::Init(e.to_string()))?;

        log::info!("Using ffmpeg at {}", path.display());
        *self.ffmpeg_path.lock() = Some(path);
        Ok(())
    }

    async fn write_entry(&self, name: &str, bytes: Bytes) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        tokio::fs::write(path, &bytes).await?;
        Ok(())
    }

    async fn exec(&self, args: &[String], events: &EventSender) -> Result<(), EngineError> {
        let ffmpeg = self.binary()?;

        let mut child = Command::new(ffmpeg)
            .current_dir(&self.scratch_dir)
            .args(["-y", "-hide_banner", "-nostdin", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Conversion(format!("failed to spawn ffmpeg: {}", e)))?;

        let duration = Arc::new(Mutex::new(None::<f64>));

        let stderr_task = child.stderr.take().map(|stderr| {
            let duration = Arc::clone(&duration);
            let events = events.clone();
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(seconds) = parse_duration_line(&line) {
                        duration.lock().get_or_insert(seconds);
                    }
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                    let _ = events.send(EngineEvent::Log(line));
                }
                tail
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut last_fraction = 0.0f64;
            while let Ok(Some(line)) = lines.next_line().await {
                let fraction = match parse_progress_line(&line) {
                    Some(ProgressLine::OutTime(seconds)) => match *duration.lock() {
                        Some(total) if total > 0.0 => (seconds / total).min(1.0),
                        _ => continue,
                    },
                    Some(ProgressLine::End) => 1.0,
                    None => continue,
                };
                if fraction > last_fraction {
                    last_fraction = fraction;
                    let _ = events.send(EngineEvent::Progress(fraction));
                }
            }
        }

        let status = child.wait().await?;
        let tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => VecDeque::new(),
        };

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Conversion(format!(
                "ffmpeg exited with code {:?}: {}",
                status.code(),
                Vec::from(tail).join(" | ")
            )))
        }
    }

    async fn read_entry(&self, name: &str) -> Result<Bytes, EngineError> {
        let path = self.entry_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::MissingEntry(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_entry(&self, name: &str) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::MissingEntry(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.scratch_dir);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ProgressLine {
    OutTime(f64),
    End,
}

/// Parse one `key=value` line of `-progress` output.
fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is microseconds too, despite the name
        "out_time_us" | "out_time_ms" => value
            .parse::<u64>()
            .ok()
            .map(|us| ProgressLine::OutTime(us as f64 / 1_000_000.0)),
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Extract the input duration from a stderr line like `Duration: 00:01:02.50, start: ...`.
fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.trim().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?.trim();
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
