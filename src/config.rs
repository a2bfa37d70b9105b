//! Converter configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::formats::TargetFormat;

/// Settings for the orchestrator and the native engine/host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Format selected when the orchestrator starts
    pub default_format: TargetFormat,
    /// Buffered job events per subscriber
    pub event_capacity: usize,
    /// Explicit ffmpeg binary; searched for when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// Parent of the engine scratch directory; system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    /// Where delivered artifacts are written
    pub output_dir: PathBuf,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            default_format: TargetFormat::Mp4,
            event_capacity: 256,
            ffmpeg_path: None,
            scratch_dir: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl ConverterConfig {
    /// Save to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Saved converter config to {:?}", path);
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        log::info!("Loaded converter config from {:?}", path);
        Ok(config)
    }
}
