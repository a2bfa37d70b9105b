//! Artifact hosting and download delivery.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::ConverterConfig;
use crate::job::{Artifact, ArtifactHandle};

/// Where completed outputs are published and delivered to the user.
///
/// Every handle returned by `publish` is passed to `revoke` exactly once
/// when its job is discarded.
pub trait ArtifactHost: Send + Sync {
    /// Register output bytes and return a downloadable handle.
    fn publish(&self, bytes: &Bytes, mime_type: &str, file_name: &str) -> ArtifactHandle;

    /// Hand a published artifact to the user.
    fn deliver(&self, artifact: &Artifact) -> io::Result<()>;

    /// Release a handle returned by `publish`.
    fn revoke(&self, handle: ArtifactHandle);
}

/// Host that saves delivered artifacts into a directory.
pub struct DirectoryHost {
    output_dir: PathBuf,
    live: Mutex<HashSet<ArtifactHandle>>,
}

impl DirectoryHost {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            live: Mutex::new(HashSet::new()),
        }
    }

    /// Create a host that saves into the configured `output_dir`.
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.output_dir.clone())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of handles published and not yet revoked.
    pub fn live_handles(&self) -> usize {
        self.live.lock().len()
    }
}

impl ArtifactHost for DirectoryHost {
    fn publish(&self, bytes: &Bytes, _mime_type: &str, file_name: &str) -> ArtifactHandle {
        let handle = ArtifactHandle::new();
        log::debug!("Published {} ({} bytes) as {:?}", file_name, bytes.len(), handle);
        self.live.lock().insert(handle);
        handle
    }

    fn deliver(&self, artifact: &Artifact) -> io::Result<()> {
        if !self.live.lock().contains(&artifact.handle) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("artifact {} was revoked", artifact.file_name),
            ));
        }
        std::fs::create_dir_all(&self.output_dir)?;
        let name = Path::new(&artifact.file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty file name"))?;
        let path = self.output_dir.join(name);
        std::fs::write(&path, &artifact.bytes)?;
        log::info!("Saved {} to {}", artifact.file_name, path.display());
        Ok(())
    }

    fn revoke(&self, handle: ArtifactHandle) {
        if !self.live.lock().remove(&handle) {
            log::warn!("Revoking unknown artifact handle {:?}", handle);
        }
    }
}
