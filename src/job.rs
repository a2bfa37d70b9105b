//! Conversion job definition.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::formats::TargetFormat;

/// Failure text shown for every failed job. Engine diagnostics only go to the log.
pub const FAILURE_MESSAGE: &str = "Conversion failed";

/// Identifier for a conversion job, unique within one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a published, downloadable artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactHandle(pub Uuid);

impl ArtifactHandle {
    pub fn new() -> Self {
        ArtifactHandle(Uuid::new_v4())
    }
}

impl Default for ArtifactHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Handle registered with the artifact host
    pub handle: ArtifactHandle,
    /// Suggested download name
    pub file_name: String,
    pub mime_type: &'static str,
    /// Remuxed output
    pub bytes: Bytes,
}

impl Artifact {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Status of a conversion job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Job is waiting in queue
    Pending,
    /// Job is being remuxed by the engine
    Converting {
        /// Percent complete (0.0 - 100.0), never decreases
        progress: f32,
        started_at: Instant,
    },
    /// Job produced an artifact
    Completed {
        artifact: Artifact,
        duration: Duration,
    },
    /// Job failed; `reason` is user-facing
    Failed { reason: String },
}

/// Status without payload, used in snapshots and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Converting,
    Completed,
    Failed,
}

impl JobStatus {
    /// Check if the job reached a terminal status.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }

    /// Check if the job is currently active.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Converting { .. })
    }

    pub fn state(&self) -> JobState {
        match self {
            JobStatus::Pending => JobState::Pending,
            JobStatus::Converting { .. } => JobState::Converting,
            JobStatus::Completed { .. } => JobState::Completed,
            JobStatus::Failed { .. } => JobState::Failed,
        }
    }

    /// Get a display string for the status.
    pub fn display(&self) -> String {
        match self {
            JobStatus::Pending => "Pending".to_string(),
            JobStatus::Converting { progress, .. } => format!("{:.0}%", progress),
            JobStatus::Completed { duration, .. } => {
                format!("Done ({:.1}s)", duration.as_secs_f64())
            }
            JobStatus::Failed { reason } => format!("Failed: {}", reason),
        }
    }
}

/// One submitted file and its conversion lifecycle.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Unique job identifier
    pub id: JobId,
    /// Original file name
    pub source_name: String,
    /// Input bytes, immutable after submission
    source_bytes: Bytes,
    /// Container chosen when the job was submitted
    pub target_format: TargetFormat,
    /// Current status
    pub status: JobStatus,
}

impl ConversionJob {
    /// Create a new pending job.
    pub fn new(
        id: JobId,
        source_name: impl Into<String>,
        source_bytes: Bytes,
        target_format: TargetFormat,
    ) -> Self {
        Self {
            id,
            source_name: source_name.into(),
            source_bytes,
            target_format,
            status: JobStatus::Pending,
        }
    }

    pub fn source_bytes(&self) -> &Bytes {
        &self.source_bytes
    }

    /// Lowercased extension of the source file, if it has a usable one.
    pub fn source_extension(&self) -> Option<String> {
        source_extension(&self.source_name)
    }

    /// Name offered to the user for the converted file.
    pub fn output_name(&self) -> String {
        derive_output_name(&self.source_name, self.target_format)
    }

    pub fn progress_percent(&self) -> f32 {
        match &self.status {
            JobStatus::Converting { progress, .. } => *progress,
            JobStatus::Completed { .. } => 100.0,
            _ => 0.0,
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match &self.status {
            JobStatus::Completed { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Mark the job as converting. Only valid from `Pending`.
    pub fn start(&mut self) -> bool {
        if !matches!(self.status, JobStatus::Pending) {
            return false;
        }
        self.status = JobStatus::Converting {
            progress: 0.0,
            started_at: Instant::now(),
        };
        true
    }

    /// Update progress. Values lower than the current one are ignored.
    pub fn update_progress(&mut self, percent: f32) -> bool {
        if let JobStatus::Converting { progress, .. } = &mut self.status {
            let percent = percent.clamp(0.0, 100.0);
            if percent > *progress {
                *progress = percent;
                return true;
            }
        }
        false
    }

    /// Mark the job as complete. Only valid while converting.
    pub fn complete(&mut self, artifact: Artifact) -> bool {
        if let JobStatus::Converting { started_at, .. } = &self.status {
            self.status = JobStatus::Completed {
                artifact,
                duration: started_at.elapsed(),
            };
            return true;
        }
        false
    }

    /// Mark the job as failed. Only valid while converting.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = JobStatus::Failed {
            reason: reason.into(),
        };
        true
    }
}

/// Lowercased extension of `name`, ignoring anything that is not alphanumeric.
pub fn source_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Replace the extension of `source_name` with the target format's.
pub fn derive_output_name(source_name: &str, format: TargetFormat) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{}.{}", stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> ConversionJob {
        ConversionJob::new(JobId(1), name, Bytes::from_static(b"data"), TargetFormat::Mp4)
    }

    fn artifact() -> Artifact {
        Artifact {
            handle: ArtifactHandle::new(),
            file_name: "clip.mp4".to_string(),
            mime_type: "video/mp4",
            bytes: Bytes::from_static(b"out"),
        }
    }

    #[test]
    fn test_output_name() {
        assert_eq!(derive_output_name("holiday.mkv", TargetFormat::Mp4), "holiday.mp4");
        assert_eq!(derive_output_name("a.b.avi", TargetFormat::Webm), "a.b.webm");
        assert_eq!(derive_output_name("noext", TargetFormat::Gif), "noext.gif");
        assert_eq!(derive_output_name("", TargetFormat::Mov), "output.mov");
    }

    #[test]
    fn test_source_extension() {
        assert_eq!(source_extension("Clip.MKV").as_deref(), Some("mkv"));
        assert_eq!(source_extension("clip"), None);
        assert_eq!(source_extension("clip.m k"), None);
    }

    #[test]
    fn test_forward_only_transitions() {
        let mut job = job("clip.mkv");
        assert!(!job.complete(artifact()));
        assert!(!job.fail(FAILURE_MESSAGE));
        assert!(job.start());
        assert!(!job.start());
        assert!(job.complete(artifact()));
        assert!(!job.fail(FAILURE_MESSAGE));
        assert!(job.artifact().is_some());
        assert!(job.failure_reason().is_none());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = job("clip.mkv");
        assert!(!job.update_progress(10.0));
        job.start();
        assert!(job.update_progress(40.0));
        assert!(!job.update_progress(20.0));
        assert_eq!(job.progress_percent(), 40.0);
        assert!(job.update_progress(250.0));
        assert_eq!(job.progress_percent(), 100.0);
    }

    #[test]
    fn test_failed_job_has_reason_only() {
        let mut job = job("clip.mkv");
        job.start();
        assert!(job.fail(FAILURE_MESSAGE));
        assert_eq!(job.failure_reason(), Some(FAILURE_MESSAGE));
        assert!(job.artifact().is_none());
        assert_eq!(job.status.display(), "Failed: Conversion failed");
    }
}
