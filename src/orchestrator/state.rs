//! Orchestrator state and its read-only projection.

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::formats::TargetFormat;
use crate::input::SourceFile;
use crate::job::{ArtifactHandle, ConversionJob, JobId, JobState, JobStatus};

/// Maximum number of jobs tracked at once.
pub const MAX_JOBS: usize = 5;

/// Lifecycle of the shared engine as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    /// Never acquired
    Untouched,
    Loading,
    Ready,
    /// Load failed; stays failed for the session
    Failed,
}

/// Aggregate phase shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnginePhase {
    Idle,
    Loading,
    Converting,
    Completed,
    Error,
}

/// Compute the aggregate phase from the engine status and the current jobs.
pub fn derive_phase(engine: EngineStatus, jobs: &[ConversionJob]) -> EnginePhase {
    if jobs.is_empty() {
        return EnginePhase::Idle;
    }
    if engine == EngineStatus::Failed {
        return EnginePhase::Error;
    }
    if jobs.iter().any(|j| j.status.is_active()) {
        return EnginePhase::Converting;
    }
    if jobs.iter().any(|j| matches!(j.status, JobStatus::Pending)) {
        return match engine {
            EngineStatus::Ready => EnginePhase::Converting,
            _ => EnginePhase::Loading,
        };
    }
    if jobs.iter().any(|j| matches!(j.status, JobStatus::Completed { .. })) {
        EnginePhase::Completed
    } else {
        EnginePhase::Error
    }
}

/// Presentation view of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub source_name: String,
    pub output_name: String,
    pub target_format: TargetFormat,
    pub state: JobState,
    pub progress_percent: f32,
    pub artifact: Option<ArtifactHandle>,
    pub output_size: Option<u64>,
    pub failure_reason: Option<String>,
    pub status_text: String,
}

impl JobView {
    pub fn from_job(job: &ConversionJob) -> Self {
        Self {
            id: job.id,
            source_name: job.source_name.clone(),
            output_name: job.output_name(),
            target_format: job.target_format,
            state: job.status.state(),
            progress_percent: job.progress_percent(),
            artifact: job.artifact().map(|a| a.handle),
            output_size: job.artifact().map(|a| a.size()),
            failure_reason: job.failure_reason().map(str::to_string),
            status_text: job.status.display(),
        }
    }
}

/// Read-only projection of the orchestrator, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub phase: EnginePhase,
    pub selected_format: TargetFormat,
    pub jobs: Vec<JobView>,
}

impl Snapshot {
    /// Nothing is waiting on the engine.
    pub fn is_settled(&self) -> bool {
        !matches!(self.phase, EnginePhase::Loading | EnginePhase::Converting)
    }

    pub fn job(&self, id: JobId) -> Option<&JobView> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub pending: usize,
    pub converting: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Authoritative orchestrator state.
#[derive(Debug)]
pub struct OrchestratorState {
    jobs: Vec<ConversionJob>,
    selected_format: TargetFormat,
    engine: EngineStatus,
    next_id: u64,
}

impl OrchestratorState {
    pub fn new(selected_format: TargetFormat) -> Self {
        Self {
            jobs: Vec::new(),
            selected_format,
            engine: EngineStatus::Untouched,
            next_id: 1,
        }
    }

    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&ConversionJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut ConversionJob> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn selected_format(&self) -> TargetFormat {
        self.selected_format
    }

    pub fn engine_status(&self) -> EngineStatus {
        self.engine
    }

    pub fn set_engine_status(&mut self, status: EngineStatus) {
        self.engine = status;
    }

    pub fn phase(&self) -> EnginePhase {
        derive_phase(self.engine, &self.jobs)
    }

    /// Create pending jobs for `files` until the job limit is reached.
    ///
    /// Files beyond the limit are dropped.
    pub fn enqueue(&mut self, files: impl IntoIterator<Item = SourceFile>) -> Vec<JobId> {
        let mut ids = Vec::new();
        for file in files {
            if self.jobs.len() >= MAX_JOBS {
                log::warn!("Job limit of {} reached, dropping {}", MAX_JOBS, file.name);
                continue;
            }
            let id = JobId(self.next_id);
            self.next_id += 1;
            self.jobs.push(ConversionJob::new(
                id,
                file.name,
                file.bytes,
                self.selected_format,
            ));
            ids.push(id);
        }
        ids
    }

    /// Change the format used for future submissions.
    pub fn set_target_format(&mut self, format: TargetFormat) -> Result<(), OrchestratorError> {
        match self.phase() {
            phase @ (EnginePhase::Loading | EnginePhase::Converting) => {
                Err(OrchestratorError::Busy(phase))
            }
            _ => {
                self.selected_format = format;
                Ok(())
            }
        }
    }

    /// First pending job in submission order.
    pub fn next_pending(&self) -> Option<JobId> {
        self.jobs
            .iter()
            .find(|j| matches!(j.status, JobStatus::Pending))
            .map(|j| j.id)
    }

    /// Remove every job, returning them so their artifacts can be released.
    pub fn clear(&mut self) -> Vec<ConversionJob> {
        std::mem::take(&mut self.jobs)
    }

    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats {
            total: self.jobs.len(),
            ..Default::default()
        };
        for job in &self.jobs {
            match job.status.state() {
                JobState::Pending => stats.pending += 1,
                JobState::Converting => stats.converting += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase(),
            selected_format: self.selected_format,
            jobs: self.jobs.iter().map(JobView::from_job).collect(),
        }
    }
}
