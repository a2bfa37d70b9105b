//! Multi-file conversion orchestration.
//!
//! Jobs are created on submission with the format selected at that moment
//! and remuxed one at a time, in submission order, by a single background
//! worker. Presentation code observes [`Snapshot`]s and [`JobEvent`]s and
//! never touches the state directly.

mod state;
mod worker;

pub use state::{
    derive_phase, EnginePhase, EngineStatus, JobStats, JobView, OrchestratorState, Snapshot,
    MAX_JOBS,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::ConverterConfig;
use crate::engine::{Engine, EngineHandle};
use crate::error::OrchestratorError;
use crate::formats::TargetFormat;
use crate::host::ArtifactHost;
use crate::input::SourceFile;
use crate::job::JobId;

use worker::WorkerCommand;

/// Events from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was accepted into the queue
    Queued(JobId),
    /// Job started converting
    Started(JobId),
    /// Job progress update (percent)
    Progress(JobId, f32),
    /// Job produced an artifact
    Completed(JobId),
    /// Job failed
    Failed(JobId),
    /// The engine could not be loaded; pending jobs stay pending
    EngineFailed,
    /// Worker ran out of pending jobs
    Idle,
}

/// State shared between the public handle and the worker.
pub(crate) struct Shared {
    state: Mutex<OrchestratorState>,
    engine: EngineHandle,
    host: Arc<dyn ArtifactHost>,
    snapshot_tx: watch::Sender<Snapshot>,
    events_tx: broadcast::Sender<JobEvent>,
    /// Set once the public handle is dropped
    closed: AtomicBool,
}

impl Shared {
    /// Publish the current state. Called with the state lock held so
    /// snapshots are observed in mutation order.
    fn publish(&self, state: &OrchestratorState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn emit(&self, event: JobEvent) {
        let _ = self.events_tx.send(event);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop every job and revoke the artifacts they held.
    ///
    /// Returns (jobs discarded, artifacts released).
    fn release_all(&self) -> (usize, usize) {
        let discarded = {
            let mut state = self.state.lock();
            let jobs = state.clear();
            self.publish(&state);
            jobs
        };

        let mut released = 0;
        for job in &discarded {
            if let Some(artifact) = job.artifact() {
                self.host.revoke(artifact.handle);
                released += 1;
            }
        }
        (discarded.len(), released)
    }
}

/// Accepts files, drives them through the engine and owns their artifacts.
pub struct Orchestrator {
    shared: Arc<Shared>,
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl Orchestrator {
    /// Create an orchestrator and spawn its worker on the current tokio runtime.
    pub fn new(
        engine: Arc<dyn Engine>,
        host: Arc<dyn ArtifactHost>,
        config: &ConverterConfig,
    ) -> Self {
        let state = OrchestratorState::new(config.default_format);
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            engine: EngineHandle::new(engine),
            host,
            snapshot_tx,
            events_tx,
            closed: AtomicBool::new(false),
        });

        tokio::spawn(worker::run(Arc::clone(&shared), command_rx));

        Self { shared, command_tx }
    }

    /// Queue files for conversion with the currently selected format.
    ///
    /// Files beyond the job limit are dropped. Returns the ids of the jobs
    /// that were created.
    pub fn submit_files(&self, files: impl IntoIterator<Item = SourceFile>) -> Vec<JobId> {
        let ids = {
            let mut state = self.shared.state.lock();
            let ids = state.enqueue(files);
            if !ids.is_empty() {
                self.shared.publish(&state);
            }
            ids
        };

        if ids.is_empty() {
            return ids;
        }

        log::info!("Queued {} job(s)", ids.len());
        for id in &ids {
            self.shared.emit(JobEvent::Queued(*id));
        }
        let _ = self.command_tx.send(WorkerCommand::ProcessPending);
        ids
    }

    /// Select the format for future submissions.
    ///
    /// Rejected while the engine is loading or converting.
    pub fn set_target_format(&self, format: TargetFormat) -> Result<(), OrchestratorError> {
        let mut state = self.shared.state.lock();
        state.set_target_format(format)?;
        self.shared.publish(&state);
        log::info!("Target format set to {}", format.display_name());
        Ok(())
    }

    /// Deliver a completed job's artifact to the user.
    pub fn download(&self, id: JobId) -> Result<(), OrchestratorError> {
        let artifact = {
            let state = self.shared.state.lock();
            let job = state.job(id).ok_or(OrchestratorError::UnknownJob(id))?;
            job.artifact()
                .cloned()
                .ok_or(OrchestratorError::NotCompleted(id))?
        };

        self.shared
            .host
            .deliver(&artifact)
            .map_err(|e| OrchestratorError::Delivery(e.to_string()))
    }

    /// Discard every job and release their artifacts.
    ///
    /// The engine stays loaded. A conversion already in flight runs to the
    /// end and its output is dropped.
    pub fn reset(&self) {
        let (discarded, released) = self.shared.release_all();
        log::info!(
            "Reset: discarded {} job(s), released {} artifact(s)",
            discarded,
            released
        );
    }

    /// Current state.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn phase(&self) -> EnginePhase {
        self.shared.snapshot_tx.borrow().phase
    }

    pub fn selected_format(&self) -> TargetFormat {
        self.shared.state.lock().selected_format()
    }

    pub fn stats(&self) -> JobStats {
        self.shared.state.lock().stats()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Observe job events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Wait until nothing is loading or converting.
    pub async fn settled(&self) -> Snapshot {
        let mut rx = self.subscribe();
        let result = rx.wait_for(Snapshot::is_settled).await.map(|s| s.clone());
        match result {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }
}

/// Dropping the orchestrator releases every artifact. Jobs that have not
/// started are never converted; a conversion in flight finishes and its
/// output is discarded.
impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        let (discarded, released) = self.shared.release_all();
        if discarded > 0 {
            log::debug!(
                "Orchestrator dropped: discarded {} job(s), released {} artifact(s)",
                discarded,
                released
            );
        }
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
    }
}
