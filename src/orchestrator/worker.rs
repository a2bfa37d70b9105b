//! Background worker that drives pending jobs through the engine.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{EngineStatus, JobEvent, Shared};
use crate::engine::{EngineEvent, RemuxCommand};
use crate::job::{Artifact, JobId, FAILURE_MESSAGE};

/// Commands sent to the worker task.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    /// Convert every pending job, in order
    ProcessPending,
    /// Stop after the current job
    Shutdown,
}

/// Outcome of driving one job.
enum Step {
    /// Move on to the next pending job
    Continue,
    /// The engine is unusable; leave the rest pending
    Halt,
}

/// Worker main loop.
pub(crate) async fn run(shared: Arc<Shared>, mut command_rx: mpsc::UnboundedReceiver<WorkerCommand>) {
    while let Some(command) = command_rx.recv().await {
        match command {
            WorkerCommand::ProcessPending => drain(&shared).await,
            WorkerCommand::Shutdown => break,
        }
    }
    log::debug!("Conversion worker stopped");
}

/// Process pending jobs until none remain.
async fn drain(shared: &Shared) {
    let mut processed = 0usize;
    loop {
        if shared.is_closed() {
            log::debug!("Orchestrator dropped, leaving remaining jobs unprocessed");
            return;
        }
        let next = shared.state.lock().next_pending();
        let Some(id) = next else { break };
        processed += 1;
        if let Step::Halt = process(shared, id).await {
            return;
        }
    }
    if processed > 0 {
        shared.emit(JobEvent::Idle);
    }
}

async fn process(shared: &Shared, id: JobId) -> Step {
    if !shared.engine.is_ready() {
        let mut state = shared.state.lock();
        if state.engine_status() == EngineStatus::Failed {
            return Step::Halt;
        }
        state.set_engine_status(EngineStatus::Loading);
        shared.publish(&state);
    }

    if let Err(e) = shared.engine.acquire().await {
        {
            let mut state = shared.state.lock();
            state.set_engine_status(EngineStatus::Failed);
            shared.publish(&state);
            log::error!(
                "Engine unavailable, {} job(s) left pending: {}",
                state.stats().pending,
                e
            );
        }
        shared.emit(JobEvent::EngineFailed);
        return Step::Halt;
    }

    let prepared = {
        let mut state = shared.state.lock();
        state.set_engine_status(EngineStatus::Ready);
        let prepared = match state.job_mut(id) {
            Some(job) => {
                if job.start() {
                    Some((
                        job.source_bytes().clone(),
                        RemuxCommand::new(job.source_extension().as_deref(), job.target_format),
                        job.source_name.clone(),
                    ))
                } else {
                    None
                }
            }
            None => None,
        };
        shared.publish(&state);
        prepared
    };

    // Job was discarded by a reset before it started.
    let Some((input, command, source_name)) = prepared else {
        return Step::Continue;
    };

    shared.emit(JobEvent::Started(id));
    log::info!("Converting {} ({}): {}", id, source_name, command.args.join(" "));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let result = {
        let conversion = shared.engine.convert(input, &command, &events_tx);
        tokio::pin!(conversion);
        loop {
            tokio::select! {
                result = &mut conversion => break result,
                Some(event) = events_rx.recv() => on_engine_event(shared, id, event),
            }
        }
    };
    while let Ok(event) = events_rx.try_recv() {
        on_engine_event(shared, id, event);
    }

    match result {
        Ok(bytes) => {
            if complete(shared, id, bytes) {
                shared.emit(JobEvent::Completed(id));
            }
        }
        Err(e) => {
            log::error!("Conversion of {} ({}) failed: {}", id, source_name, e);
            let failed = {
                let mut state = shared.state.lock();
                let failed = state
                    .job_mut(id)
                    .map(|job| job.fail(FAILURE_MESSAGE))
                    .unwrap_or(false);
                shared.publish(&state);
                failed
            };
            if failed {
                shared.emit(JobEvent::Failed(id));
            }
        }
    }

    Step::Continue
}

/// Publish the output and attach it to the job.
///
/// The host is called without the state lock held. If the job was reset
/// in the meantime the freshly published handle is revoked again.
fn complete(shared: &Shared, id: JobId, bytes: Bytes) -> bool {
    let target = {
        let state = shared.state.lock();
        state
            .job(id)
            .map(|job| (job.output_name(), job.target_format.mime_type()))
    };
    let Some((file_name, mime_type)) = target else {
        log::info!("Discarding output of {}, job was reset", id);
        return false;
    };

    let handle = shared.host.publish(&bytes, mime_type, &file_name);
    let size = bytes.len();

    let completed = {
        let mut state = shared.state.lock();
        let completed = state
            .job_mut(id)
            .map(|job| {
                job.complete(Artifact {
                    handle,
                    file_name: file_name.clone(),
                    mime_type,
                    bytes,
                })
            })
            .unwrap_or(false);
        if completed {
            shared.publish(&state);
        }
        completed
    };

    if completed {
        log::info!("{} finished: {} ({} bytes)", id, file_name, size);
    } else {
        log::info!("Discarding output of {}, job was reset", id);
        shared.host.revoke(handle);
    }
    completed
}

fn on_engine_event(shared: &Shared, id: JobId, event: EngineEvent) {
    match event {
        EngineEvent::Log(line) => log::debug!("[engine] {}", line),
        EngineEvent::Progress(fraction) => {
            let percent = (fraction * 100.0).clamp(0.0, 100.0) as f32;
            let updated = {
                let mut state = shared.state.lock();
                let updated = state
                    .job_mut(id)
                    .map(|job| job.update_progress(percent))
                    .unwrap_or(false);
                if updated {
                    shared.publish(&state);
                }
                updated
            };
            if updated {
                shared.emit(JobEvent::Progress(id, percent));
            }
        }
    }
}
