//! Shared test doubles for the orchestrator integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Semaphore};

use remux_converter::{
    Artifact, ArtifactHandle, ArtifactHost, ConverterConfig, Engine, EngineError, EngineEvent,
    EventSender, JobEvent, Orchestrator, Snapshot, SourceFile,
};

const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scripted engine that copies the input entry to the output entry.
#[derive(Default)]
pub struct MockEngine {
    fail_load: bool,
    /// 1-based exec calls that fail
    fail_exec_on: HashSet<usize>,
    /// Fractions reported during each exec
    progress: Vec<f64>,
    /// When set, each exec waits for one permit before finishing
    gate: Option<Arc<Semaphore>>,
    pub loads: AtomicUsize,
    pub finished: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub execs: Mutex<Vec<Vec<String>>>,
    pub entries: Mutex<HashMap<String, Bytes>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            progress: vec![0.25, 0.5, 1.0],
            ..Default::default()
        }
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn failing_exec(mut self, call: usize) -> Self {
        self.fail_exec_on.insert(call);
        self
    }

    pub fn with_progress(mut self, fractions: &[f64]) -> Self {
        self.progress = fractions.to_vec();
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn exec_count(&self) -> usize {
        self.execs.lock().len()
    }

    pub fn exec_args(&self, index: usize) -> Vec<String> {
        self.execs.lock()[index].clone()
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn load(&self) -> Result<(), EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_load {
            return Err(EngineError::Init("wasm core could not be fetched".into()));
        }
        Ok(())
    }

    async fn write_entry(&self, name: &str, bytes: Bytes) -> Result<(), EngineError> {
        self.entries.lock().insert(name.to_string(), bytes);
        Ok(())
    }

    async fn exec(&self, args: &[String], events: &EventSender) -> Result<(), EngineError> {
        let call = {
            let mut execs = self.execs.lock();
            execs.push(args.to_vec());
            execs.len()
        };
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let _ = events.send(EngineEvent::Log(format!("exec {}", args.join(" "))));
        for fraction in &self.progress {
            let _ = events.send(EngineEvent::Progress(*fraction));
            tokio::task::yield_now().await;
        }

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);

        if self.fail_exec_on.contains(&call) {
            return Err(EngineError::Conversion(
                "Could not find tag for codec in stream #0".into(),
            ));
        }

        let input = self.entries.lock().get(&args[1]).cloned();
        let input = input.ok_or_else(|| EngineError::MissingEntry(args[1].clone()))?;
        let output = args.last().cloned().unwrap_or_default();
        self.entries.lock().insert(output, input);
        Ok(())
    }

    async fn read_entry(&self, name: &str) -> Result<Bytes, EngineError> {
        self.entries
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::MissingEntry(name.to_string()))
    }

    async fn delete_entry(&self, name: &str) -> Result<(), EngineError> {
        self.entries
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::MissingEntry(name.to_string()))
    }
}

/// Host that records every publish, delivery and revoke.
#[derive(Default)]
pub struct CountingHost {
    pub published: Mutex<Vec<ArtifactHandle>>,
    pub revoked: Mutex<HashMap<ArtifactHandle, usize>>,
    pub delivered: Mutex<Vec<(String, String, usize)>>,
}

impl CountingHost {
    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn revoke_count(&self, handle: ArtifactHandle) -> usize {
        self.revoked.lock().get(&handle).copied().unwrap_or(0)
    }

    pub fn total_revokes(&self) -> usize {
        self.revoked.lock().values().sum()
    }
}

impl ArtifactHost for CountingHost {
    fn publish(&self, _bytes: &Bytes, _mime_type: &str, _file_name: &str) -> ArtifactHandle {
        let handle = ArtifactHandle::new();
        self.published.lock().push(handle);
        handle
    }

    fn deliver(&self, artifact: &Artifact) -> std::io::Result<()> {
        self.delivered.lock().push((
            artifact.file_name.clone(),
            artifact.mime_type.to_string(),
            artifact.bytes.len(),
        ));
        Ok(())
    }

    fn revoke(&self, handle: ArtifactHandle) {
        *self.revoked.lock().entry(handle).or_insert(0) += 1;
    }
}

pub fn orchestrator(engine: &Arc<MockEngine>, host: &Arc<CountingHost>) -> Orchestrator {
    init_logging();
    Orchestrator::new(engine.clone(), host.clone(), &ConverterConfig::default())
}

pub fn file(name: &str, size: usize) -> SourceFile {
    SourceFile::new(name, vec![7u8; size])
}

pub fn files(names: &[&str]) -> Vec<SourceFile> {
    names.iter().map(|n| file(n, 1024)).collect()
}

/// Wait until the orchestrator has nothing loading or converting.
pub async fn settle(orchestrator: &Orchestrator) -> Snapshot {
    tokio::time::timeout(TIMEOUT, orchestrator.settled())
        .await
        .expect("orchestrator did not settle")
}

/// Receive events until one matches `done`, returning everything received.
pub async fn events_until(
    rx: &mut broadcast::Receiver<JobEvent>,
    done: impl Fn(&JobEvent) -> bool,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for job event")
            .expect("event channel closed");
        let finished = done(&event);
        events.push(event);
        if finished {
            return events;
        }
    }
}

/// Keep only lifecycle events (no progress or queue noise).
pub fn lifecycle(events: &[JobEvent]) -> Vec<JobEvent> {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                JobEvent::Started(_) | JobEvent::Completed(_) | JobEvent::Failed(_)
            )
        })
        .cloned()
        .collect()
}

/// Receive events until the worker goes away and the channel closes.
pub async fn events_until_closed(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("event channel never closed")
        {
            Ok(event) => events.push(event),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return events,
        }
    }
}
