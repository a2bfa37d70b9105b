//! Conversion engine boundary.
//!
//! The engine is a black box that remuxes bytes held in named scratch
//! entries. [`EngineHandle`] loads it once per session and guarantees that
//! every entry created for a conversion is removed afterwards.

mod command;
mod ffmpeg;

pub use command::{RemuxCommand, PLACEHOLDER_INPUT_EXTENSION};
pub use ffmpeg::FfmpegEngine;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, OnceCell};

use crate::error::EngineError;

/// Events emitted by the engine while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A diagnostic line
    Log(String),
    /// Fraction complete (0.0 - 1.0) of the current operation
    Progress(f64),
}

/// Sender the engine reports events through.
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

/// The external media engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Perform one-time initialization.
    async fn load(&self) -> Result<(), EngineError>;

    /// Create or replace a scratch entry.
    async fn write_entry(&self, name: &str, bytes: Bytes) -> Result<(), EngineError>;

    /// Run one command against the scratch entries.
    async fn exec(&self, args: &[String], events: &EventSender) -> Result<(), EngineError>;

    /// Read a scratch entry.
    async fn read_entry(&self, name: &str) -> Result<Bytes, EngineError>;

    /// Remove a scratch entry.
    async fn delete_entry(&self, name: &str) -> Result<(), EngineError>;
}

/// Lazily loaded, shared engine instance.
pub struct EngineHandle {
    engine: Arc<dyn Engine>,
    loaded: OnceCell<Result<(), EngineError>>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            loaded: OnceCell::new(),
        }
    }

    /// Return the engine, loading it on first use.
    ///
    /// Concurrent callers share a single load. A failed load is remembered
    /// and returned to every later caller without retrying.
    pub async fn acquire(&self) -> Result<&dyn Engine, EngineError> {
        let outcome = self
            .loaded
            .get_or_init(|| async {
                log::info!("Loading conversion engine");
                match self.engine.load().await {
                    Ok(()) => {
                        log::info!("Conversion engine ready");
                        Ok(())
                    }
                    Err(e) => {
                        log::error!("Conversion engine failed to load: {}", e);
                        Err(match e {
                            EngineError::Init(_) => e,
                            other => EngineError::Init(other.to_string()),
                        })
                    }
                }
            })
            .await;

        match outcome {
            Ok(()) => Ok(self.engine.as_ref()),
            Err(e) => Err(e.clone()),
        }
    }

    /// Whether the engine finished loading successfully.
    pub fn is_ready(&self) -> bool {
        matches!(self.loaded.get(), Some(Ok(())))
    }

    /// Whether loading was attempted and failed.
    pub fn has_failed(&self) -> bool {
        matches!(self.loaded.get(), Some(Err(_)))
    }

    /// Remux `input` according to `command`, returning the output bytes.
    ///
    /// Both scratch entries are deleted before this returns, whatever the outcome.
    pub async fn convert(
        &self,
        input: Bytes,
        command: &RemuxCommand,
        events: &EventSender,
    ) -> Result<Bytes, EngineError> {
        let engine = self.acquire().await?;
        let result = Self::run(engine, input, command, events).await;

        for name in [&command.input_name, &command.output_name] {
            if let Err(e) = engine.delete_entry(name).await {
                log::debug!("Could not remove scratch entry {}: {}", name, e);
            }
        }

        result
    }

    async fn run(
        engine: &dyn Engine,
        input: Bytes,
        command: &RemuxCommand,
        events: &EventSender,
    ) -> Result<Bytes, EngineError> {
        engine.write_entry(&command.input_name, input).await?;
        engine.exec(&command.args, events).await?;
        engine.read_entry(&command.output_name).await
    }
}
