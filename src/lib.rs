//! Remux Converter Library
//!
//! Converts video files between container formats without re-encoding,
//! queueing up to five files through a single shared conversion engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod formats;
pub mod host;
pub mod input;
pub mod job;
pub mod orchestrator;

// Re-export commonly used types
pub use config::ConverterConfig;
pub use engine::{Engine, EngineEvent, EngineHandle, EventSender, FfmpegEngine, RemuxCommand};
pub use error::{EngineError, OrchestratorError};
pub use formats::TargetFormat;
pub use host::{ArtifactHost, DirectoryHost};
pub use input::SourceFile;
pub use job::{Artifact, ArtifactHandle, ConversionJob, JobId, JobState, JobStatus};
pub use orchestrator::{EnginePhase, JobEvent, Orchestrator, Snapshot, MAX_JOBS};
