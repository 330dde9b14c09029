//! Two-stage job pipeline for accessibility reports
//!
//! ```text
//! submit ─▶ [scan queue] ─ CaptureWorker ─▶ scan.json + evidence/
//!                                  │ handoff
//!                                  ▼
//!           [report queue] ─ ComposeWorker ─▶ report.pdf
//! ```
//!
//! Each queue runs its jobs on a [`StageWorker`] with bounded concurrency and
//! job-level retry. The [`Orchestrator`] reacts to every stage outcome, hands
//! completed scans to the report stage and reports terminal states to a
//! [`StatusSink`]. Failed requests are refunded exactly once.

pub mod board;
pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod orchestrator;
pub mod queue;
pub mod status;
pub mod workers;

pub use board::JobBoard;
pub use config::{PipelineConfig, WorkerConfig};
pub use error::{PipelineError, StatusError};
pub use events::{Journal, JournalEntry, JournalKind, Outcome, Stage, StageEvent};
pub use jobs::{ComposeJob, ReportArtifact, ScanArtifacts, ScanJob};
pub use orchestrator::Orchestrator;
pub use queue::{QueueSettings, StageContext, StageJob, StageQueue, StageWorker};
pub use status::{InMemoryStatusStore, StatusRecord, StatusSink};
pub use workers::{CaptureWorker, ComposeWorker};
