//! Shared types for the accessibility report pipeline
//!
//! Every stage of the pipeline speaks in these types:
//! - [`ScanResult`] and friends mirror the axe-core result JSON
//! - [`EvidenceKey`] is the `(violation, node)` pair used to name evidence across stages
//! - [`ArtifactLayout`] and [`EvidenceLayout`] fix where each job writes its files
//! - [`ReportJob`] carries the monotonic stage machine the orchestrator drives

pub mod evidence;
pub mod job;
pub mod paths;
pub mod scan;

pub use evidence::{BoundingRect, EvidenceImage, EvidenceKey, EvidenceRole, PixelRect};
pub use job::{
    JobStage, ReportJob, RequestId, RequesterId, ScanSubmission, TerminalStatus, TransitionError,
};
pub use paths::{ArtifactLayout, EvidenceLayout};
pub use scan::{Impact, Node, ScanResult, Target, Violation};
