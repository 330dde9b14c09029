//! Report jobs and their stage machine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of one report request, assigned by the submitting collaborator
/// or generated on arrival when the submission carries none
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for a submission that arrives without `requestId`
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can be used as a single path component
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the user the request is billed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(String);

impl RequesterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound request to scan a domain and produce a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSubmission {
    pub target_domain: String,
    #[serde(rename = "requesterIdentity")]
    pub requester: RequesterId,
    #[serde(default = "RequestId::generate")]
    pub request_id: RequestId,
}

/// Lifecycle stage of a report job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Queued,
    Scanning,
    Synthesizing,
    Composing,
    Completed,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobStage::Queued => 0,
            JobStage::Scanning => 1,
            JobStage::Synthesizing => 2,
            JobStage::Composing => 3,
            JobStage::Completed | JobStage::Failed => 4,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Queued => "queued",
            JobStage::Scanning => "scanning",
            JobStage::Synthesizing => "synthesizing",
            JobStage::Composing => "composing",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final outcome reported to the status collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already {current}; cannot move to {requested}")]
    Terminal {
        current: JobStage,
        requested: JobStage,
    },

    #[error("cannot move job backwards from {current} to {requested}")]
    Backwards {
        current: JobStage,
        requested: JobStage,
    },
}

/// A report job as tracked by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: RequestId,
    pub domain: String,
    pub requester: RequesterId,
    pub stage: JobStage,
}

impl ReportJob {
    pub fn queued(submission: &ScanSubmission) -> Self {
        Self {
            id: submission.request_id.clone(),
            domain: submission.target_domain.clone(),
            requester: submission.requester.clone(),
            stage: JobStage::Queued,
        }
    }

    /// Move the job forward.
    ///
    /// Returns `Ok(true)` when the stage changed and `Ok(false)` when the job is
    /// already at `next` (re-signalling is a no-op). `Failed` is reachable from
    /// every non-terminal stage; everything else only moves forward.
    pub fn advance(&mut self, next: JobStage) -> Result<bool, TransitionError> {
        let current = self.stage;
        if current == next {
            return Ok(false);
        }
        if current.is_terminal() {
            return Err(TransitionError::Terminal {
                current,
                requested: next,
            });
        }
        if next != JobStage::Failed && next.rank() <= current.rank() {
            return Err(TransitionError::Backwards {
                current,
                requested: next,
            });
        }
        self.stage = next;
        Ok(true)
    }
}
