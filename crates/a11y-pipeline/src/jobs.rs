//! Payloads and outputs of the two stages

use std::path::PathBuf;

use a11y_types::{RequestId, RequesterId, ScanSubmission};

use crate::queue::StageJob;

/// Scan-stage job: audit a domain and capture evidence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanJob {
    pub request_id: RequestId,
    pub requester: RequesterId,
    pub target_domain: String,
}

impl From<ScanSubmission> for ScanJob {
    fn from(submission: ScanSubmission) -> Self {
        Self {
            request_id: submission.request_id,
            requester: submission.requester,
            target_domain: submission.target_domain,
        }
    }
}

impl StageJob for ScanJob {
    fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

/// Where the scan stage left its results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanArtifacts {
    pub scan_file: PathBuf,
    pub evidence_dir: PathBuf,
    pub violations: usize,
    pub crops: usize,
}

/// Report-stage job, created by the handoff after a completed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeJob {
    pub request_id: RequestId,
    pub requester: RequesterId,
    pub scan_file: PathBuf,
    pub evidence_dir: PathBuf,
}

impl ComposeJob {
    pub fn handoff(scan: &ScanJob, artifacts: &ScanArtifacts) -> Self {
        Self {
            request_id: scan.request_id.clone(),
            requester: scan.requester.clone(),
            scan_file: artifacts.scan_file.clone(),
            evidence_dir: artifacts.evidence_dir.clone(),
        }
    }
}

impl StageJob for ComposeJob {
    fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

/// The finished report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub report_file: PathBuf,
    pub pages: usize,
}
