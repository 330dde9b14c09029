//! On-disk layout of per-job artifacts
//!
//! ```text
//! <root>/<request id>/
//!     scan.json          scan result handed from the scan stage to the report stage
//!     report.pdf         final document
//!     evidence/
//!         screens/screen_1_1.png
//!         elements/element_1_1.png
//!         overlays/overlay_1_1.png
//!         crops/crop_1_1.png
//! ```
//!
//! Every path is namespaced by request id, so concurrent jobs never share files.

use std::path::{Path, PathBuf};

use crate::evidence::{EvidenceImage, EvidenceKey, EvidenceRole};
use crate::job::RequestId;

const SCAN_FILE: &str = "scan.json";
const REPORT_FILE: &str = "report.pdf";
const EVIDENCE_DIR: &str = "evidence";

/// Root of all job artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, request_id: &RequestId) -> PathBuf {
        self.root.join(request_id.as_str())
    }

    pub fn scan_file(&self, request_id: &RequestId) -> PathBuf {
        self.job_dir(request_id).join(SCAN_FILE)
    }

    pub fn report_file(&self, request_id: &RequestId) -> PathBuf {
        self.job_dir(request_id).join(REPORT_FILE)
    }

    pub fn evidence(&self, request_id: &RequestId) -> EvidenceLayout {
        EvidenceLayout::new(self.job_dir(request_id).join(EVIDENCE_DIR))
    }
}

/// Evidence directory of a single job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLayout {
    root: PathBuf,
}

impl EvidenceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, role: EvidenceRole) -> PathBuf {
        self.root.join(role.dir_name())
    }

    pub fn path(&self, role: EvidenceRole, key: EvidenceKey) -> PathBuf {
        self.dir(role).join(key.file_name(role))
    }

    pub fn image(&self, role: EvidenceRole, key: EvidenceKey) -> EvidenceImage {
        EvidenceImage {
            role,
            key,
            path: self.path(role, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_paths_are_namespaced() {
        let layout = ArtifactLayout::new("/var/a11y");
        let id = RequestId::new("abc");

        assert_eq!(layout.scan_file(&id), PathBuf::from("/var/a11y/abc/scan.json"));
        assert_eq!(layout.report_file(&id), PathBuf::from("/var/a11y/abc/report.pdf"));
        assert_eq!(
            layout
                .evidence(&id)
                .path(EvidenceRole::Overlay, EvidenceKey::new(1, 0)),
            PathBuf::from("/var/a11y/abc/evidence/overlays/overlay_2_1.png")
        );
    }

    #[test]
    fn test_distinct_requests_never_share_evidence() {
        let layout = ArtifactLayout::new("/tmp/root");
        let key = EvidenceKey::new(0, 0);
        let a = layout.evidence(&RequestId::new("a")).path(EvidenceRole::Crop, key);
        let b = layout.evidence(&RequestId::new("b")).path(EvidenceRole::Crop, key);
        assert_ne!(a, b);
    }
}
