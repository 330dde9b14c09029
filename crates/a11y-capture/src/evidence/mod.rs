//! Visual evidence for failing nodes
//!
//! For every `(violation, node)` pair the synthesizer captures a viewport
//! screenshot and an element screenshot from a [`RenderSurface`], then derives
//! an overlay and a crop (see [`imaging`] and [`geometry`]). Results are
//! tracked in an [`EvidenceContext`] keyed by [`EvidenceKey`], so a skipped
//! node never shifts the evidence of the nodes after it.

pub mod geometry;
pub mod imaging;
mod synth;

pub use synth::EvidenceSynthesizer;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use a11y_types::{BoundingRect, EvidenceImage, EvidenceKey, EvidenceRole, PixelRect};

use crate::error::EvidenceError;

/// A page that can resolve elements and take screenshots.
///
/// Implemented by [`crate::BrowserSession`]; tests substitute an in-memory page.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Resolve `selector`, scroll it to the viewport center and return its
    /// bounding rectangle in viewport pixels
    async fn locate(&self, selector: &str) -> Result<BoundingRect, EvidenceError>;

    /// PNG screenshot of the current viewport
    async fn capture_viewport(&self) -> Result<Vec<u8>, EvidenceError>;

    /// PNG screenshot of the element matched by `selector`
    async fn capture_element(&self, selector: &str) -> Result<Vec<u8>, EvidenceError>;
}

/// Persisted evidence for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvidence {
    /// Element rectangle clamped to the screenshot
    pub rect: PixelRect,
    pub screen: PathBuf,
    pub element: PathBuf,
    pub overlay: PathBuf,
    pub crop: PathBuf,
}

impl NodeEvidence {
    pub fn path(&self, role: EvidenceRole) -> &Path {
        match role {
            EvidenceRole::Screen => &self.screen,
            EvidenceRole::Element => &self.element,
            EvidenceRole::Overlay => &self.overlay,
            EvidenceRole::Crop => &self.crop,
        }
    }
}

/// Per-job evidence bookkeeping
#[derive(Debug, Default)]
pub struct EvidenceContext {
    entries: BTreeMap<EvidenceKey, NodeEvidence>,
    skipped: BTreeMap<EvidenceKey, String>,
    written: BTreeMap<EvidenceRole, usize>,
}

impl EvidenceContext {
    pub fn get(&self, key: EvidenceKey) -> Option<&NodeEvidence> {
        self.entries.get(&key)
    }

    /// Number of nodes with complete evidence
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Crop images in key order
    pub fn crops(&self) -> impl Iterator<Item = (EvidenceKey, &Path)> {
        self.entries
            .iter()
            .map(|(key, evidence)| (*key, evidence.crop.as_path()))
    }

    /// Every persisted image of every complete node
    pub fn images(&self) -> Vec<EvidenceImage> {
        self.entries
            .iter()
            .flat_map(|(key, evidence)| {
                EvidenceRole::ALL.into_iter().map(move |role| EvidenceImage {
                    role,
                    key: *key,
                    path: evidence.path(role).to_path_buf(),
                })
            })
            .collect()
    }

    /// Nodes that produced no complete evidence, with the reason
    pub fn skipped(&self) -> impl Iterator<Item = (EvidenceKey, &str)> {
        self.skipped.iter().map(|(key, reason)| (*key, reason.as_str()))
    }

    /// Number of files written for a role, including files of nodes that were
    /// skipped later in the pipeline
    pub fn count(&self, role: EvidenceRole) -> usize {
        self.written.get(&role).copied().unwrap_or(0)
    }

    pub(crate) fn record_written(&mut self, role: EvidenceRole) {
        *self.written.entry(role).or_insert(0) += 1;
    }

    pub(crate) fn insert(&mut self, key: EvidenceKey, evidence: NodeEvidence) {
        self.entries.insert(key, evidence);
    }

    pub(crate) fn skip(&mut self, key: EvidenceKey, reason: impl Into<String>) {
        self.skipped.insert(key, reason.into());
    }

    /// Log when the roles disagree on how many images were produced
    pub(crate) fn check_role_counts(&self) -> bool {
        let counts: Vec<(EvidenceRole, usize)> = EvidenceRole::ALL
            .into_iter()
            .map(|role| (role, self.count(role)))
            .collect();
        let consistent = counts.windows(2).all(|pair| pair[0].1 == pair[1].1);
        if !consistent {
            warn!("Evidence image counts differ across roles: {:?}", counts);
        }
        consistent
    }
}
