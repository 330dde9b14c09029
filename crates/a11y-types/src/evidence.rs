//! Evidence identifiers and geometry primitives

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable composite key of a failing node: `(violation index, node index)`.
///
/// Indices are zero-based; file names use the one-based pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceKey {
    pub violation: usize,
    pub node: usize,
}

impl EvidenceKey {
    pub fn new(violation: usize, node: usize) -> Self {
        Self { violation, node }
    }

    /// File name for this key under the given role, e.g. `crop_2_1.png`
    pub fn file_name(&self, role: EvidenceRole) -> String {
        format!("{}_{}_{}.png", role.prefix(), self.violation + 1, self.node + 1)
    }

    /// One-based ordinal as printed in the report, e.g. `2.1`
    pub fn ordinal(&self) -> String {
        format!("{}.{}", self.violation + 1, self.node + 1)
    }
}

impl fmt::Display for EvidenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.violation + 1, self.node + 1)
    }
}

/// What an evidence image shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceRole {
    /// Full viewport screenshot with the element scrolled to center
    Screen,
    /// Screenshot of the element alone
    Element,
    /// Muted screen with the bordered element composited on top
    Overlay,
    /// Overlay cropped around the element
    Crop,
}

impl EvidenceRole {
    pub const ALL: [EvidenceRole; 4] = [
        EvidenceRole::Screen,
        EvidenceRole::Element,
        EvidenceRole::Overlay,
        EvidenceRole::Crop,
    ];

    /// Subdirectory holding images of this role
    pub fn dir_name(self) -> &'static str {
        match self {
            EvidenceRole::Screen => "screens",
            EvidenceRole::Element => "elements",
            EvidenceRole::Overlay => "overlays",
            EvidenceRole::Crop => "crops",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            EvidenceRole::Screen => "screen",
            EvidenceRole::Element => "element",
            EvidenceRole::Overlay => "overlay",
            EvidenceRole::Crop => "crop",
        }
    }
}

/// A persisted evidence image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceImage {
    pub role: EvidenceRole,
    pub key: EvidenceKey,
    pub path: PathBuf,
}

/// Element rectangle as reported by `getBoundingClientRect()`, in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer pixel rectangle inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    /// Whether the rectangle lies entirely inside a `width` x `height` image
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= u64::from(width) && self.bottom() <= u64::from(height)
    }
}
