use a11y_types::EvidenceKey;
use chromiumoxide::error::CdpError;
use thiserror::Error;

/// Job-fatal failures of the scan stage
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid scan target '{0}': expected an http:// or https:// URL")]
    InvalidTarget(String),

    #[error("Failed to launch browser session: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Accessibility audit failed: {0}")]
    Audit(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("Browser protocol error: {0}")]
    Protocol(#[from] CdpError),

    #[error("Failed to decode browser result: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Evidence synthesis failed: {0}")]
    Evidence(#[from] EvidenceError),
}

/// Evidence failures. Per-node variants are recovered from by skipping the node.
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Crop for element {0} has no area")]
    DegenerateCrop(EvidenceKey),

    #[error("Image task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
