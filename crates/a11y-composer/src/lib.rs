//! Paginated accessibility report documents
//!
//! [`ReportComposer`] turns a [`a11y_types::ScanResult`] plus the crop images
//! of its failing nodes into an A4 PDF:
//!
//! 1. a cover page with the title, the scanned URL and footer attribution,
//! 2. a legend page explaining the terminology and the impact colors,
//! 3. one block per violation, each with one sub-block per failing node.
//!
//! Layout is a single vertical cursor (see [`layout`]); rendering to PDF is a
//! separate pass (see [`render`]) so the layout can be inspected in tests.

pub mod compose;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod render;
pub mod style;

pub use compose::{
    Branding, ComposedReport, CropDirectory, EvidenceSource, NodeOutline, ReportComposer,
    ReportOutline, ViolationOutline,
};
pub use error::ComposeError;
pub use layout::{PageLayout, Placement, TextStyle};
pub use render::render_pdf;
