//! Browser-driven capture for accessibility reports
//!
//! This crate owns everything that touches a live rendering session:
//!
//! - [`session`]: a headless Chrome session modelled as a scoped capability.
//!   [`with_session`] acquires it, hands it to the caller and tears it down on
//!   every exit path.
//! - [`scan`]: the scan executor, which sizes the viewport to the full page,
//!   freezes scrolling and runs axe-core.
//! - [`evidence`]: per-node screenshots, overlays and crops, keyed by
//!   [`a11y_types::EvidenceKey`].
//!
//! # Example
//!
//! ```no_run
//! use a11y_capture::{with_session, EvidenceSynthesizer, ScanExecutor, SessionConfig};
//! use a11y_types::EvidenceLayout;
//! use futures::FutureExt;
//!
//! # async fn example() -> Result<(), a11y_capture::ScanError> {
//! let config = SessionConfig::default();
//! let executor = ScanExecutor::from_script_file("axe.min.js")?;
//! let layout = EvidenceLayout::new("/tmp/evidence");
//!
//! let (scan, evidence) = with_session(&config, |session| {
//!     async move {
//!         let scan = executor.execute(session, "https://example.com").await?;
//!         let evidence = EvidenceSynthesizer::new()
//!             .synthesize(&scan, session, &layout)
//!             .await?;
//!         Ok::<_, a11y_capture::ScanError>((scan, evidence))
//!     }
//!     .boxed()
//! })
//! .await?;
//! println!("{} violations, {} crops", scan.violations.len(), evidence.crops().count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod evidence;
pub mod scan;
pub mod session;

pub use config::SessionConfig;
pub use error::{EvidenceError, ScanError};
pub use evidence::{EvidenceContext, EvidenceSynthesizer, NodeEvidence, RenderSurface};
pub use scan::ScanExecutor;
pub use session::{with_session, BrowserSession};
