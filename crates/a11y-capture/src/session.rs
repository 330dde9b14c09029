//! Headless rendering session as a scoped capability
//!
//! A [`BrowserSession`] owns one Chrome process, one page and a throwaway
//! profile directory. Sessions are never shared between jobs. The only way to
//! obtain one from outside this module is [`with_session`], which guarantees
//! teardown on success, on failure, and (through the `Drop` guards) on panic:
//!
//! ```text
//! acquire ──► work(&session) ──► release
//!    │              │                │
//!    └─ launch err  └─ Ok / Err      └─ teardown errors are logged, never returned
//! ```

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::future::BoxFuture;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use a11y_types::BoundingRect;

use crate::config::SessionConfig;
use crate::error::{EvidenceError, ScanError};
use crate::evidence::RenderSurface;

/// Run `work` with a freshly launched session and tear the session down afterwards.
///
/// Launch failures are returned without calling `work`. The result of `work` is
/// returned unchanged; a failing teardown is only logged so it never masks it.
pub async fn with_session<T, E, F>(config: &SessionConfig, work: F) -> Result<T, E>
where
    F: for<'s> FnOnce(&'s BrowserSession) -> BoxFuture<'s, Result<T, E>>,
    E: From<ScanError>,
{
    let session = BrowserSession::acquire(config).await?;
    run_scoped(session, work).await
}

/// A resource torn down by an async call that consumes it
#[async_trait]
trait Release: Sized + Send {
    async fn release(self) -> Result<(), ScanError>;
}

/// Lend `resource` to `work`, then release it whatever `work` returned
async fn run_scoped<R, T, E, F>(resource: R, work: F) -> Result<T, E>
where
    R: Release,
    F: for<'s> FnOnce(&'s R) -> BoxFuture<'s, Result<T, E>>,
{
    let outcome = work(&resource).await;
    if let Err(e) = resource.release().await {
        warn!("Browser teardown failed: {}", e);
    }
    outcome
}

/// One isolated browser process with a single page
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    config: SessionConfig,
    _handler: AbortOnDrop,
    _profile: SessionProfile,
}

#[async_trait]
impl Release for BrowserSession {
    /// Close the page and the browser process. The profile directory and the
    /// event loop are cleaned up when the guards drop at the end of this call.
    async fn release(self) -> Result<(), ScanError> {
        let Self {
            mut browser,
            page,
            _handler,
            _profile,
            ..
        } = self;

        if let Err(e) = page.close().await {
            debug!("Page close failed during teardown: {}", e);
        }
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!("Waiting for browser exit failed: {}", e);
        }
        info!("Browser session released");
        closed.map(|_| ()).map_err(ScanError::from)
    }
}

impl BrowserSession {
    #[instrument(skip(config))]
    async fn acquire(config: &SessionConfig) -> Result<Self, ScanError> {
        let profile = SessionProfile::new(
            config
                .user_data_root()
                .join(format!("a11y-session-{}", uuid::Uuid::new_v4())),
        );

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile.path)
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                device_scale_factor: Some(1.0),
                ..Viewport::default()
            })
            .request_timeout(config.script_timeout())
            .launch_timeout(config.launch_timeout())
            .incognito()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars");

        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(chrome) = &config.chrome_executable {
            builder = builder.chrome_executable(chrome);
        }

        let browser_config = builder.build().map_err(ScanError::Launch)?;

        info!("Launching browser session");
        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScanError::Launch(e.to_string()))?;

        // Drive CDP events until the connection closes
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let handler = AbortOnDrop(handle);

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("Failed to close browser after page error: {}", close_err);
                }
                if let Err(wait_err) = browser.wait().await {
                    debug!("Waiting for browser exit after page error failed: {}", wait_err);
                }
                return Err(ScanError::Launch(format!("failed to open page: {}", e)));
            }
        };

        debug!("Browser session ready");
        Ok(Self {
            browser,
            page,
            config: config.clone(),
            _handler: handler,
            _profile: profile,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Navigate and wait for the load event
    #[instrument(skip(self))]
    pub async fn navigate(&self, url: &str) -> Result<(), ScanError> {
        let limit = self.config.navigation_timeout();
        match tokio::time::timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScanError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ScanError::Timeout {
                operation: "navigation",
                seconds: limit.as_secs(),
            }),
        }
    }

    /// Resize the viewport to the document's full scrollable size so that
    /// later screenshots and rectangles share one coordinate space
    #[instrument(skip(self))]
    pub async fn fit_viewport_to_content(&self) -> Result<(u32, u32), ScanError> {
        let size: ContentSize = self
            .evaluate(CONTENT_SIZE_SCRIPT, self.config.script_timeout(), "content measurement")
            .await?;

        let width = clamp_dimension(size.width, self.config.viewport_width, u32::MAX);
        let height = clamp_dimension(
            size.height,
            self.config.viewport_height,
            self.config.max_content_height.max(1),
        );

        let params = SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        bounded(
            self.config.script_timeout(),
            "viewport resize",
            self.page.execute(params),
        )
        .await?;

        debug!("Viewport fitted to content: {}x{}", width, height);
        Ok((width, height))
    }

    /// Disable document scrolling
    pub async fn freeze_scrolling(&self) -> Result<(), ScanError> {
        self.run_script(FREEZE_SCROLL_SCRIPT, "scroll freeze").await
    }

    /// Evaluate a script for its side effects
    pub async fn run_script(&self, script: &str, operation: &'static str) -> Result<(), ScanError> {
        let params = evaluate_params(script)?;
        bounded(
            self.config.script_timeout(),
            operation,
            self.page.evaluate_expression(params),
        )
        .await?;
        Ok(())
    }

    /// Evaluate a script (awaiting a returned promise) and decode its JSON value
    pub async fn evaluate<T: DeserializeOwned>(
        &self,
        script: &str,
        limit: Duration,
        operation: &'static str,
    ) -> Result<T, ScanError> {
        let params = evaluate_params(script)?;
        let result = bounded(limit, operation, self.page.evaluate_expression(params)).await?;
        Ok(result.into_value()?)
    }
}

#[async_trait]
impl RenderSurface for BrowserSession {
    async fn locate(&self, selector: &str) -> Result<BoundingRect, EvidenceError> {
        let script = format!(
            "({})({})",
            LOCATE_SCRIPT,
            serde_json::to_string(selector).map_err(|e| EvidenceError::Task(e.to_string()))?
        );
        let located: LocatedElement = self
            .evaluate(&script, self.config.implicit_wait(), "element lookup")
            .await
            .map_err(|e| EvidenceError::SelectorNotFound(format!("{}: {}", selector, e)))?;

        if !located.found {
            return Err(EvidenceError::SelectorNotFound(selector.to_string()));
        }
        Ok(BoundingRect {
            x: located.x,
            y: located.y,
            width: located.width,
            height: located.height,
        })
    }

    async fn capture_viewport(&self) -> Result<Vec<u8>, EvidenceError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        bounded(
            self.config.implicit_wait(),
            "viewport screenshot",
            self.page.screenshot(params),
        )
        .await
        .map_err(|e| EvidenceError::Screenshot(e.to_string()))
    }

    async fn capture_element(&self, selector: &str) -> Result<Vec<u8>, EvidenceError> {
        let limit = self.config.implicit_wait();
        let element = bounded(limit, "element lookup", self.page.find_element(selector))
            .await
            .map_err(|e| EvidenceError::SelectorNotFound(format!("{}: {}", selector, e)))?;
        bounded(
            limit,
            "element screenshot",
            element.screenshot(CaptureScreenshotFormat::Png),
        )
        .await
        .map_err(|e| EvidenceError::Screenshot(e.to_string()))
    }
}

const CONTENT_SIZE_SCRIPT: &str = r#"(() => {
    const root = document.documentElement;
    const body = document.body || root;
    return {
        width: Math.max(root.scrollWidth, body.scrollWidth, root.clientWidth),
        height: Math.max(root.scrollHeight, body.scrollHeight, root.clientHeight)
    };
})()"#;

const FREEZE_SCROLL_SCRIPT: &str = r#"(() => {
    document.documentElement.style.overflow = 'hidden';
    if (document.body) { document.body.style.overflow = 'hidden'; }
    return true;
})()"#;

const LOCATE_SCRIPT: &str = r#"(selector) => {
    const el = document.querySelector(selector);
    if (!el) { return { found: false }; }
    el.scrollIntoView({ behavior: 'instant', block: 'center', inline: 'center' });
    const r = el.getBoundingClientRect();
    return { found: true, x: r.x, y: r.y, width: r.width, height: r.height };
}"#;

#[derive(Debug, Deserialize)]
struct ContentSize {
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct LocatedElement {
    found: bool,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

fn evaluate_params(script: &str) -> Result<EvaluateParams, ScanError> {
    EvaluateParams::builder()
        .expression(script)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(ScanError::Audit)
}

async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, ScanError>
where
    F: Future<Output = Result<T, CdpError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ScanError::from),
        Err(_) => Err(ScanError::Timeout {
            operation,
            seconds: limit.as_secs(),
        }),
    }
}

/// Round a measured page dimension up, never below the configured viewport
/// and never above `max`
fn clamp_dimension(measured: f64, floor: u32, max: u32) -> u32 {
    let measured = if measured.is_finite() && measured > 0.0 {
        measured.ceil().min(f64::from(u32::MAX)) as u32
    } else {
        0
    };
    measured.max(floor).min(max).max(1)
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Per-session Chrome profile directory, removed on drop
struct SessionProfile {
    path: PathBuf,
}

impl SessionProfile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for SessionProfile {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove profile {}: {}", self.path.display(), e),
        }
    }
}
