//! Accessibility audit against a live page

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

use a11y_types::{ScanResult, Violation};

use crate::error::ScanError;
use crate::session::BrowserSession;

/// Runs axe-core in a [`BrowserSession`]
///
/// The axe source is loaded once and shared between jobs.
#[derive(Debug, Clone)]
pub struct ScanExecutor {
    axe_source: Arc<str>,
}

impl ScanExecutor {
    pub fn new(axe_source: impl Into<Arc<str>>) -> Self {
        Self {
            axe_source: axe_source.into(),
        }
    }

    /// Load the axe-core bundle (`axe.min.js`) from disk
    pub fn from_script_file(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        if source.trim().is_empty() {
            return Err(ScanError::Audit(format!(
                "axe script {} is empty",
                path.as_ref().display()
            )));
        }
        Ok(Self::new(source))
    }

    /// Navigate to `target`, freeze the layout and audit the page.
    ///
    /// On success the session is left on the audited page with its viewport
    /// covering the whole document, ready for evidence capture. Any failure is
    /// fatal for the job and no partial result is returned.
    #[instrument(skip(self, session))]
    pub async fn execute(&self, session: &BrowserSession, target: &str) -> Result<ScanResult, ScanError> {
        let url = validate_target(target)?;

        session.navigate(url).await?;
        session.fit_viewport_to_content().await?;
        session.freeze_scrolling().await?;

        session.run_script(&self.axe_source, "axe injection").await?;
        let raw: RawAxeResult = session
            .evaluate(AXE_RUN_SCRIPT, session.config().script_timeout(), "accessibility audit")
            .await?;

        if let Some(error) = raw.error {
            return Err(ScanError::Audit(error));
        }

        let result = ScanResult {
            url: raw.url.unwrap_or_else(|| url.to_string()),
            timestamp: raw.timestamp,
            violations: raw.violations,
        };
        info!(
            "Audit of {} found {} violations across {} nodes",
            result.url,
            result.violations.len(),
            result.node_count()
        );
        Ok(result)
    }
}

/// Accept only absolute `http(s)` URLs with a host part
pub fn validate_target(target: &str) -> Result<&str, ScanError> {
    let trimmed = target.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| ScanError::InvalidTarget(target.to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(ScanError::InvalidTarget(target.to_string()));
    }
    Ok(trimmed)
}

// Errors are returned as data so a rejected promise still yields a message
const AXE_RUN_SCRIPT: &str = r#"(async () => {
    if (typeof axe === 'undefined') {
        return { error: 'axe-core is not loaded', violations: [] };
    }
    try {
        const results = await axe.run(document, { resultTypes: ['violations'] });
        return { url: results.url, timestamp: results.timestamp, violations: results.violations };
    } catch (e) {
        return { error: String(e), violations: [] };
    }
})()"#;

#[derive(Debug, Deserialize)]
struct RawAxeResult {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    violations: Vec<Violation>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target_accepts_http_urls() {
        assert_eq!(validate_target("https://example.com").unwrap(), "https://example.com");
        assert_eq!(
            validate_target("  http://example.com/a?b=1 ").unwrap(),
            "http://example.com/a?b=1"
        );
        assert!(validate_target("https://localhost:8080/").is_ok());
    }

    #[test]
    fn test_validate_target_rejects_other_inputs() {
        for target in [
            "",
            "example.com",
            "ftp://example.com",
            "file:///etc/passwd",
            "javascript:alert(1)",
            "https://",
            "https:///path",
            "https://exa mple.com",
        ] {
            let err = validate_target(target).unwrap_err();
            assert!(matches!(err, ScanError::InvalidTarget(_)), "{}", target);
        }
    }

    #[test]
    fn test_raw_result_decodes_axe_output() {
        let raw: RawAxeResult = serde_json::from_str(
            r#"{
                "url": "https://example.com/",
                "timestamp": "2024-05-01T10:00:00.000Z",
                "violations": [{
                    "id": "image-alt",
                    "impact": "critical",
                    "help": "Images must have alternate text",
                    "helpUrl": "https://dequeuniversity.com/rules/axe/4.9/image-alt",
                    "nodes": [{ "target": ["img"], "html": "<img src=a.png>", "impact": "critical" }]
                }]
            }"#,
        )
        .unwrap();
        assert!(raw.error.is_none());
        assert_eq!(raw.violations.len(), 1);
        assert_eq!(raw.violations[0].nodes[0].primary_selector(), Some("img"));
    }

    #[test]
    fn test_raw_result_carries_script_error() {
        let raw: RawAxeResult =
            serde_json::from_str(r#"{"error": "axe-core is not loaded", "violations": []}"#).unwrap();
        assert_eq!(raw.error.as_deref(), Some("axe-core is not loaded"));
    }

    #[test]
    fn test_empty_axe_script_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("axe.min.js");
        std::fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            ScanExecutor::from_script_file(&path),
            Err(ScanError::Audit(_))
        ));
        assert!(matches!(
            ScanExecutor::from_script_file(dir.path().join("absent.js")),
            Err(ScanError::Io(_))
        ));
    }
}
