//! Worker configuration
//!
//! TOML file with one table per concern. Every key has a default, so an empty
//! file (or no file at all) gives a working setup:
//!
//! ```toml
//! artifacts_root = "/var/lib/a11y"
//! axe_script = "/opt/axe/axe.min.js"
//!
//! [pipeline]
//! scan_concurrency = 2
//! report_concurrency = 2
//! max_attempts = 1
//!
//! [session]
//! navigation_timeout_secs = 300
//! sandbox = false
//!
//! [report]
//! title = "Accessibility Report"
//! attribution = ["Example Corp", "https://example.com"]
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use a11y_capture::SessionConfig;
use a11y_composer::Branding;

use crate::queue::QueueSettings;

/// Complete configuration of the worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queue sizing and retry policy
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Browser session settings for the scan stage
    #[serde(default)]
    pub session: SessionConfig,
    /// Cover page text of generated reports
    #[serde(default)]
    pub report: Branding,
    /// Directory that receives one sub-directory per request
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,
    /// Path to the axe-core bundle injected into scanned pages
    #[serde(default = "default_axe_script")]
    pub axe_script: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            session: SessionConfig::default(),
            report: Branding::default(),
            artifacts_root: default_artifacts_root(),
            axe_script: default_axe_script(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - A value is out of range (see [`PipelineConfig::validate`])
    ///
    /// # Example
    ///
    /// ```no_run
    /// use a11y_pipeline::config::WorkerConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = WorkerConfig::from_file("a11y-worker.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range
    ///
    /// # Example
    ///
    /// ```
    /// use a11y_pipeline::config::WorkerConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = WorkerConfig::from_str(r#"
    ///     [pipeline]
    ///     scan_concurrency = 4
    /// "#)?;
    /// assert_eq!(config.pipeline.scan_concurrency, 4);
    /// assert_eq!(config.pipeline.report_concurrency, 2);
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: WorkerConfig = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.pipeline.validate()?;
        Ok(config)
    }
}

/// Queue sizing and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scan jobs running at once; each holds one browser (default: 2)
    #[serde(default = "default_concurrency")]
    pub scan_concurrency: usize,
    /// Report jobs running at once (default: 2)
    #[serde(default = "default_concurrency")]
    pub report_concurrency: usize,
    /// Runs per stage job before it is reported failed; 1 disables retry (default: 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Buffered journal entries per subscriber (default: 256)
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan_concurrency: default_concurrency(),
            report_concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Reject zero concurrency, attempts or journal capacity
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.scan_concurrency > 0, "pipeline.scan_concurrency must be at least 1");
        anyhow::ensure!(
            self.report_concurrency > 0,
            "pipeline.report_concurrency must be at least 1"
        );
        anyhow::ensure!(self.max_attempts > 0, "pipeline.max_attempts must be at least 1");
        anyhow::ensure!(self.journal_capacity > 0, "pipeline.journal_capacity must be at least 1");
        Ok(())
    }

    pub fn scan_settings(&self) -> QueueSettings {
        QueueSettings {
            concurrency: self.scan_concurrency,
            max_attempts: self.max_attempts,
        }
    }

    pub fn report_settings(&self) -> QueueSettings {
        QueueSettings {
            concurrency: self.report_concurrency,
            max_attempts: self.max_attempts,
        }
    }
}

fn default_concurrency() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    1
}

fn default_journal_capacity() -> usize {
    256
}

fn default_artifacts_root() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_axe_script() -> PathBuf {
    PathBuf::from("axe.min.js")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WorkerConfig::from_str("").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.pipeline.scan_concurrency, 2);
        assert_eq!(config.pipeline.report_concurrency, 2);
        assert_eq!(config.pipeline.max_attempts, 1);
        assert!(config.session.sandbox);
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            artifacts_root = "/var/lib/a11y"
            axe_script = "/opt/axe.min.js"

            [pipeline]
            scan_concurrency = 1
            max_attempts = 3

            [session]
            sandbox = false
            implicit_wait_secs = 5

            [report]
            title = "Audit"
            attribution = ["Example Corp"]
        "#;
        let config = WorkerConfig::from_str(toml).unwrap();

        assert_eq!(config.artifacts_root, PathBuf::from("/var/lib/a11y"));
        assert_eq!(config.pipeline.scan_settings().concurrency, 1);
        assert_eq!(config.pipeline.report_settings().max_attempts, 3);
        assert!(!config.session.sandbox);
        assert_eq!(config.session.implicit_wait_secs, 5);
        assert_eq!(config.report.title, "Audit");
        assert_eq!(config.report.attribution, vec!["Example Corp".to_string()]);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = WorkerConfig::from_str("[pipeline]\nscan_concurrency = 0").unwrap_err();
        assert!(format!("{:#}", err).contains("scan_concurrency"));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(WorkerConfig::from_str("[pipeline\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nmax_attempts = 2").unwrap();

        let config = WorkerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.max_attempts, 2);

        let missing = WorkerConfig::from_file("/nonexistent/a11y.toml").unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }
}
