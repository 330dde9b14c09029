//! Rendering session configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one headless browser session
///
/// Every field has a default, so an empty `[session]` table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound for page navigation, in seconds (default: 300)
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    /// Upper bound for a single script evaluation, including the audit (default: 600)
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
    /// Upper bound for resolving or capturing a single element (default: 10)
    #[serde(default = "default_implicit_wait_secs")]
    pub implicit_wait_secs: u64,
    /// Upper bound for starting the browser process (default: 30)
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
    /// Initial viewport width in CSS pixels (default: 1280)
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    /// Initial viewport height in CSS pixels (default: 800)
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Largest viewport height used when fitting the page's full content (default: 16384)
    #[serde(default = "default_max_content_height")]
    pub max_content_height: u32,
    /// Keep Chrome's sandbox enabled. Containers without user namespaces need `false`.
    #[serde(default = "default_true")]
    pub sandbox: bool,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Explicit Chrome binary; autodetected when unset
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    /// Parent directory for per-session profiles (default: the system temp dir)
    #[serde(default)]
    pub user_data_root: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout_secs(),
            script_timeout_secs: default_script_timeout_secs(),
            implicit_wait_secs: default_implicit_wait_secs(),
            launch_timeout_secs: default_launch_timeout_secs(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            max_content_height: default_max_content_height(),
            sandbox: true,
            headless: true,
            chrome_executable: None,
            user_data_root: None,
        }
    }
}

impl SessionConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    pub fn implicit_wait(&self) -> Duration {
        Duration::from_secs(self.implicit_wait_secs)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn user_data_root(&self) -> PathBuf {
        self.user_data_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn default_navigation_timeout_secs() -> u64 {
    300
}

fn default_script_timeout_secs() -> u64 {
    600
}

fn default_implicit_wait_secs() -> u64 {
    10
}

fn default_launch_timeout_secs() -> u64 {
    30
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    800
}

fn default_max_content_height() -> u32 {
    16384
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_uses_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.navigation_timeout(), Duration::from_secs(300));
        assert!(config.sandbox);
    }

    #[test]
    fn test_overrides() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"sandbox": false, "implicit_wait_secs": 3}"#).unwrap();
        assert!(!config.sandbox);
        assert_eq!(config.implicit_wait(), Duration::from_secs(3));
        assert_eq!(config.viewport_width, 1280);
    }
}
