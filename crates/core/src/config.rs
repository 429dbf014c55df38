use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

/// Browser session tunables. All timeouts are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Preferred browser vendor: "chrome" or "edge". The other one is tried
    /// as a fallback when the preferred binary is not installed.
    #[serde(default = "default_preferred_browser")]
    pub preferred_browser: String,

    /// Fixed remote-debugging port. Kept stable so stale processes from a
    /// previous run can be reclaimed before relaunch.
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    /// Override for the profile (user-data) directory. When unset, profiles
    /// live under the app data dir keyed by session name.
    #[serde(default)]
    pub profile_dir: Option<String>,

    /// Per-command response timeout.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Page load timeout for navigation.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Ceiling for the debug endpoint to become reachable after spawn.
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,

    /// Interval between debug endpoint readiness probes.
    #[serde(default = "default_launch_poll_interval_ms")]
    pub launch_poll_interval_ms: u64,

    /// Grace period after navigation for client-side redirects to settle
    /// before the page is classified as a login wall.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Interval between login-state polls while a visible window is open.
    #[serde(default = "default_login_poll_interval_ms")]
    pub login_poll_interval_ms: u64,

    /// Ceiling for a human to complete an interactive login.
    #[serde(default = "default_login_timeout_ms")]
    pub login_timeout_ms: u64,

    /// Pause between closing one browser process and launching the next,
    /// giving the profile lock time to release.
    #[serde(default = "default_relaunch_delay_ms")]
    pub relaunch_delay_ms: u64,
}

fn default_preferred_browser() -> String {
    "chrome".to_string()
}

fn default_debug_port() -> u16 {
    9377
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_launch_timeout_ms() -> u64 {
    15_000
}

fn default_launch_poll_interval_ms() -> u64 {
    200
}

fn default_settle_delay_ms() -> u64 {
    2_000
}

fn default_login_poll_interval_ms() -> u64 {
    3_000
}

fn default_login_timeout_ms() -> u64 {
    120_000
}

fn default_relaunch_delay_ms() -> u64 {
    1_000
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            preferred_browser: default_preferred_browser(),
            debug_port: default_debug_port(),
            profile_dir: None,
            command_timeout_ms: default_command_timeout_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            launch_timeout_ms: default_launch_timeout_ms(),
            launch_poll_interval_ms: default_launch_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            login_poll_interval_ms: default_login_poll_interval_ms(),
            login_timeout_ms: default_login_timeout_ms(),
            relaunch_delay_ms: default_relaunch_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.browser.preferred_browser, "chrome");
        assert_eq!(config.browser.command_timeout_ms, 30_000);
        assert_eq!(config.browser.login_timeout_ms, 120_000);
        assert_eq!(config.browser.login_poll_interval_ms, 3_000);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"browser": {"debugPort": 9400}}"#).unwrap();
        assert_eq!(config.browser.debug_port, 9400);
        assert_eq!(config.browser.launch_timeout_ms, 15_000);
    }
}
