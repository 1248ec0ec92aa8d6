//! Configuration loading and persistence.
//!
//! Settings live in `config.json` in the platform config directory
//! (`SMARTDNS_CONFIG_DIR` overrides it). Environment variables override the
//! file, and command line flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, sync::Arc};

use crate::constants::{
    FOLLOW_BOTTOM_TOLERANCE_PX, FOLLOW_DISABLE_AFTER, KEYBOARD_HEIGHT_THRESHOLD_PX,
    LOG_BUFFER_CAPACITY, METRICS_RECONNECT_DELAY, TOUCH_SCROLL_PX_PER_LINE,
};
use crate::log_stream::LogStreamOptions;
use crate::messages::Messages;
use crate::terminal::TerminalOptions;

/// Configuration file name inside the config directory.
const CONFIG_FILE: &str = "config.json";

/// Configuration for the console.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the SmartDNS web server (http or https).
    pub server_url: String,
    /// Bearer token sent with every request, if the server requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Delay before the metrics stream reconnects, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Lines kept by a log view.
    pub log_capacity: usize,
    /// Away-from-bottom scroll events tolerated before auto-follow stops.
    pub follow_disable_after: u32,
    /// Distance from the bottom (pixels) that still counts as "at bottom".
    pub follow_tolerance_px: f64,
    /// Viewport shrink (pixels) treated as an on-screen keyboard.
    pub keyboard_threshold_px: f64,
    /// Drag distance (pixels) per scrolled terminal line.
    pub touch_px_per_line: f64,
    /// User-visible strings.
    pub messages: Messages,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:6080".to_string(),
            token: None,
            reconnect_delay_ms: METRICS_RECONNECT_DELAY.as_millis() as u64,
            log_capacity: LOG_BUFFER_CAPACITY,
            follow_disable_after: FOLLOW_DISABLE_AFTER,
            follow_tolerance_px: FOLLOW_BOTTOM_TOLERANCE_PX,
            keyboard_threshold_px: KEYBOARD_HEIGHT_THRESHOLD_PX,
            touch_px_per_line: TOUCH_SCROLL_PX_PER_LINE,
            messages: Messages::default(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `SMARTDNS_CONFIG_DIR` wins; otherwise the platform config directory
    /// (`~/.config/smartdns-console` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = match std::env::var("SMARTDNS_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .context("Could not determine config directory")?
                .join("smartdns-console"),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            log::debug!("[Config] No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads a configuration file without applying overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Writes the configuration to `path` (owner read/write only).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Applies `SMARTDNS_*` environment variables. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = var("SMARTDNS_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Some(token) = var("SMARTDNS_TOKEN") {
            self.token = Some(token).filter(|t| !t.is_empty());
        }

        if let Some(delay) = var("SMARTDNS_RECONNECT_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(ms) => self.reconnect_delay_ms = ms,
                Err(_) => log::warn!("[Config] Ignoring SMARTDNS_RECONNECT_DELAY_MS={}", delay),
            }
        }

        if let Some(capacity) = var("SMARTDNS_LOG_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(n) if n > 0 => self.log_capacity = n,
                _ => log::warn!("[Config] Ignoring SMARTDNS_LOG_CAPACITY={}", capacity),
            }
        }
    }

    /// Token to send, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Metrics reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Log view options.
    pub fn log_stream_options(&self) -> LogStreamOptions {
        LogStreamOptions {
            capacity: self.log_capacity.max(1),
            follow_disable_after: self.follow_disable_after,
            follow_tolerance_px: self.follow_tolerance_px,
        }
    }

    /// Terminal view options.
    pub fn terminal_options(&self) -> TerminalOptions {
        TerminalOptions {
            keyboard_threshold_px: self.keyboard_threshold_px,
            touch_px_per_line: self.touch_px_per_line,
        }
    }

    /// Shared message table.
    pub fn messages(&self) -> Arc<Messages> {
        Arc::new(self.messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_reference_values() {
        let config = Config::default();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.log_capacity, 2000);
        assert_eq!(config.follow_disable_after, 3);
        assert_eq!(config.token(), None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let config = Config {
            server_url: "https://dns.lan".into(),
            token: Some("secret".into()),
            log_capacity: 500,
            ..Config::default()
        };
        config.save_to(&path).expect("save");
        assert_eq!(Config::load_from(&path).expect("load"), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server_url":"http://10.0.0.1:6080"}"#).expect("write");
        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.server_url, "http://10.0.0.1:6080");
        assert_eq!(config.log_capacity, 2000);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").expect("write");
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("SMARTDNS_SERVER_URL", "https://router:8443"),
            ("SMARTDNS_TOKEN", "abc"),
            ("SMARTDNS_RECONNECT_DELAY_MS", "soon"),
            ("SMARTDNS_LOG_CAPACITY", "100"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.server_url, "https://router:8443");
        assert_eq!(config.token(), Some("abc"));
        assert_eq!(config.reconnect_delay_ms, 3000);
        assert_eq!(config.log_capacity, 100);
    }
}
