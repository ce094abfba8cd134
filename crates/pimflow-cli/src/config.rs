//! CLI settings from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::Level;

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Used unless `--verbose` is given.
    pub log_level: Level,
    pub connect_timeout_secs: u64,
    /// Default for `preview --limit`.
    pub preview_limit: usize,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("PIMFLOW_LOG")
                .unwrap_or_else(|_| "info".to_string())
                .parse()
                .context("Invalid PIMFLOW_LOG")?,
            connect_timeout_secs: std::env::var("PIMFLOW_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid PIMFLOW_CONNECT_TIMEOUT_SECS")?,
            preview_limit: std::env::var("PIMFLOW_PREVIEW_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid PIMFLOW_PREVIEW_LIMIT")?,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
