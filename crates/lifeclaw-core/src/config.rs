//! LifeClaw configuration system.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LifeClawError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LifeClawConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Scheduler tunables: how quickly an un-advanced state is offered again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// First re-fire delay after a missed advancement, in seconds.
    #[serde(default = "default_refire_base")]
    pub refire_base_secs: u64,
    /// Upper bound on the doubling re-fire delay, in seconds.
    #[serde(default = "default_refire_cap")]
    pub refire_cap_secs: u64,
}

fn default_refire_base() -> u64 { 1 }
fn default_refire_cap() -> u64 { 64 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refire_base_secs: default_refire_base(),
            refire_cap_secs: default_refire_cap(),
        }
    }
}

/// Logging preferences for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String { "lifeclaw=info".into() }

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: default_filter() }
    }
}

impl LifeClawConfig {
    /// Load config from the default path, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LifeClawError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| LifeClawError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path (`~/.lifeclaw/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lifeclaw")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LifeClawConfig::default();
        assert_eq!(cfg.scheduler.refire_base_secs, 1);
        assert_eq!(cfg.scheduler.refire_cap_secs, 64);
        assert_eq!(cfg.log.filter, "lifeclaw=info");
    }

    #[test]
    fn test_partial_toml() {
        let cfg: LifeClawConfig = toml::from_str(
            "[scheduler]\nrefire_cap_secs = 300\n",
        )
        .unwrap();
        assert_eq!(cfg.scheduler.refire_base_secs, 1);
        assert_eq!(cfg.scheduler.refire_cap_secs, 300);
    }
}
