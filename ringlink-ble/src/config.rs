//! Tool configuration, kept as JSON in the ringlink home directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ringlink_session::SessionConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no home directory; set RINGLINK_HOME")]
    NoHome,
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    /// Reconnect after an unrequested disconnect
    pub auto_retry: bool,
    pub retry_delay_ms: u64,
    /// RSSI poll interval while streaming; 0 disables polling
    pub rssi_poll_ms: u64,
    /// Send the reboot frame as part of the stop sequence on exit
    pub reboot_on_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            auto_retry: true,
            retry_delay_ms: 1500,
            rssi_poll_ms: 1000,
            reboot_on_exit: true,
        }
    }
}

impl Config {
    /// Read `config.json` from `home`, writing the defaults there on first run
    pub fn load_or_create(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join("config.json");
        if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            return serde_json::from_str(&data).map_err(|source| ConfigError::Parse { path, source });
        }

        let config = Self::default();
        let data = serde_json::to_string_pretty(&config).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, data).map_err(|source| ConfigError::Io { path, source })?;
        Ok(config)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rssi_poll(&self) -> Option<Duration> {
        (self.rssi_poll_ms > 0).then(|| Duration::from_millis(self.rssi_poll_ms))
    }
}

/// `$RINGLINK_HOME`, else `~/.ringlink`; created if missing
pub fn ringlink_home() -> Result<PathBuf, ConfigError> {
    let home = match std::env::var_os("RINGLINK_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".ringlink"),
    };
    std::fs::create_dir_all(&home).map_err(|source| ConfigError::Io {
        path: home.clone(),
        source,
    })?;
    Ok(home)
}
