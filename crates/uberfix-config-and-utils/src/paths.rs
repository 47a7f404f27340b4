//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Broker socket filename under the base directory.
const BROKER_SOCKET_NAME: &str = "broker.sock";

/// Manages file system paths under `~/.uberfix`.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.uberfix`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".uberfix"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.uberfix).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.uberfix/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persistent key-value store (~/.uberfix/storage.json).
    pub fn storage_file(&self) -> PathBuf {
        self.base_dir.join("storage.json")
    }

    /// Get the database file path (~/.uberfix/uberfix.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("uberfix.sqlite")
    }

    /// Get the broker socket path (~/.uberfix/broker.sock).
    pub fn broker_socket_file(&self) -> PathBuf {
        self.base_dir.join(BROKER_SOCKET_NAME)
    }

    /// Get the logs directory (~/.uberfix/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central JSONL log (~/.uberfix/logs/dev.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
