//! Application configuration
//!
//! Loaded from a TOML file; every section and field falls back to a default
//! so an empty or missing file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::graduation::{GraduationEngine, RetryPolicy};
use crate::numbering::CounterScope;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub numbering: NumberingSettings,
    #[serde(default)]
    pub graduation: GraduationSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a connection waits on another writer before SQLITE_BUSY
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberingSettings {
    #[serde(default)]
    pub counter_scope: CounterScope,

    /// Pattern used when the numbering config is first created
    #[serde(default)]
    pub default_pattern: Option<String>,

    /// Parent series used when the numbering config is first created
    #[serde(default)]
    pub default_series: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduationSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

impl Default for GraduationSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_db_path() -> PathBuf { PathBuf::from("troop.db") }
fn default_busy_timeout() -> u64 { 5_000 }
fn default_max_attempts() -> u32 { 5 }
fn default_backoff() -> u64 { 20 }
fn default_bind() -> String { "127.0.0.1:3000".to_string() }

impl Config {
    /// Read `path` if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.graduation.max_attempts.max(1),
            base_backoff: Duration::from_millis(self.graduation.backoff_ms),
        }
    }

    pub fn engine(&self) -> GraduationEngine {
        GraduationEngine::with_scope(self.numbering.counter_scope, self.retry_policy())
    }
}
