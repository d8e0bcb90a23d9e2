//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One year; longer sessions are refused at load time.
pub const MAX_TTL_HOURS: i64 = 24 * 366;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub cases: CaseConfig,
    /// Admin account created at startup when missing
    #[serde(default)]
    pub admin: Option<AdminBootstrap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    /// Labels read `<label_prefix>-<number>`
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,

    /// Zero padding of the number
    #[serde(default = "default_label_width")]
    pub label_width: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

fn default_bind_addr() -> String { "127.0.0.1:8080".to_string() }
fn default_body_limit() -> usize { 64 * 1024 }
fn default_data_dir() -> PathBuf { PathBuf::from("data/cases.sled") }
fn default_ttl_hours() -> i64 { 24 * 7 }
fn default_label_prefix() -> String { "case".to_string() }
fn default_label_width() -> usize { 3 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            body_limit: default_body_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            label_prefix: default_label_prefix(),
            label_width: default_label_width(),
        }
    }
}

impl Config {
    /// Reads the TOML file at `path`, or the defaults when there is none.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.cases.label_prefix.trim().is_empty() {
            anyhow::bail!("cases.label_prefix must not be empty");
        }
        if !(1..=MAX_TTL_HOURS).contains(&config.sessions.ttl_hours) {
            anyhow::bail!("sessions.ttl_hours must be between 1 and {MAX_TTL_HOURS}");
        }
        Ok(config)
    }
}
