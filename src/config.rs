use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub sandbox: Sandbox,
    pub server: Server,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Sandbox {
    pub root_dir: PathBuf,
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}
fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default)]
    pub base_path: String,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct Limits {
    #[serde(default = "default_max_request_kb")]
    pub max_request_kb: usize,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "fetch_timeout_s", default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}
fn default_max_request_kb() -> usize { 64 }
fn default_fetch_timeout() -> Duration { Duration::from_secs(30) }
fn default_max_image_dimension() -> u32 { 16_384 }
fn default_requests_per_second() -> u32 { 50 }
fn default_burst() -> u32 { 100 }

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_kb: default_max_request_kb(),
            fetch_timeout: default_fetch_timeout(),
            max_image_dimension: default_max_image_dimension(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Logging {
    #[serde(default)]
    pub format: LogFormat,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let root = &self.sandbox.root_dir;
        if !root.is_absolute() {
            anyhow::bail!("root_dir must be an absolute path: {}", root.display());
        }
        if root.exists() && !root.is_dir() {
            anyhow::bail!("root_dir is not a directory: {}", root.display());
        }
        if !root.exists() && !self.sandbox.create_if_missing {
            anyhow::bail!("root_dir does not exist: {}", root.display());
        }
        if self.server.bind_addr.trim().is_empty() { anyhow::bail!("bind_addr must not be empty"); }
        if !self.server.base_path.is_empty() && !self.server.base_path.starts_with('/') {
            anyhow::bail!("base_path must be empty or start with '/'");
        }
        if self.limits.max_request_kb == 0 { anyhow::bail!("max_request_kb must be > 0"); }
        if self.limits.fetch_timeout.is_zero() { anyhow::bail!("fetch_timeout_s must be > 0"); }
        if self.limits.max_image_dimension == 0 { anyhow::bail!("max_image_dimension must be > 0"); }
        if self.limits.requests_per_second == 0 { anyhow::bail!("requests_per_second must be > 0"); }
        if self.limits.burst == 0 { anyhow::bail!("burst must be > 0"); }
        Ok(())
    }

    /// Creates the sandbox root when it is absent and creation is allowed.
    pub fn prepare_root(&self) -> anyhow::Result<()> {
        let root = &self.sandbox.root_dir;
        if !root.exists() && self.sandbox.create_if_missing {
            fs::create_dir_all(root)?;
        }
        Ok(())
    }
}
