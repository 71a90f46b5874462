// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Directory for per-connection temporary source files and build
    /// artifacts
    pub temp_dir: PathBuf,
    /// Directory for the prompt/input/output transcript logs
    pub logs_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Upstream URL for the dashboard statistics proxy
    pub stats_upstream: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8081".parse().unwrap(),
            temp_dir: PathBuf::from("temp"),
            logs_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            stats_upstream: "https://sc.ecombullet.com/api/dashboard/totalusers".to_string(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, overridden by `codemeet.toml`, overridden
    /// by `CODEMEET_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("codemeet.toml"))
            .merge(Env::prefixed("CODEMEET_"))
            .extract()?;
        Ok(settings)
    }
}
