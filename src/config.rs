use crate::models::Service;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Credentials for one platform. `token` is the bearer access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub token: String,
}

/// Loaded once at startup and handed to the clients by reference. Written
/// back in full only at explicit checkpoints (after a token exchange).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `<platform>/<playlist id>.json` snapshots
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Optional directory for a daily-rotated log file
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,

    #[serde(default)]
    pub spotify: Credentials,
    #[serde(default)]
    pub youtube: Credentials,
}

fn default_storage_dir() -> PathBuf { "config".into() }
fn default_redirect_port() -> u16 { 3000 }
fn default_auth_timeout() -> u64 { 300 }

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            log_dir: None,
            redirect_port: default_redirect_port(),
            auth_timeout_secs: default_auth_timeout(),
            spotify: Credentials::default(),
            youtube: Credentials::default(),
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Read the config, creating an empty one (and its directory) first if
    /// the file does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let cfg = Config::default();
            cfg.save(path)?;
            // logging is not set up yet when the config is first read
            println!("Created new config file: {}", path.display());
            return Ok(cfg);
        }
        Self::from_path(path).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Rewrite the whole file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating config directory {}", parent.display()))?;
            }
        }
        let s = toml::to_string_pretty(self)?;
        std::fs::write(path, s).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    pub fn credentials(&self, service: Service) -> &Credentials {
        match service {
            Service::Spotify => &self.spotify,
            Service::Youtube => &self.youtube,
        }
    }

    pub fn credentials_mut(&mut self, service: Service) -> &mut Credentials {
        match service {
            Service::Spotify => &mut self.spotify,
            Service::Youtube => &mut self.youtube,
        }
    }
}
