//! Configuration
//!
//! Read from `$PARAMSTAGE_HOME/config.toml` (default `~/.paramstage/config.toml`),
//! then overridden by `PARAMSTAGE_ACCOUNT`, `PARAMSTAGE_REGION` and
//! `PARAMSTAGE_STAGE_DIR`. A missing file yields the defaults.

use crate::error::{StageError, StageResult};
use crate::models::Scope;
use crate::store::{FileStore, Passphrase};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "PARAMSTAGE_HOME";
pub const ACCOUNT_ENV: &str = "PARAMSTAGE_ACCOUNT";
pub const REGION_ENV: &str = "PARAMSTAGE_REGION";
pub const STAGE_DIR_ENV: &str = "PARAMSTAGE_STAGE_DIR";

const DEFAULT_PASSPHRASE_ENV: &str = "PARAMSTAGE_PASSPHRASE";
const DEFAULT_PORT: u16 = 4649;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Account the staged changes target
    #[serde(default = "default_account")]
    pub account_id: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Root directory for staging files (default `<home>/stage`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_dir: Option<PathBuf>,

    /// Environment variable holding the staging file passphrase
    #[serde(default = "default_passphrase_env")]
    pub passphrase_env: String,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub secret: SecretConfig,

    /// Directory the config was resolved against
    #[serde(skip)]
    home: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// State file of the local remote emulator (default `<home>/remote.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretConfig {
    /// Recovery window used when `delete` is given neither a window nor `--force`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_window_days: Option<u32>,
}

fn default_account() -> String {
    "000000000000".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_passphrase_env() -> String {
    DEFAULT_PASSPHRASE_ENV.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            account_id: default_account(),
            region: default_region(),
            stage_dir: None,
            passphrase_env: default_passphrase_env(),
            remote: RemoteConfig::default(),
            server: ServerConfig::default(),
            secret: SecretConfig::default(),
            home: PathBuf::from(".paramstage"),
        }
    }
}

impl StageConfig {
    /// `$PARAMSTAGE_HOME`, or `~/.paramstage`
    pub fn home_dir() -> anyhow::Result<PathBuf> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(home));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?;
        Ok(home.join(".paramstage"))
    }

    /// Load from the home directory and apply environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let home = Self::home_dir()?;
        let mut config = Self::load_from(&home)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load `<home>/config.toml` without environment overrides
    pub fn load_from(home: &Path) -> anyhow::Result<Self> {
        let config_path = home.join("config.toml");
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<StageConfig>(&content)
                .with_context(|| format!("Invalid config in {}", config_path.display()))?
        } else {
            Self::default()
        };
        config.home = home.to_path_buf();
        Ok(config)
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(account) = lookup(ACCOUNT_ENV) {
            self.account_id = account;
        }
        if let Some(region) = lookup(REGION_ENV) {
            self.region = region;
        }
        if let Some(dir) = lookup(STAGE_DIR_ENV) {
            self.stage_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn scope(&self) -> Scope {
        Scope::new(&self.account_id, &self.region)
    }

    pub fn stage_dir(&self) -> PathBuf {
        self.stage_dir
            .clone()
            .unwrap_or_else(|| self.home.join("stage"))
    }

    pub fn emulator_path(&self) -> PathBuf {
        self.remote
            .emulator_path
            .clone()
            .unwrap_or_else(|| self.home.join("remote.json"))
    }

    /// Passphrase from the configured environment variable, if set and non-empty
    pub fn passphrase(&self) -> Option<Passphrase> {
        Passphrase::from_optional(std::env::var(&self.passphrase_env).ok())
    }

    /// File store for the configured scope
    pub fn file_store(&self) -> StageResult<FileStore> {
        Ok(FileStore::for_scope(&self.stage_dir(), &self.scope())?
            .with_passphrase(self.passphrase()))
    }
}
