//! Harness configuration helpers.
//!
//! The config is owned by the state directory (`config.json`) and passed
//! explicitly into every orchestrator, so nothing depends on process-wide
//! settings. Missing files fall back to defaults; a couple of fields can be
//! overridden from the environment for CI runs.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_FILE_NAME: &str = "config.json";

const RHC_COMMAND_ENV: &str = "PAAS_ACCEPT_RHC_COMMAND";
const ALIAS_DOMAIN_ENV: &str = "PAAS_ACCEPT_ALIAS_DOMAIN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub schema_version: u32,
    /// Client command line, split with shell-words.
    pub rhc_command: String,
    pub app_domain: String,
    pub alias_domain: String,
    pub registration_required: bool,
    pub default_password: String,
    pub submodule_repo_dir: Option<PathBuf>,
    /// Relative paths resolve against the state dir.
    pub snapshot_dir: PathBuf,
    pub log_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub access_timeout_secs: u64,
    pub inaccessible_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub content_attempts: u32,
    pub inaccessible_confirmations: u32,
    pub request_timeout_ms: u64,
    pub insecure_tls: bool,
    pub batch_workers: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        default_config()
    }
}

impl HarnessConfig {
    pub fn access_timeout(&self) -> Duration {
        Duration::from_secs(self.access_timeout_secs)
    }

    pub fn inaccessible_timeout(&self) -> Duration {
        Duration::from_secs(self.inaccessible_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Anchor relative directories at the state dir.
    pub fn resolve_dirs(&mut self, state_dir: &Path) {
        for dir in [&mut self.snapshot_dir, &mut self.log_dir, &mut self.repo_dir] {
            if dir.is_relative() {
                *dir = state_dir.join(&*dir);
            }
        }
    }
}

/// Build the default config used when a state dir is first initialized.
pub fn default_config() -> HarnessConfig {
    HarnessConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        rhc_command: "rhc".to_string(),
        app_domain: "dev.rhcloud.com".to_string(),
        alias_domain: "example.com".to_string(),
        registration_required: false,
        default_password: "xyz123".to_string(),
        submodule_repo_dir: None,
        snapshot_dir: PathBuf::from("snapshots"),
        log_dir: PathBuf::from("logs"),
        repo_dir: PathBuf::from("repos"),
        access_timeout_secs: 120,
        inaccessible_timeout_secs: 60,
        poll_interval_ms: 1000,
        content_attempts: 60,
        inaccessible_confirmations: 3,
        request_timeout_ms: 5000,
        insecure_tls: true,
        batch_workers: 1,
    }
}

pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_FILE_NAME)
}

/// Load `config.json` from the state dir, falling back to defaults when absent.
pub fn load_config(state_dir: &Path) -> Result<HarnessConfig> {
    let path = config_path(state_dir);
    let mut config = if path.is_file() {
        let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_slice(&bytes).context("parse harness config JSON")?
    } else {
        default_config()
    };
    apply_env_overrides(&mut config, |key| env::var(key).ok());
    validate_config(&config)?;
    config.resolve_dirs(state_dir);
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(state_dir: &Path, config: &HarnessConfig) -> Result<()> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("create state dir {}", state_dir.display()))?;
    let path = config_path(state_dir);
    let text = serde_json::to_string_pretty(config).context("serialize harness config")?;
    fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn apply_env_overrides(config: &mut HarnessConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(command) = lookup(RHC_COMMAND_ENV).filter(|value| !value.trim().is_empty()) {
        config.rhc_command = command;
    }
    if let Some(domain) = lookup(ALIAS_DOMAIN_ENV).filter(|value| !value.trim().is_empty()) {
        config.alias_domain = domain;
    }
}

/// Validate schema version and value ranges.
pub fn validate_config(config: &HarnessConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported harness config schema_version {}",
            config.schema_version
        ));
    }
    if config.rhc_command.trim().is_empty() {
        return Err(anyhow!("rhc_command must be non-empty"));
    }
    shell_words::split(&config.rhc_command).context("parse rhc_command")?;
    for (label, value) in [
        ("app_domain", &config.app_domain),
        ("alias_domain", &config.alias_domain),
    ] {
        if value.trim().is_empty() || value.contains('/') {
            return Err(anyhow!("{label} must be a bare host suffix (got {value:?})"));
        }
    }
    if config.poll_interval_ms == 0 {
        return Err(anyhow!("poll_interval_ms must be greater than zero"));
    }
    if config.content_attempts == 0 {
        return Err(anyhow!("content_attempts must be greater than zero"));
    }
    if config.inaccessible_confirmations == 0 {
        return Err(anyhow!("inaccessible_confirmations must be greater than zero"));
    }
    if config.batch_workers == 0 {
        return Err(anyhow!("batch_workers must be at least 1"));
    }
    Ok(())
}

/// Default state dir under the user's local data directory.
pub fn default_state_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().ok_or_else(|| anyhow!("no local data directory"))?;
    Ok(base.join("paas-accept"))
}
