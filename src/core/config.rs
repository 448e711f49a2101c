use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Trust threshold for the reconciler: a stored version this many
/// weighted steps behind the build is updated in place, one step further
/// triggers a full repair. Preserved from the shipped behavior; change it
/// through config, not here.
pub const DEFAULT_DRIFT_THRESHOLD: i64 = 5;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Which remote backend the update checker queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Static JSON document at a well-known path (a hosted
    /// `version.json`).
    StaticJson { url: String },
    /// REST latest-release endpoint returning a tag name and asset URLs.
    GithubReleases { api_url: String },
    /// Real-time document subscription; version documents are pushed into
    /// the checker by an external integration.
    LiveDocument,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdaterConfig {
    pub source: SourceConfig,
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: i64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Cache directory for downloaded artifacts. Resolved to the
    /// per-user cache dir when absent.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_drift_threshold() -> i64 {
    DEFAULT_DRIFT_THRESHOLD
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl UpdaterConfig {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            download_dir: None,
        }
    }

    /// Load config from a JSON file.
    pub fn load(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path:?}"))?;
        Ok(config)
    }

    /// Directory downloaded artifacts land in: the configured override,
    /// or the per-user cache dir when absent.
    pub fn resolve_download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_download_cache_dir(),
        }
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent:?}"))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;
        Ok(())
    }
}

/// Get the user data directory for the updater.
/// - macOS/Linux: `<config dir>/inapp-updater/`
/// - Windows: `%APPDATA%\inapp-updater\`
pub fn get_user_data_dir() -> Result<PathBuf> {
    let config = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))?;
    Ok(config.join("inapp-updater"))
}

/// Path of the persisted version record.
pub fn get_version_store_path() -> Result<PathBuf> {
    Ok(get_user_data_dir()?.join("versions.json"))
}

/// Cache-tier directory for downloaded artifacts. The updater does not
/// manage the lifecycle of files written here.
pub fn get_download_cache_dir() -> Result<PathBuf> {
    let cache = dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Failed to get cache directory"))?;
    Ok(cache.join("inapp-updater"))
}
