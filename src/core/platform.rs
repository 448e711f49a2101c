//! Platform boundary traits.
//!
//! The update core never talks to an installer, browser, or cache
//! directory directly; it goes through these collaborator traits so the
//! host application can plug in its own platform glue.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Platform the application is currently running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
    Desktop,
}

impl Platform {
    /// Key used for this platform in per-platform download URL maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::Desktop => "desktop",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability query answered by the host shell.
pub trait PlatformCapabilities: Send + Sync {
    fn current_platform(&self) -> Platform;

    /// Whether the platform can install a downloaded artifact natively.
    fn is_native_install_supported(&self) -> bool;
}

/// Default capability source: derives the platform from the compile
/// target and allows native install on Android only.
pub struct TargetPlatform;

impl PlatformCapabilities for TargetPlatform {
    fn current_platform(&self) -> Platform {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_family = "wasm") {
            Platform::Web
        } else {
            Platform::Desktop
        }
    }

    fn is_native_install_supported(&self) -> bool {
        self.current_platform() == Platform::Android
    }
}

/// Native installer collaborator. May fail; the downloader falls back to
/// [`ExternalOpener`] when it does.
pub trait ArtifactInstaller: Send + Sync {
    fn install_artifact(&self, uri: &str) -> Result<()>;
}

/// Opens a URL in an external browser or system handler.
///
/// This is the last line of defense after a failed install, so it never
/// fails observably: implementations must swallow and log their errors.
pub trait ExternalOpener: Send + Sync {
    fn open_external(&self, url: &str);
}

/// Opener used when the host wires in nothing better. Logs the request
/// and drops it, which satisfies the never-fails contract.
pub struct LoggingOpener;

impl ExternalOpener for LoggingOpener {
    fn open_external(&self, url: &str) {
        log::info!("Requested external open of {url} (no system opener wired in)");
    }
}

/// Handle to a written artifact.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    pub path: PathBuf,
}

/// Cache-tier artifact storage. The core does not manage the lifecycle of
/// files written here.
pub trait ArtifactStorage: Send + Sync {
    fn write_artifact(&self, bytes: &[u8], suggested_name: &str) -> Result<ArtifactHandle>;

    fn artifact_uri(&self, handle: &ArtifactHandle) -> String;
}

/// Stores artifacts under a local cache directory and hands out `file://`
/// URIs.
pub struct CacheDirStorage {
    cache_dir: PathBuf,
}

impl CacheDirStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {cache_dir:?}"))?;
        Ok(Self { cache_dir })
    }

    /// Storage rooted at the config's download directory.
    pub fn from_config(config: &crate::core::config::UpdaterConfig) -> Result<Self> {
        Self::new(config.resolve_download_dir()?)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl ArtifactStorage for CacheDirStorage {
    fn write_artifact(&self, bytes: &[u8], suggested_name: &str) -> Result<ArtifactHandle> {
        let path = self.cache_dir.join(suggested_name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write artifact: {path:?}"))?;
        log::debug!("Wrote {} byte artifact to {}", bytes.len(), path.display());
        Ok(ArtifactHandle { path })
    }

    fn artifact_uri(&self, handle: &ArtifactHandle) -> String {
        format!("file://{}", handle.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_as_str() {
        assert_eq!(Platform::Android.as_str(), "android");
        assert_eq!(Platform::Desktop.to_string(), "desktop");
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Ios).unwrap();
        assert_eq!(json, "\"ios\"");
        let platform: Platform = serde_json::from_str("\"android\"").unwrap();
        assert_eq!(platform, Platform::Android);
    }

    #[test]
    fn test_cache_dir_storage_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = CacheDirStorage::new(temp_dir.path().to_path_buf()).unwrap();

        let handle = storage.write_artifact(b"artifact bytes", "update.apk").unwrap();
        assert_eq!(std::fs::read(&handle.path).unwrap(), b"artifact bytes");

        let uri = storage.artifact_uri(&handle);
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("update.apk"));
    }

    #[test]
    fn test_storage_from_config_uses_download_dir_override() {
        use crate::core::config::{SourceConfig, UpdaterConfig};

        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = UpdaterConfig::new(SourceConfig::LiveDocument);
        config.download_dir = Some(temp_dir.path().join("artifacts"));

        let storage = CacheDirStorage::from_config(&config).unwrap();
        let handle = storage.write_artifact(b"payload", "update.apk").unwrap();
        assert!(handle.path.starts_with(temp_dir.path().join("artifacts")));
    }

    #[test]
    fn test_logging_opener_never_fails() {
        // Contract check only: the call must not panic or return anything.
        LoggingOpener.open_external("https://example.com/release.apk");
    }
}
