use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::core::config::SourceConfig;
use crate::core::error::UpdateError;
use crate::core::platform::Platform;

use super::version::Version;

/// Information about an available update, normalized from whichever
/// backend produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub version: String,
    pub download_url: String,
    pub release_notes: String,
    pub build_date: Option<DateTime<Utc>>,
    pub platform: Platform,
    pub file_size: Option<u64>,
}

impl UpdateInfo {
    pub fn parse_version(&self) -> Result<Version, UpdateError> {
        Version::parse(&self.version)
    }
}

/// Result of checking for updates.
#[derive(Debug, Clone)]
pub enum UpdateCheckResult {
    /// No update available (current version is latest).
    NoUpdate,
    /// Update available with info.
    UpdateAvailable(UpdateInfo),
    /// Error occurred while checking.
    Error(String),
}

/// What prompted a check. Startup checks fail silently ("no update"),
/// manual checks surface their errors to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    Startup,
    Manual,
}

/// Version document shape shared by the static JSON endpoint and the
/// live document backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDocument {
    pub version: String,
    #[serde(default)]
    pub build_date: Option<String>,
    #[serde(default)]
    pub release_notes: String,
    #[serde(default)]
    pub downloads: std::collections::HashMap<String, String>,
}

/// Handle used by an external integration to push version documents into
/// a [`SourceConfig::LiveDocument`] checker.
pub type LiveDocumentSender = watch::Sender<Option<VersionDocument>>;
pub type LiveDocumentReceiver = watch::Receiver<Option<VersionDocument>>;

/// Create the channel pair backing a live document source.
pub fn live_document_channel() -> (LiveDocumentSender, LiveDocumentReceiver) {
    watch::channel(None)
}

/// Update checker that queries a remote version source.
///
/// The fetch is never driven by a timer: it runs once at startup and
/// afterwards only on explicit user action.
#[derive(Clone)]
pub struct UpdateChecker {
    source: SourceConfig,
    platform: Platform,
    client: reqwest::Client,
    live_rx: Option<LiveDocumentReceiver>,
}

impl UpdateChecker {
    pub fn new(source: SourceConfig, platform: Platform, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("inapp-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            source,
            platform,
            client,
            live_rx: None,
        }
    }

    /// Attach the receiving end of a live document channel. Required for
    /// the `LiveDocument` backend; ignored by the others.
    pub fn with_live_receiver(mut self, rx: LiveDocumentReceiver) -> Self {
        self.live_rx = Some(rx);
        self
    }

    /// Check for available updates against `current`.
    ///
    /// Per the propagation policy, a startup-triggered check degrades any
    /// failure to `NoUpdate`; a manual check reports transport failures
    /// as `Error`. An invalid remote descriptor means "no update" either
    /// way.
    pub async fn check_for_updates(
        &self,
        current: &Version,
        trigger: CheckTrigger,
    ) -> UpdateCheckResult {
        match self.fetch_latest().await {
            Ok(info) => match info.parse_version() {
                Ok(latest) => {
                    if latest.is_newer_than(current) {
                        log::info!("Update available: {} -> {}", current, latest);
                        UpdateCheckResult::UpdateAvailable(info)
                    } else {
                        log::info!("No update available (current: {})", current);
                        UpdateCheckResult::NoUpdate
                    }
                }
                Err(e) => {
                    log::error!("Failed to parse remote version: {}", e);
                    UpdateCheckResult::NoUpdate
                }
            },
            Err(e @ UpdateError::InvalidDescriptor(_)) => {
                log::error!("Remote descriptor rejected: {}", e);
                UpdateCheckResult::NoUpdate
            }
            Err(e) => {
                log::error!("Failed to check for updates: {}", e);
                match trigger {
                    CheckTrigger::Startup => UpdateCheckResult::NoUpdate,
                    CheckTrigger::Manual => UpdateCheckResult::Error(e.to_string()),
                }
            }
        }
    }

    /// Fetch the latest version descriptor from the configured backend.
    pub async fn fetch_latest(&self) -> Result<UpdateInfo, UpdateError> {
        match &self.source {
            SourceConfig::StaticJson { url } => self.fetch_static_document(url).await,
            SourceConfig::GithubReleases { api_url } => self.fetch_github_release(api_url).await,
            SourceConfig::LiveDocument => self.latest_live_document(),
        }
    }

    async fn fetch_static_document(&self, url: &str) -> Result<UpdateInfo, UpdateError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::FetchFailed(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let document: VersionDocument = response
            .json()
            .await
            .map_err(|e| UpdateError::InvalidDescriptor(e.to_string()))?;

        descriptor_from_document(&document, self.platform)
    }

    async fn fetch_github_release(&self, api_url: &str) -> Result<UpdateInfo, UpdateError> {
        let response = self
            .client
            .get(api_url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| UpdateError::FetchFailed(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let release: GitHubRelease = response
            .json()
            .await
            .map_err(|e| UpdateError::InvalidDescriptor(e.to_string()))?;

        descriptor_from_release(&release, self.platform)
    }

    fn latest_live_document(&self) -> Result<UpdateInfo, UpdateError> {
        let rx = self.live_rx.as_ref().ok_or_else(|| {
            UpdateError::FetchFailed(anyhow!("live document source has no receiver attached"))
        })?;

        let document = rx.borrow().clone().ok_or_else(|| {
            UpdateError::FetchFailed(anyhow!("no version document has been pushed yet"))
        })?;

        descriptor_from_document(&document, self.platform)
    }
}

fn status_error(status: reqwest::StatusCode) -> UpdateError {
    // GitHub reports rate limiting as 403 as well as 429.
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::FORBIDDEN
    {
        UpdateError::RateLimited
    } else {
        UpdateError::FetchFailed(anyhow!("HTTP {status}"))
    }
}

/// Normalize a version document into an [`UpdateInfo`] for `platform`.
pub fn descriptor_from_document(
    document: &VersionDocument,
    platform: Platform,
) -> Result<UpdateInfo, UpdateError> {
    if document.version.trim().is_empty() {
        return Err(UpdateError::InvalidDescriptor(
            "document has no version".to_string(),
        ));
    }

    let download_url = document
        .downloads
        .get(platform.as_str())
        .cloned()
        .ok_or_else(|| {
            UpdateError::InvalidDescriptor(format!("no download URL for platform {platform}"))
        })?;

    Ok(UpdateInfo {
        version: document.version.trim().trim_start_matches('v').to_string(),
        download_url,
        release_notes: document.release_notes.clone(),
        build_date: parse_build_date(document.build_date.as_deref()),
        platform,
        file_size: None,
    })
}

/// Normalize a GitHub release into an [`UpdateInfo`] for `platform`,
/// selecting the asset whose name matches the platform's artifact type.
pub fn descriptor_from_release(
    release: &GitHubRelease,
    platform: Platform,
) -> Result<UpdateInfo, UpdateError> {
    let version = release.tag_name.trim().trim_start_matches('v');
    if version.is_empty() {
        return Err(UpdateError::InvalidDescriptor(
            "release has no tag name".to_string(),
        ));
    }

    let asset = release
        .assets
        .iter()
        .find(|asset| asset_matches_platform(&asset.name, platform))
        .ok_or_else(|| {
            UpdateError::InvalidDescriptor(format!("no release asset for platform {platform}"))
        })?;

    Ok(UpdateInfo {
        version: version.to_string(),
        download_url: asset.browser_download_url.clone(),
        release_notes: release.body.clone().unwrap_or_default(),
        build_date: parse_build_date(release.published_at.as_deref()),
        platform,
        file_size: Some(asset.size),
    })
}

fn asset_matches_platform(name: &str, platform: Platform) -> bool {
    let name = name.to_lowercase();
    match platform {
        Platform::Android => name.ends_with(".apk"),
        Platform::Ios => name.ends_with(".ipa"),
        Platform::Desktop => [".dmg", ".exe", ".msi", ".appimage", ".deb"]
            .iter()
            .any(|ext| name.ends_with(ext)),
        Platform::Web => false,
    }
}

fn parse_build_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(date) => Some(date.with_timezone(&Utc)),
        Err(e) => {
            log::debug!("Ignoring unparsable build date {raw:?}: {e}");
            None
        }
    }
}

/// GitHub release API response structure.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> VersionDocument {
        serde_json::from_value(serde_json::json!({
            "version": "1.0.90",
            "buildDate": "2026-08-20T10:00:00Z",
            "releaseNotes": "Stability fixes",
            "downloads": {
                "android": "https://example.com/app-1.0.90.apk",
                "desktop": "https://example.com/app-1.0.90.dmg"
            }
        }))
        .unwrap()
    }

    fn sample_release() -> GitHubRelease {
        serde_json::from_value(serde_json::json!({
            "tag_name": "v1.0.90",
            "body": "Stability fixes",
            "published_at": "2026-08-20T10:00:00Z",
            "assets": [
                {"name": "app-release.apk", "browser_download_url": "https://example.com/app-release.apk", "size": 12345},
                {"name": "app-setup.exe", "browser_download_url": "https://example.com/app-setup.exe", "size": 54321}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_descriptor_from_document() {
        let info = descriptor_from_document(&sample_document(), Platform::Android).unwrap();
        assert_eq!(info.version, "1.0.90");
        assert_eq!(info.download_url, "https://example.com/app-1.0.90.apk");
        assert_eq!(info.release_notes, "Stability fixes");
        assert!(info.build_date.is_some());
        assert_eq!(info.platform, Platform::Android);
    }

    #[test]
    fn test_descriptor_from_document_missing_platform_url() {
        let err = descriptor_from_document(&sample_document(), Platform::Ios).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_descriptor_from_document_empty_version() {
        let mut document = sample_document();
        document.version = "  ".to_string();
        let err = descriptor_from_document(&document, Platform::Android).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_descriptor_from_release_selects_platform_asset() {
        let info = descriptor_from_release(&sample_release(), Platform::Android).unwrap();
        assert_eq!(info.version, "1.0.90");
        assert_eq!(info.download_url, "https://example.com/app-release.apk");
        assert_eq!(info.file_size, Some(12345));

        let info = descriptor_from_release(&sample_release(), Platform::Desktop).unwrap();
        assert_eq!(info.download_url, "https://example.com/app-setup.exe");
    }

    #[test]
    fn test_descriptor_from_release_no_matching_asset() {
        let err = descriptor_from_release(&sample_release(), Platform::Web).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_status_error_rate_limit_mapping() {
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS),
            UpdateError::RateLimited
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::FORBIDDEN),
            UpdateError::RateLimited
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::NOT_FOUND),
            UpdateError::FetchFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_live_document_fetch() {
        let (tx, rx) = live_document_channel();
        let checker = UpdateChecker::new(
            SourceConfig::LiveDocument,
            Platform::Android,
            Duration::from_secs(1),
        )
        .with_live_receiver(rx);

        // Nothing pushed yet.
        assert!(matches!(
            checker.fetch_latest().await,
            Err(UpdateError::FetchFailed(_))
        ));

        tx.send(Some(sample_document())).unwrap();
        let info = checker.fetch_latest().await.unwrap();
        assert_eq!(info.version, "1.0.90");
    }

    #[tokio::test]
    async fn test_live_check_reports_newer_version() {
        let (tx, rx) = live_document_channel();
        tx.send(Some(sample_document())).unwrap();

        let checker = UpdateChecker::new(
            SourceConfig::LiveDocument,
            Platform::Android,
            Duration::from_secs(1),
        )
        .with_live_receiver(rx);

        let current = Version::parse("1.0.83").unwrap();
        let result = checker.check_for_updates(&current, CheckTrigger::Manual).await;
        assert!(matches!(result, UpdateCheckResult::UpdateAvailable(_)));

        let current = Version::parse("1.0.90").unwrap();
        let result = checker.check_for_updates(&current, CheckTrigger::Manual).await;
        assert!(matches!(result, UpdateCheckResult::NoUpdate));
    }

    #[tokio::test]
    async fn test_startup_check_degrades_errors_to_no_update() {
        // Port 1 is never listening; the connection fails immediately.
        let checker = UpdateChecker::new(
            SourceConfig::StaticJson {
                url: "http://127.0.0.1:1/version.json".to_string(),
            },
            Platform::Android,
            Duration::from_secs(1),
        );

        let current = Version::parse("1.0.0").unwrap();
        let result = checker
            .check_for_updates(&current, CheckTrigger::Startup)
            .await;
        assert!(matches!(result, UpdateCheckResult::NoUpdate));

        let result = checker
            .check_for_updates(&current, CheckTrigger::Manual)
            .await;
        assert!(matches!(result, UpdateCheckResult::Error(_)));
    }
}
