mod checker;
mod downloader;
mod reconciler;
mod version;

pub use checker::{
    CheckTrigger, GitHubAsset, GitHubRelease, LiveDocumentReceiver, LiveDocumentSender,
    UpdateCheckResult, UpdateChecker, UpdateInfo, VersionDocument, live_document_channel,
};
pub use downloader::{DownloadSession, DownloadStatus, UpdateDownloader};
pub use reconciler::{ReconcileOutcome, ReconcileReport, ReconcilerState, VersionReconciler};
pub use version::{Version, is_newer};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::config::UpdaterConfig;
use crate::core::error::UpdateError;
use crate::core::event_bus::ProgressBusContainer;
use crate::core::platform::{
    ArtifactHandle, ArtifactInstaller, ArtifactStorage, ExternalOpener, PlatformCapabilities,
};
use crate::core::store::{KeyValueStore, VersionStore};

/// Outcome of application startup: the one-time reconciliation plus the
/// single automatic update check.
#[derive(Debug, Clone)]
pub struct StartupReport {
    /// `None` when startup ran before and reconciliation was skipped.
    pub reconcile: Option<ReconcileReport>,
    pub check: UpdateCheckResult,
}

/// Diagnostic snapshot of local version state.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub current: String,
    pub installed: Option<String>,
    pub last_checked: Option<String>,
    /// Weighted gap between the build and the stored installed version,
    /// when both parse.
    pub drift_gap: Option<i64>,
}

/// Update manager that coordinates reconciliation, checking, downloading,
/// and installing updates.
///
/// One instance per process, constructed by the application's
/// composition root and passed by reference to consumers. There is no
/// timer anywhere in here: the remote source is queried once at startup
/// and afterwards only on explicit user action.
pub struct UpdateManager<S: KeyValueStore> {
    config: UpdaterConfig,
    store: VersionStore<S>,
    checker: UpdateChecker,
    downloader: UpdateDownloader,
    bus: ProgressBusContainer,
    build_version: Version,
    reconciled: AtomicBool,
    last_fetched: Mutex<Option<UpdateInfo>>,
    last_check_at: Mutex<Option<DateTime<Utc>>>,
}

impl<S: KeyValueStore> UpdateManager<S> {
    pub fn new(
        config: UpdaterConfig,
        store: S,
        capabilities: Arc<dyn PlatformCapabilities>,
        storage: Arc<dyn ArtifactStorage>,
        opener: Arc<dyn ExternalOpener>,
    ) -> Self {
        let bus = ProgressBusContainer::new();
        let checker = UpdateChecker::new(
            config.source.clone(),
            capabilities.current_platform(),
            Duration::from_secs(config.request_timeout_secs),
        );
        let downloader = UpdateDownloader::new(bus.clone(), capabilities, storage, opener);

        Self {
            config,
            store: VersionStore::new(store),
            checker,
            downloader,
            bus,
            build_version: Version::current(),
            reconciled: AtomicBool::new(false),
            last_fetched: Mutex::new(None),
            last_check_at: Mutex::new(None),
        }
    }

    /// Attach a native installer collaborator.
    pub fn with_installer(mut self, installer: Arc<dyn ArtifactInstaller>) -> Self {
        self.downloader = self.downloader.with_installer(installer);
        self
    }

    /// Attach the receiving end of a live document channel (required for
    /// the `LiveDocument` source).
    pub fn with_live_receiver(mut self, rx: LiveDocumentReceiver) -> Self {
        self.checker = self.checker.with_live_receiver(rx);
        self
    }

    /// Override the build-time version (the Cargo package version by
    /// default).
    pub fn with_build_version(mut self, version: Version) -> Self {
        self.build_version = version;
        self
    }

    /// Run startup: reconcile local version state exactly once, then
    /// perform the single automatic update check. Reconciliation
    /// failures never abort startup.
    pub async fn startup(&self) -> StartupReport {
        let reconcile = if self.reconciled.swap(true, Ordering::SeqCst) {
            log::warn!("startup() called more than once, skipping reconciliation");
            None
        } else {
            let report = VersionReconciler::new(
                &self.store,
                self.build_version,
                self.config.drift_threshold,
            )
            .reconcile();
            match serde_json::to_string(&report) {
                Ok(json) => log::info!("Version reconciliation: {json}"),
                Err(_) => log::info!("Version reconciliation outcome: {:?}", report.outcome),
            }
            Some(report)
        };

        let check = self.check(CheckTrigger::Startup).await;
        StartupReport { reconcile, check }
    }

    /// Manually-triggered update check. Unlike the startup check, errors
    /// surface to the caller for user-visible messaging.
    pub async fn check_for_updates(&self) -> UpdateCheckResult {
        self.check(CheckTrigger::Manual).await
    }

    async fn check(&self, trigger: CheckTrigger) -> UpdateCheckResult {
        let current = self.installed_or_build_version();
        let result = self.checker.check_for_updates(&current, trigger).await;

        *self.last_check_at.lock().unwrap() = Some(Utc::now());

        if let UpdateCheckResult::UpdateAvailable(info) = &result {
            if let Err(e) = self.store.set_last_checked_version(&info.version) {
                log::warn!("Failed to record last checked version: {e:#}");
            }
            *self.last_fetched.lock().unwrap() = Some(info.clone());
        }

        result
    }

    /// Download the artifact described by `info` and hand it to the
    /// platform installer, streaming progress through the bus.
    pub async fn download_update(&self, info: &UpdateInfo) -> Result<ArtifactHandle, UpdateError> {
        log::info!("Downloading update {} from {}", info.version, info.download_url);
        self.downloader.download_and_install(&info.download_url).await
    }

    /// Bus carrying download and install lifecycle events; subscribe UI
    /// observers here.
    pub fn progress_bus(&self) -> &ProgressBusContainer {
        &self.bus
    }

    /// Snapshot of the in-flight download session.
    pub fn download_session(&self) -> DownloadSession {
        self.downloader.session()
    }

    /// Version baked into the running build.
    pub fn current_version(&self) -> Version {
        self.build_version
    }

    /// Descriptor from the most recent successful check, if any.
    pub fn last_fetched(&self) -> Option<UpdateInfo> {
        self.last_fetched.lock().unwrap().clone()
    }

    pub fn last_check_at(&self) -> Option<DateTime<Utc>> {
        *self.last_check_at.lock().unwrap()
    }

    /// Full diagnostic view of local version state.
    pub fn version_info(&self) -> VersionInfo {
        let snapshot = self.store.snapshot().unwrap_or_else(|e| {
            log::warn!("Failed to read version store: {e:#}");
            crate::core::store::VersionRecord {
                installed_version: None,
                last_checked_version: None,
                cleanup_marker: None,
            }
        });

        let drift_gap = snapshot
            .installed_version
            .as_deref()
            .and_then(|raw| Version::parse(raw).ok())
            .map(|stored| self.build_version.magnitude_gap(&stored));

        VersionInfo {
            current: self.build_version.to_string(),
            installed: snapshot.installed_version,
            last_checked: snapshot.last_checked_version,
            drift_gap,
        }
    }

    /// Explicit full reset of the version record, then a fresh
    /// reconciliation. Debugging aid; the only sanctioned way to make
    /// the stored version regress.
    pub fn reset_versions(&self) -> ReconcileReport {
        if let Err(e) = self.store.reset() {
            log::warn!("Failed to reset version store: {e:#}");
        }
        VersionReconciler::new(&self.store, self.build_version, self.config.drift_threshold)
            .reconcile()
    }

    fn installed_or_build_version(&self) -> Version {
        match self.store.installed_version() {
            Ok(Some(raw)) => Version::parse(&raw).unwrap_or(self.build_version),
            _ => self.build_version,
        }
    }
}
