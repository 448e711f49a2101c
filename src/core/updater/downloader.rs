use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use futures::StreamExt;
use serde::Serialize;

use crate::core::error::UpdateError;
use crate::core::event_bus::{ProgressBusContainer, ProgressEvent};
use crate::core::platform::{
    ArtifactHandle, ArtifactInstaller, ArtifactStorage, ExternalOpener, PlatformCapabilities,
};

/// Lifecycle states of a download session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Idle,
    Downloading,
    Installing,
    Completed,
    Error,
}

/// Transient state of the single in-flight download. Reset to idle on
/// completion or error.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub status: DownloadStatus,
    pub progress_percent: u8,
    pub total_bytes: Option<u64>,
    pub loaded_bytes: u64,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self {
            status: DownloadStatus::Idle,
            progress_percent: 0,
            total_bytes: None,
            loaded_bytes: 0,
        }
    }
}

impl DownloadSession {
    fn is_busy(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Downloading | DownloadStatus::Installing
        )
    }
}

/// Downloads an installer artifact, reporting byte-level progress, and
/// hands it to the platform installer.
///
/// At most one download may be in flight per process: a second call
/// while a session is downloading or installing fails immediately with
/// [`UpdateError::DownloadInProgress`] and leaves the live session
/// untouched.
#[derive(Clone)]
pub struct UpdateDownloader {
    session: Arc<Mutex<DownloadSession>>,
    bus: ProgressBusContainer,
    capabilities: Arc<dyn PlatformCapabilities>,
    storage: Arc<dyn ArtifactStorage>,
    installer: Option<Arc<dyn ArtifactInstaller>>,
    opener: Arc<dyn ExternalOpener>,
    client: reqwest::Client,
}

impl UpdateDownloader {
    /// The client carries no request timeout of its own; callers wanting
    /// bounded latency impose their own policy.
    pub fn new(
        bus: ProgressBusContainer,
        capabilities: Arc<dyn PlatformCapabilities>,
        storage: Arc<dyn ArtifactStorage>,
        opener: Arc<dyn ExternalOpener>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(DownloadSession::default())),
            bus,
            capabilities,
            storage,
            installer: None,
            opener,
            client: reqwest::Client::new(),
        }
    }

    /// Attach a native installer. Without one, installation falls back
    /// to the external opener.
    pub fn with_installer(mut self, installer: Arc<dyn ArtifactInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> DownloadSession {
        self.session.lock().unwrap().clone()
    }

    /// Download the artifact at `url`, stream progress to the bus, write
    /// it to cache storage, and invoke the platform installer.
    pub async fn download_and_install(&self, url: &str) -> Result<ArtifactHandle, UpdateError> {
        if !self.capabilities.is_native_install_supported() {
            return Err(UpdateError::UnsupportedPlatform(
                self.capabilities.current_platform(),
            ));
        }

        self.begin()?;

        match self.transfer_and_install(url).await {
            Ok(handle) => {
                self.complete();
                Ok(handle)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Claim the session. Check-and-set happens under a single lock
    /// acquisition, so two concurrent callers cannot both claim it.
    fn begin(&self) -> Result<(), UpdateError> {
        let snapshot = {
            let mut session = self.session.lock().unwrap();
            if session.is_busy() {
                return Err(UpdateError::DownloadInProgress);
            }
            *session = DownloadSession {
                status: DownloadStatus::Downloading,
                ..DownloadSession::default()
            };
            session.clone()
        };
        self.bus.publish(ProgressEvent::from_session(&snapshot));
        Ok(())
    }

    async fn transfer_and_install(&self, url: &str) -> Result<ArtifactHandle, UpdateError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::FetchFailed(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::FetchFailed(anyhow!(
                "artifact download returned HTTP {status}"
            )));
        }

        let total = response.content_length();
        {
            let mut session = self.session.lock().unwrap();
            session.total_bytes = total;
        }

        // The artifact is accumulated in memory; installers here are
        // bounded at tens of MB. Streaming to disk would keep the same
        // progress contract.
        let mut buffer: Vec<u8> = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| UpdateError::FetchFailed(e.into()))?;
            buffer.extend_from_slice(&chunk);

            let snapshot = {
                let mut session = self.session.lock().unwrap();
                session.loaded_bytes += chunk.len() as u64;
                if let Some(total) = session.total_bytes {
                    session.progress_percent = percent(session.loaded_bytes, total);
                }
                session.clone()
            };
            self.bus.publish(ProgressEvent::from_session(&snapshot));
        }

        let name = suggested_file_name(url);
        let handle = self
            .storage
            .write_artifact(&buffer, &name)
            .map_err(|e| UpdateError::InstallFailed(format!("failed to write artifact: {e:#}")))?;

        let snapshot = {
            let mut session = self.session.lock().unwrap();
            session.status = DownloadStatus::Installing;
            session.progress_percent = 100;
            session.clone()
        };
        self.bus.publish(ProgressEvent::from_session(&snapshot));

        self.install(&self.storage.artifact_uri(&handle));

        Ok(handle)
    }

    /// Invoke the native installer, falling back to the external opener.
    /// The fallback never fails observably, so neither does this step.
    fn install(&self, uri: &str) {
        match &self.installer {
            Some(installer) => {
                if let Err(e) = installer.install_artifact(uri) {
                    log::error!("Native install failed, opening externally: {e:#}");
                    self.opener.open_external(uri);
                }
            }
            None => {
                log::info!("No native installer wired in, opening externally");
                self.opener.open_external(uri);
            }
        }
    }

    fn complete(&self) {
        let snapshot = {
            let mut session = self.session.lock().unwrap();
            session.status = DownloadStatus::Completed;
            session.progress_percent = 100;
            session.clone()
        };
        self.bus.publish(ProgressEvent::from_session(&snapshot));
        *self.session.lock().unwrap() = DownloadSession::default();
    }

    /// Move the session to error, notify listeners with the message, and
    /// clear the in-progress guard so a retry is possible.
    fn fail(&self, error: &UpdateError) {
        let snapshot = {
            let mut session = self.session.lock().unwrap();
            session.status = DownloadStatus::Error;
            session.clone()
        };
        self.bus
            .publish(ProgressEvent::failure(&snapshot, error.to_string()));
        *self.session.lock().unwrap() = DownloadSession::default();
    }
}

fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let raw = (loaded as f64 / total as f64 * 100.0).round() as u64;
    raw.min(100) as u8
}

/// Derive an artifact file name from the URL's last path segment.
fn suggested_file_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.split('/').next_back())
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("update-{}.bin", chrono::Utc::now().timestamp_millis()))
}
