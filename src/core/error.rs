use thiserror::Error;

use super::platform::Platform;

/// Errors surfaced by the update core.
///
/// Checker and downloader errors propagate to the caller; version and
/// reconciliation errors are contained locally and never abort startup.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// A version string contained a non-numeric component.
    #[error("malformed version string: {0:?}")]
    MalformedVersion(String),

    /// The remote version source could not be reached. Retryable by the
    /// caller; never retried internally.
    #[error("update check failed: {0}")]
    FetchFailed(#[source] anyhow::Error),

    /// The REST backend is rate limiting requests. Callers should treat
    /// this like `FetchFailed` but may back off longer.
    #[error("update source is rate limiting requests")]
    RateLimited,

    /// The remote payload did not normalize into a version descriptor.
    /// Non-retryable; treated as "no update available".
    #[error("invalid version descriptor: {0}")]
    InvalidDescriptor(String),

    /// Native installation of the artifact type is not available on this
    /// platform. Reported before any transfer starts.
    #[error("native install is not supported on platform {0}")]
    UnsupportedPlatform(Platform),

    /// A download session is already in the downloading or installing
    /// state. At most one download runs per process.
    #[error("a download is already in progress")]
    DownloadInProgress,

    /// The platform installer rejected the artifact.
    #[error("installer failed: {0}")]
    InstallFailed(String),
}

impl UpdateError {
    /// Whether the caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpdateError::FetchFailed(_) | UpdateError::RateLimited | UpdateError::DownloadInProgress
        )
    }
}
