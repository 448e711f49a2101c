//! In-app update core.
//!
//! Everything an application shell needs to keep itself up to date:
//! startup reconciliation of local version state, a single-shot update
//! check against a remote version source, and a streamed artifact
//! download with byte-level progress broadcast to observers.
//!
//! The entry point is [`UpdateManager`]: construct one per process in
//! your composition root, wire in the platform collaborators from
//! [`crate::core::platform`], call [`UpdateManager::startup`] once, and
//! invoke [`UpdateManager::check_for_updates`] only on explicit user
//! action; the library itself never polls.

pub mod core;

pub use crate::core::config::{SourceConfig, UpdaterConfig};
pub use crate::core::error::UpdateError;
pub use crate::core::event_bus::{ProgressBusContainer, ProgressEvent, SubscriptionId};
pub use crate::core::platform::{
    ArtifactHandle, ArtifactInstaller, ArtifactStorage, CacheDirStorage, ExternalOpener,
    LoggingOpener, Platform, PlatformCapabilities, TargetPlatform,
};
pub use crate::core::store::{
    JsonFileStore, KeyValueStore, MemoryStore, VersionRecord, VersionStore,
};
pub use crate::core::updater::{
    CheckTrigger, DownloadSession, DownloadStatus, LiveDocumentReceiver, LiveDocumentSender,
    ReconcileOutcome, ReconcileReport, ReconcilerState, StartupReport, UpdateCheckResult,
    UpdateChecker, UpdateDownloader, UpdateInfo, UpdateManager, Version, VersionDocument,
    VersionInfo, VersionReconciler, is_newer, live_document_channel,
};
