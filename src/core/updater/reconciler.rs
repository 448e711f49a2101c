//! Startup reconciliation between the persisted version record and the
//! version baked into the running build.
//!
//! Runs exactly once per process lifetime, before any update check, and
//! never on a timer. Storage failures are logged and treated as an
//! uninitialized record; reconciliation must never block application
//! startup.

use serde::Serialize;

use crate::core::store::{KeyValueStore, VersionRecord, VersionStore};

use super::version::Version;

/// States of the reconciliation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconcilerState {
    Uninitialized,
    Synced,
    DriftDetected,
    Repaired,
}

/// What the reconciler did to the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconcileOutcome {
    /// No stored version existed; the build version was adopted.
    Initialized,
    /// Stored version differed within the trust threshold and was
    /// updated in place.
    Updated { from: String },
    /// Record already matched the build version; nothing written.
    AlreadySynced,
    /// Drift beyond the trust threshold; the whole record was wiped and
    /// reinitialized.
    Repaired,
}

/// Structured reconciliation report, emitted for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub cleaned: bool,
    pub previous_state: VersionRecord,
    pub new_version: String,
    pub outcome: ReconcileOutcome,
    pub final_state: ReconcilerState,
}

/// Detects and repairs drift between the version store and the build.
pub struct VersionReconciler<'a, S: KeyValueStore> {
    store: &'a VersionStore<S>,
    build_version: Version,
    drift_threshold: i64,
}

impl<'a, S: KeyValueStore> VersionReconciler<'a, S> {
    pub fn new(store: &'a VersionStore<S>, build_version: Version, drift_threshold: i64) -> Self {
        Self {
            store,
            build_version,
            drift_threshold,
        }
    }

    /// Resolve any drift between the stored record and the build
    /// version. Idempotent: a second run with no external state change
    /// reports `AlreadySynced` and writes nothing.
    pub fn reconcile(&self) -> ReconcileReport {
        let previous = self.store.snapshot().unwrap_or_else(|e| {
            log::warn!("Failed to read version store, assuming uninitialized: {e:#}");
            VersionRecord {
                installed_version: None,
                last_checked_version: None,
                cleanup_marker: None,
            }
        });

        let build = self.build_version.to_string();

        let Some(stored_raw) = previous.installed_version.clone() else {
            log::info!("No installed version recorded, initializing to {build}");
            return self.adopt(previous, ReconcileOutcome::Initialized, ReconcilerState::Synced);
        };

        let stored = match Version::parse(&stored_raw) {
            Ok(version) => version,
            Err(e) => {
                // An unreadable stored version is drift by definition.
                log::warn!("Stored version {stored_raw:?} is malformed ({e}), repairing");
                return self.repair(previous);
            }
        };

        if stored == self.build_version {
            log::info!("Version record already synced at {build}");
            return ReconcileReport {
                cleaned: false,
                previous_state: previous,
                new_version: build,
                outcome: ReconcileOutcome::AlreadySynced,
                final_state: ReconcilerState::Synced,
            };
        }

        let gap = self.build_version.magnitude_gap(&stored);
        if gap > self.drift_threshold || gap < 0 {
            // Too far behind to trust local state, or the record claims a
            // version ahead of the running build.
            log::warn!(
                "Drift detected: stored {stored}, build {build}, gap {gap} (threshold {})",
                self.drift_threshold
            );
            return self.repair(previous);
        }

        log::info!("Updating installed version {stored} -> {build} (gap {gap})");
        if let Err(e) = self.store.set_installed_version(&build) {
            log::warn!("Failed to update installed version: {e:#}");
        }
        if let Err(e) = self.store.set_last_checked_version(&build) {
            log::warn!("Failed to update last checked version: {e:#}");
        }

        ReconcileReport {
            cleaned: false,
            previous_state: previous,
            new_version: build,
            outcome: ReconcileOutcome::Updated {
                from: stored.to_string(),
            },
            final_state: ReconcilerState::Synced,
        }
    }

    fn adopt(
        &self,
        previous: VersionRecord,
        outcome: ReconcileOutcome,
        final_state: ReconcilerState,
    ) -> ReconcileReport {
        let build = self.build_version.to_string();
        if let Err(e) = self.store.set_installed_version(&build) {
            log::warn!("Failed to initialize installed version: {e:#}");
        }
        if let Err(e) = self.store.set_last_checked_version(&build) {
            log::warn!("Failed to initialize last checked version: {e:#}");
        }

        ReconcileReport {
            cleaned: false,
            previous_state: previous,
            new_version: build,
            outcome,
            final_state,
        }
    }

    /// Full wipe and reinit as one logical operation: every version key
    /// is cleared, including the legacy cleanup marker, then the build
    /// version is adopted.
    fn repair(&self, previous: VersionRecord) -> ReconcileReport {
        let build = self.build_version.to_string();
        log::info!("Repairing version record, resetting to {build}");

        if let Err(e) = self.store.reinitialize(&build) {
            log::warn!("Failed to repair version store: {e:#}");
        }

        ReconcileReport {
            cleaned: true,
            previous_state: previous,
            new_version: build,
            outcome: ReconcileOutcome::Repaired,
            final_state: ReconcilerState::Repaired,
        }
    }
}
