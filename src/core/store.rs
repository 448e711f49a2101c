//! Local persistent key-value storage and the typed version record on
//! top of it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Storage key for the version the user last installed.
pub const KEY_INSTALLED: &str = "installed-app-version";
/// Storage key for the last version an update check saw.
pub const KEY_LAST_CHECKED: &str = "last-checked-version";
/// Legacy storage key kept only so drift repair can clear it.
pub const KEY_CLEANUP_MARKER: &str = "app-version";

/// Minimal key-value contract the host's storage must satisfy. No
/// transactions, no schema beyond what [`VersionStore`] imposes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Replace the entire contents with `entries` as one logical write.
    fn replace_all(&self, entries: &HashMap<String, String>) -> Result<()>;
}

/// In-memory store, used in tests and as a stand-in when the host has no
/// persistent storage (web).
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn replace_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        *self.entries.lock().unwrap() = entries.clone();
        Ok(())
    }
}

/// File-backed store: a flat string map serialized to a single JSON file.
///
/// Every mutation rewrites the whole file, so `replace_all` is naturally a
/// single write. Crash-transactionality across writes is not provided.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing entries if the file is
    /// present. An unreadable or corrupt file starts the store empty.
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Discarding corrupt store file {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read store: {path:?}"));
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory: {parent:?}"))?;
        }
        let json = serde_json::to_string_pretty(entries).context("Failed to serialize store")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write store: {:?}", self.path))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        self.persist(&entries)
    }

    fn replace_all(&self, new_entries: &HashMap<String, String>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        *entries = new_entries.clone();
        self.persist(&entries)
    }
}

/// Snapshot of the persisted version record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub installed_version: Option<String>,
    pub last_checked_version: Option<String>,
    pub cleanup_marker: Option<String>,
}

impl VersionRecord {
    pub fn is_empty(&self) -> bool {
        self.installed_version.is_none()
            && self.last_checked_version.is_none()
            && self.cleanup_marker.is_none()
    }
}

/// Typed access to the version record over any [`KeyValueStore`].
///
/// Only the reconciler and explicit resets mutate the record.
pub struct VersionStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> VersionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn installed_version(&self) -> Result<Option<String>> {
        self.store.get(KEY_INSTALLED)
    }

    pub fn last_checked_version(&self) -> Result<Option<String>> {
        self.store.get(KEY_LAST_CHECKED)
    }

    pub fn snapshot(&self) -> Result<VersionRecord> {
        Ok(VersionRecord {
            installed_version: self.store.get(KEY_INSTALLED)?,
            last_checked_version: self.store.get(KEY_LAST_CHECKED)?,
            cleanup_marker: self.store.get(KEY_CLEANUP_MARKER)?,
        })
    }

    pub fn set_installed_version(&self, version: &str) -> Result<()> {
        self.store.set(KEY_INSTALLED, version)
    }

    pub fn set_last_checked_version(&self, version: &str) -> Result<()> {
        self.store.set(KEY_LAST_CHECKED, version)
    }

    /// Clear every version key and adopt `version` as both installed and
    /// last-checked, as one logical operation. The cleanup marker does
    /// not survive this.
    pub fn reinitialize(&self, version: &str) -> Result<()> {
        let mut entries = HashMap::new();
        entries.insert(KEY_INSTALLED.to_string(), version.to_string());
        entries.insert(KEY_LAST_CHECKED.to_string(), version.to_string());
        self.store.replace_all(&entries)
    }

    /// Explicit full reset: remove every version key.
    pub fn reset(&self) -> Result<()> {
        self.store.replace_all(&HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_json_file_store_persists_across_opens() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("versions.json");

        {
            let store = JsonFileStore::open(path.clone()).unwrap();
            store.set(KEY_INSTALLED, "1.0.5").unwrap();
        }

        let reopened = JsonFileStore::open(path).unwrap();
        assert_eq!(
            reopened.get(KEY_INSTALLED).unwrap(),
            Some("1.0.5".to_string())
        );
    }

    #[test]
    fn test_json_file_store_corrupt_file_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("versions.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open(path).unwrap();
        assert_eq!(store.get(KEY_INSTALLED).unwrap(), None);
    }

    #[test]
    fn test_replace_all_drops_unrelated_keys() {
        let store = MemoryStore::new();
        store.set("stray", "value").unwrap();

        let mut entries = HashMap::new();
        entries.insert(KEY_INSTALLED.to_string(), "2.0.0".to_string());
        store.replace_all(&entries).unwrap();

        assert_eq!(store.get("stray").unwrap(), None);
        assert_eq!(store.get(KEY_INSTALLED).unwrap(), Some("2.0.0".to_string()));
    }

    #[test]
    fn test_version_store_snapshot_and_reinitialize() {
        let versions = VersionStore::new(MemoryStore::new());
        assert!(versions.snapshot().unwrap().is_empty());

        versions.set_installed_version("0.9.0").unwrap();
        versions.set_last_checked_version("1.0.0").unwrap();

        let snapshot = versions.snapshot().unwrap();
        assert_eq!(snapshot.installed_version.as_deref(), Some("0.9.0"));
        assert_eq!(snapshot.last_checked_version.as_deref(), Some("1.0.0"));

        versions.reinitialize("1.0.6").unwrap();
        let snapshot = versions.snapshot().unwrap();
        assert_eq!(snapshot.installed_version.as_deref(), Some("1.0.6"));
        assert_eq!(snapshot.last_checked_version.as_deref(), Some("1.0.6"));
        assert_eq!(snapshot.cleanup_marker, None);
    }

    #[test]
    fn test_version_store_reinitialize_clears_cleanup_marker() {
        let store = MemoryStore::new();
        store.set(KEY_CLEANUP_MARKER, "0.1.0").unwrap();

        let versions = VersionStore::new(store);
        versions.reinitialize("1.0.0").unwrap();

        assert_eq!(versions.snapshot().unwrap().cleanup_marker, None);
    }

    #[test]
    fn test_version_store_reset() {
        let versions = VersionStore::new(MemoryStore::new());
        versions.reinitialize("1.2.3").unwrap();
        versions.reset().unwrap();
        assert!(versions.snapshot().unwrap().is_empty());
    }
}
