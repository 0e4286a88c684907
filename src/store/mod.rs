//! Durable key-value persistence for pipeline state.
//!
//! The sequencer and the ledger each keep their authoritative state in memory
//! and mirror it to a `PersistenceBackend` under a namespaced key. Backends
//! report failures explicitly; the best-effort helpers at the bottom of this
//! module are where those failures are logged and dropped.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::StoreError;

/// Key holding the phase-output map.
pub const PHASE_OUTPUTS_KEY: &str = "pipeline.phase_outputs";
/// Key holding the known-incomplete item collection.
pub const KNOWN_INCOMPLETE_KEY: &str = "pipeline.known_incomplete";
/// Key holding the blocked-phase register.
pub const BLOCKED_PHASES_KEY: &str = "pipeline.blocked_phases";

/// Minimal key-value contract used by the control plane.
pub trait PersistenceBackend: Send + Sync {
    /// Read the raw bytes stored under `key`, or `None` when nothing is stored.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the bytes stored under `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl PersistenceBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;

        // Write-then-rename so a crash never leaves a half-written value behind.
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// In-process backend, used by tests and embedders without durable storage.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}

/// Decode the JSON value stored under `key`.
pub fn read_json<T: DeserializeOwned>(
    backend: &dyn PersistenceBackend,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(bytes) = backend.get(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })
}

/// Encode `value` as JSON and store it under `key`.
pub fn write_json<T: Serialize>(
    backend: &dyn PersistenceBackend,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })?;
    backend.set(key, &bytes)
}

/// Load `key`, treating missing, unreadable, or corrupt data as empty.
pub fn load_or_default<T: DeserializeOwned + Default>(
    backend: &dyn PersistenceBackend,
    key: &str,
) -> T {
    match read_json(backend, key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "persisted state unusable, starting empty");
            T::default()
        }
    }
}

/// Persist `value` under `key`; a failure is logged and otherwise ignored.
pub fn save_best_effort<T: Serialize>(backend: &dyn PersistenceBackend, key: &str, value: &T) {
    if let Err(e) = write_json(backend, key, value) {
        tracing::warn!(key, error = %e, "failed to persist state, continuing in memory");
    }
}

/// Remove `key`; a failure is logged and otherwise ignored.
pub fn remove_best_effort(backend: &dyn PersistenceBackend, key: &str) {
    if let Err(e) = backend.remove(key) {
        tracing::warn!(key, error = %e, "failed to clear persisted state");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Backend whose every operation fails; reads can optionally return garbage instead.
    pub struct FailingBackend {
        pub corrupt_reads: bool,
    }

    impl PersistenceBackend for FailingBackend {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            if self.corrupt_reads {
                Ok(Some(b"{not json".to_vec()))
            } else {
                Err(StoreError::Unavailable("disk unplugged".into()))
            }
        }

        fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk unplugged".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FailingBackend;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_backend_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(backend.get("nothing").unwrap().is_none());
    }

    #[test]
    fn test_file_backend_set_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state").join("deeper");
        let backend = FileBackend::new(&nested);
        backend.set("k", b"[1,2]").unwrap();
        assert!(nested.join("k.json").exists());
        assert_eq!(backend.get("k").unwrap().unwrap(), b"[1,2]");
    }

    #[test]
    fn test_file_backend_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::new(dir.path());
            write_json(&backend, PHASE_OUTPUTS_KEY, &vec!["a", "b"]).unwrap();
        }
        let backend = FileBackend::new(dir.path());
        let loaded: Vec<String> = read_json(&backend, PHASE_OUTPUTS_KEY).unwrap().unwrap();
        assert_eq!(loaded, vec!["a", "b"]);
    }

    #[test]
    fn test_file_backend_remove_absent_key_succeeds() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.remove("never-written").unwrap();
        backend.set("k", b"1").unwrap();
        backend.remove("k").unwrap();
        assert!(backend.get("k").unwrap().is_none());
    }

    #[test]
    fn test_read_json_reports_corruption() {
        let backend = MemoryBackend::new();
        backend.set("k", b"{oops").unwrap();
        let result: Result<Option<Vec<u32>>, _> = read_json(&backend, "k");
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_load_or_default_swallows_corruption() {
        let backend = FailingBackend {
            corrupt_reads: true,
        };
        let loaded: Vec<u32> = load_or_default(&backend, "k");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_load_or_default_swallows_unavailable_backend() {
        let backend = FailingBackend {
            corrupt_reads: false,
        };
        let loaded: HashMap<String, String> = load_or_default(&backend, "k");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_best_effort_does_not_panic_on_failure() {
        let backend = FailingBackend {
            corrupt_reads: false,
        };
        save_best_effort(&backend, "k", &vec![1, 2, 3]);
        remove_best_effort(&backend, "k");
    }
}
