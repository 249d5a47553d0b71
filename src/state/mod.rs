//! Durable record of which fax files have been handled.
//!
//! One JSON object maps each file identity to the outcome of its most recent
//! processing attempt. Every mutation is written straight through with an
//! atomic temp-file rename, so a crash between attempts leaves the file as it
//! was after the last completed attempt.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FaxError, Result};

/// Normalized absolute path of a candidate file; the State Store key.
///
/// Normalization is lexical (no filesystem access), so the identity of a file
/// is the same before and after it is deleted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileIdentity(String);

impl FileIdentity {
    pub fn from_path(path: &Path) -> Result<Self> {
        let absolute = std::path::absolute(path)?;
        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        Ok(Self(normalized.to_string_lossy().into_owned()))
    }

    /// Like [`from_path`](Self::from_path), but resolves symlinks in the
    /// parent directory when it exists. The file itself need not exist.
    pub fn resolve(path: &Path) -> Result<Self> {
        let lexical = Self::from_path(path)?;
        let resolved = {
            let lexical_path = Path::new(&lexical.0);
            match (lexical_path.parent(), lexical_path.file_name()) {
                (Some(parent), Some(name)) => parent
                    .canonicalize()
                    .ok()
                    .map(|dir| dir.join(name).to_string_lossy().into_owned()),
                _ => None,
            }
        };
        Ok(resolved.map(Self).unwrap_or(lexical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Failed,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Success => f.pad("success"),
            ProcessingStatus::Failed => f.pad("failed"),
        }
    }
}

/// Outcome of the latest attempt for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub status: ProcessingStatus,
    /// UUID of the vCon built for the attempt
    pub record_id: String,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Last-attempt-wins map from file identity to processing outcome
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: BTreeMap<FileIdentity, ProcessingRecord>,
}

impl StateStore {
    /// Load the store from `path`.
    ///
    /// Never fails: a missing file starts empty, and an unreadable or malformed
    /// file is moved aside to `<path>.corrupt` and also starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match Self::load(&path) {
            Ok(Some(records)) => {
                log::info!(
                    "Loaded state for {} files from {}",
                    records.len(),
                    path.display()
                );
                records
            }
            Ok(None) => {
                log::info!("No state file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                log::error!(
                    "State file {} is unreadable, starting empty: {}",
                    path.display(),
                    e
                );
                Self::quarantine(&path);
                BTreeMap::new()
            }
        };

        Self { path, records }
    }

    fn load(path: &Path) -> Result<Option<BTreeMap<FileIdentity, ProcessingRecord>>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Keep the bad file for inspection instead of overwriting it on the next save.
    fn quarantine(path: &Path) {
        let mut target: OsString = path.as_os_str().to_owned();
        target.push(".corrupt");
        match std::fs::rename(path, &target) {
            Ok(()) => log::warn!("Moved corrupt state file to {}", Path::new(&target).display()),
            Err(e) => log::warn!("Could not move corrupt state file aside: {}", e),
        }
    }

    /// Backing file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff the last attempt for `identity` was delivered successfully
    pub fn is_processed(&self, identity: &FileIdentity) -> bool {
        matches!(
            self.records.get(identity),
            Some(ProcessingRecord {
                status: ProcessingStatus::Success,
                ..
            })
        )
    }

    pub fn get(&self, identity: &FileIdentity) -> Option<&ProcessingRecord> {
        self.records.get(identity)
    }

    /// Create or overwrite the record for `identity` and persist it.
    ///
    /// `detail` is only kept for failed attempts. On a persistence error the
    /// in-memory record is still updated and the error is returned.
    pub fn record(
        &mut self,
        identity: &FileIdentity,
        status: ProcessingStatus,
        record_id: &str,
        detail: Option<String>,
    ) -> Result<()> {
        let detail = match status {
            ProcessingStatus::Failed => detail,
            ProcessingStatus::Success => None,
        };
        self.records.insert(
            identity.clone(),
            ProcessingRecord {
                status,
                record_id: record_id.to_string(),
                processed_at: Utc::now(),
                detail,
            },
        );
        self.save()?;
        log::debug!("Marked {} as {}", identity, status);
        Ok(())
    }

    /// Drop the record for `identity` so the file becomes eligible again.
    ///
    /// Operator override only; the pipeline never calls this.
    pub fn forget(&mut self, identity: &FileIdentity) -> Result<bool> {
        if self.records.remove(identity).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Read-only view of every record
    pub fn all_records(&self) -> &BTreeMap<FileIdentity, ProcessingRecord> {
        &self.records
    }

    /// Records whose last attempt failed
    pub fn failed_records(&self) -> Vec<(&FileIdentity, &ProcessingRecord)> {
        self.records
            .iter()
            .filter(|(_, r)| r.status == ProcessingStatus::Failed)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| {
            FaxError::State(format!("cannot create state directory {}: {}", dir.display(), e))
        })?;

        let json = serde_json::to_vec_pretty(&self.records)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| {
            FaxError::State(format!("cannot create temp file in {}: {}", dir.display(), e))
        })?;
        temp.as_file_mut()
            .write_all(&json)
            .map_err(|e| FaxError::State(format!("cannot write temp state file: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| FaxError::State(format!("cannot sync temp state file: {}", e)))?;
        temp.persist(&self.path).map_err(|e| {
            FaxError::State(format!(
                "cannot replace state file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        // The rename is only durable once the directory entry is flushed
        #[cfg(unix)]
        {
            if let Err(e) = std::fs::File::open(&dir).and_then(|d| d.sync_all()) {
                log::warn!("Could not sync state directory {}: {}", dir.display(), e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn id(path: &str) -> FileIdentity {
        FileIdentity::from_path(Path::new(path)).unwrap()
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let store = StateStore::open(&state_path);
        assert!(store.is_empty());
        assert!(!state_path.exists());
    }

    #[test]
    fn test_open_corrupt_file_is_empty_and_moved_aside() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        fs::write(&state_path, "invalid json content").unwrap();

        let mut store = StateStore::open(&state_path);
        assert!(store.is_empty());
        assert!(!store.is_processed(&id("/fax/1_2.jpg")));
        assert!(temp_dir.path().join("state.json.corrupt").exists());

        store
            .record(&id("/fax/1_2.jpg"), ProcessingStatus::Success, "uuid-1", None)
            .unwrap();
        assert!(StateStore::open(&state_path).is_processed(&id("/fax/1_2.jpg")));
    }

    #[test]
    fn test_open_wrong_shape_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        fs::write(&state_path, r#"{"/a.jpg": {"status": "pending"}}"#).unwrap();
        assert!(StateStore::open(&state_path).is_empty());
    }

    #[test]
    fn test_is_processed_only_for_success() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = StateStore::open(temp_dir.path().join("state.json"));

        assert!(!store.is_processed(&id("/fax/new.jpg")));

        store
            .record(&id("/fax/ok.jpg"), ProcessingStatus::Success, "uuid-1", None)
            .unwrap();
        store
            .record(
                &id("/fax/bad.jpg"),
                ProcessingStatus::Failed,
                "uuid-2",
                Some("HTTP 503".to_string()),
            )
            .unwrap();

        assert!(store.is_processed(&id("/fax/ok.jpg")));
        assert!(!store.is_processed(&id("/fax/bad.jpg")));
        assert_eq!(store.failed_records().len(), 1);
    }

    #[test]
    fn test_record_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = StateStore::open(temp_dir.path().join("state.json"));
        let key = id("/fax/1_2.jpg");

        store
            .record(&key, ProcessingStatus::Failed, "uuid-1", Some("timeout".into()))
            .unwrap();
        store
            .record(&key, ProcessingStatus::Success, "uuid-2", Some("ignored".into()))
            .unwrap();

        assert_eq!(store.len(), 1);
        let record = store.get(&key).unwrap();
        assert_eq!(record.status, ProcessingStatus::Success);
        assert_eq!(record.record_id, "uuid-2");
        assert_eq!(record.detail, None);
    }

    #[test]
    fn test_round_trip_preserves_records() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("nested/dir/state.json");
        let mut store = StateStore::open(&state_path);

        for i in 0..5 {
            let (status, detail) = if i % 2 == 0 {
                (ProcessingStatus::Success, None)
            } else {
                (ProcessingStatus::Failed, Some(format!("HTTP 50{}", i)))
            };
            store
                .record(&id(&format!("/fax/{}_9.jpg", i)), status, &format!("uuid-{}", i), detail)
                .unwrap();
        }

        let reloaded = StateStore::open(&state_path);
        assert_eq!(reloaded.len(), 5);
        assert_eq!(reloaded.all_records(), store.all_records());
    }

    #[test]
    fn test_persisted_layout() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut store = StateStore::open(&state_path);
        store
            .record(&id("/fax/a.jpg"), ProcessingStatus::Failed, "uuid-a", Some("HTTP 503".into()))
            .unwrap();
        store
            .record(&id("/fax/b.jpg"), ProcessingStatus::Success, "uuid-b", None)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&state_path).unwrap()).unwrap();
        let a = &value[id("/fax/a.jpg").as_str()];
        assert_eq!(a["status"], "failed");
        assert_eq!(a["record_id"], "uuid-a");
        assert_eq!(a["detail"], "HTTP 503");
        assert!(a["processed_at"].is_string());
        let b = &value[id("/fax/b.jpg").as_str()];
        assert_eq!(b["status"], "success");
        assert!(b.get("detail").is_none());
    }

    #[test]
    fn test_save_error_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        // Parent is a regular file, so neither load nor save can touch the path
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let state_path = blocker.join("state.json");

        let mut store = StateStore::open(&state_path);
        let result = store.record(&id("/fax/1_2.jpg"), ProcessingStatus::Success, "uuid-1", None);

        assert!(matches!(result, Err(FaxError::State(_))));
        assert!(store.is_processed(&id("/fax/1_2.jpg")));
    }

    #[test]
    fn test_forget() {
        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut store = StateStore::open(&state_path);
        let key = id("/fax/1_2.jpg");
        store.record(&key, ProcessingStatus::Success, "uuid-1", None).unwrap();

        assert!(store.forget(&key).unwrap());
        assert!(!store.forget(&key).unwrap());
        assert!(!StateStore::open(&state_path).is_processed(&key));
    }

    #[test]
    fn test_identity_normalization() {
        assert_eq!(id("/fax/./in/../1_2.jpg"), id("/fax/1_2.jpg"));
        assert!(Path::new(id("relative/1_2.jpg").as_str()).is_absolute());
        assert_eq!(id("/fax/1_2.jpg").to_string(), id("/fax/1_2.jpg").as_str());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_follows_symlinked_directory() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real");
        fs::create_dir_all(&real).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let canonical =
            FileIdentity::from_path(&real.canonicalize().unwrap().join("1_2.png")).unwrap();

        // Same key whether or not the file exists
        assert_eq!(FileIdentity::resolve(&link.join("1_2.png")).unwrap(), canonical);
        fs::write(real.join("1_2.png"), b"x").unwrap();
        assert_eq!(FileIdentity::resolve(&link.join("1_2.png")).unwrap(), canonical);
        assert_eq!(FileIdentity::resolve(&link.join("sub/../1_2.png")).unwrap(), canonical);
    }

    #[test]
    fn test_resolve_missing_parent_is_lexical() {
        let key = FileIdentity::resolve(Path::new("/no/such/dir/./1_2.jpg")).unwrap();
        assert_eq!(key, id("/no/such/dir/1_2.jpg"));
    }
}
