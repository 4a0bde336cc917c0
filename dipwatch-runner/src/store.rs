//! Work-key sets: the admitted set and the journal of finalized keys.
//!
//! Both are flat JSON arrays of `[identifier, reference]` pairs on disk. Each
//! mutation rewrites the whole file under the set's lock: write to `.tmp`,
//! then rename into place, so readers never observe a torn file.

use dipwatch_core::WorkKey;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A set of WorkKeys with atomic check-and-insert.
pub trait WorkSet: Send + Sync {
    fn contains(&self, key: &WorkKey) -> bool;

    /// Insert `key`. `Ok(true)` only if it was not already present.
    fn add(&self, key: WorkKey) -> Result<bool, StoreError>;

    /// Members in insertion order.
    fn snapshot(&self) -> Vec<WorkKey>;

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct Members {
    order: Vec<WorkKey>,
    index: HashSet<WorkKey>,
}

impl Members {
    fn from_keys(keys: Vec<WorkKey>) -> Self {
        let mut members = Self::default();
        for key in keys {
            members.insert(key);
        }
        members
    }

    fn insert(&mut self, key: WorkKey) -> bool {
        if !self.index.insert(key.clone()) {
            return false;
        }
        self.order.push(key);
        true
    }

    fn rollback(&mut self, key: &WorkKey) {
        self.index.remove(key);
        if self.order.last() == Some(key) {
            self.order.pop();
        }
    }
}

fn lock(members: &Mutex<Members>) -> MutexGuard<'_, Members> {
    members.lock().unwrap_or_else(|e| e.into_inner())
}

// ── In-memory ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySet {
    members: Mutex<Members>,
}

impl MemorySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set seeded with `keys`, duplicates dropped.
    pub fn with_keys(keys: impl IntoIterator<Item = WorkKey>) -> Self {
        Self {
            members: Mutex::new(Members::from_keys(keys.into_iter().collect())),
        }
    }
}

impl WorkSet for MemorySet {
    fn contains(&self, key: &WorkKey) -> bool {
        lock(&self.members).index.contains(key)
    }

    fn add(&self, key: WorkKey) -> Result<bool, StoreError> {
        Ok(lock(&self.members).insert(key))
    }

    fn snapshot(&self) -> Vec<WorkKey> {
        lock(&self.members).order.clone()
    }

    fn len(&self) -> usize {
        lock(&self.members).order.len()
    }
}

// ── File-backed ──────────────────────────────────────────────────────

/// JSON-file-backed set, fully rewritten on every insertion.
#[derive(Debug)]
pub struct FileSet {
    path: PathBuf,
    members: Mutex<Members>,
}

impl FileSet {
    /// Open the set at `path`.
    ///
    /// A missing file is an empty set. A file that does not decode is renamed
    /// to `<name>.corrupt` and the set starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let keys = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<WorkKey>>(&content) {
                Ok(keys) => keys,
                Err(e) => {
                    let quarantine = sibling(&path, ".corrupt");
                    tracing::warn!(
                        path = %path.display(),
                        quarantine = %quarantine.display(),
                        error = %e,
                        "quarantining corrupt state file"
                    );
                    fs::rename(&path, &quarantine).map_err(|source| StoreError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let members = Members::from_keys(keys);
        tracing::debug!(path = %path.display(), keys = members.order.len(), "state file loaded");
        Ok(Self {
            path,
            members: Mutex::new(members),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, keys: &[WorkKey]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_vec(keys).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = sibling(&self.path, ".tmp");
        fs::write(&tmp_path, json).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }
}

impl WorkSet for FileSet {
    fn contains(&self, key: &WorkKey) -> bool {
        lock(&self.members).index.contains(key)
    }

    fn add(&self, key: WorkKey) -> Result<bool, StoreError> {
        let mut members = lock(&self.members);
        if !members.insert(key.clone()) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&members.order) {
            members.rollback(&key);
            return Err(e);
        }
        Ok(true)
    }

    fn snapshot(&self) -> Vec<WorkKey> {
        lock(&self.members).order.clone()
    }

    fn len(&self) -> usize {
        lock(&self.members).order.len()
    }
}

/// `path` with `suffix` appended to the file name (`journal.json` → `journal.json.tmp`).
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
