//! Durable backends for the progress document.
//!
//! A backend stores one opaque JSON string per learner. The store above it
//! handles serialization, read-back verification and retries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read progress at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write progress at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Storage backend rejected the write: {0}")]
    Rejected(String),
}

/// Where a learner's progress document lives.
pub trait ProgressStorage: Send {
    /// Returns the stored document, or `None` if nothing was ever written.
    fn read(&self) -> Result<Option<String>, StorageError>;

    /// Overwrites the stored document.
    fn write(&mut self, contents: &str) -> Result<(), StorageError>;
}

/// Keeps the document in a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressStorage for FileStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&mut self, contents: &str) -> Result<(), StorageError> {
        let wrap = |source| StorageError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        // Write beside the target and rename so a crash never leaves half a document.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, contents).map_err(wrap)?;
        fs::rename(&staging, &self.path).map_err(wrap)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    contents: Option<String>,
    failing_writes: u32,
    dropped_writes: u32,
    attempted_writes: u32,
}

/// An in-process backend. Clones share the same document, so a test can keep
/// a handle after moving one into the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing document.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        let storage = Self::default();
        storage.lock().contents = Some(contents.into());
        storage
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `n` writes fail with `StorageError::Rejected`.
    pub fn fail_next_writes(&self, n: u32) {
        self.lock().failing_writes = n;
    }

    /// Makes the next `n` writes report success without storing anything.
    pub fn drop_next_writes(&self, n: u32) {
        self.lock().dropped_writes = n;
    }

    /// Number of writes attempted so far, failed ones included.
    pub fn attempted_writes(&self) -> u32 {
        self.lock().attempted_writes
    }

    pub fn contents(&self) -> Option<String> {
        self.lock().contents.clone()
    }
}

impl ProgressStorage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.lock().contents.clone())
    }

    fn write(&mut self, contents: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.attempted_writes += 1;
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(StorageError::Rejected("injected write failure".to_string()));
        }
        if inner.dropped_writes > 0 {
            inner.dropped_writes -= 1;
            return Ok(());
        }
        inner.contents = Some(contents.to_string());
        Ok(())
    }
}
