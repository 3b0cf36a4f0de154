//! Durable client-side storage with named JSON slots.
//!
//! Session and cart state are each persisted under a distinct slot. The
//! [`Storage`] trait keeps the stores testable; production uses
//! [`FileStorage`], tests use [`MemoryStorage`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;

/// Errors raised by a storage backend.
///
/// Decode failures are not represented here: the stores treat undecodable
/// slot contents as absent state rather than a fatal startup error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A durable key-value store of named slots holding serialized JSON.
pub trait Storage: Send + Sync + 'static {
    /// Read a slot's contents, `None` if the slot has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn read(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Write a slot's contents, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError>;

    /// Remove a slot entirely. Removing an absent slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn remove(&self, slot: &str) -> Result<(), StorageError>;
}

// =============================================================================
// FileStorage
// =============================================================================

/// File-per-slot storage rooted at a state directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `dir`. The directory is created
    /// lazily on first write.
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(slot)
    }
}

impl Storage for FileStorage {
    fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.slot_path(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash mid-write never leaves a torn slot
        let tmp = self.slot_path(&format!("{slot}.tmp"));
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, self.slot_path(slot))?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.slot_path(slot)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-memory storage for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .slots
            .read()
            .expect("storage lock poisoned")
            .get(slot)
            .cloned())
    }

    fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError> {
        self.slots
            .write()
            .expect("storage lock poisoned")
            .insert(slot.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), StorageError> {
        self.slots
            .write()
            .expect("storage lock poisoned")
            .remove(slot);
        Ok(())
    }
}
