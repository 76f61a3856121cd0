/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Whole-state persistence backends.
//!
//! Backends are synchronous; the store actor runs them on the blocking pool so
//! every load and save is an await point for the rest of the runtime.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use redb::{ReadableDatabase, ReadableTable};

use crate::errors::StorageError;
use crate::model::{StoreState, now_millis};

const STORE_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("store");
const UNREADABLE_TABLE: redb::TableDefinition<&str, &[u8]> =
    redb::TableDefinition::new("store_unreadable");
const STATE_KEY: &str = "state";
const DATABASE_FILE: &str = "navtrail.redb";

pub trait StateStorage: Send + Sync + 'static {
    /// Last saved state, or `None` when nothing has been written yet.
    fn load(&self) -> Result<Option<StoreState>, StorageError>;

    /// Replace the saved state. Either the whole state lands or none of it.
    fn save(&self, state: &StoreState) -> Result<(), StorageError>;

    /// Move a saved record that no longer decodes out of the way, keeping
    /// its bytes, so the next `save` cannot overwrite it.
    fn set_aside_unreadable(&self) -> Result<(), StorageError>;
}

fn encode(state: &StoreState) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(state).map_err(|e| StorageError::Encoding(format!("{e}")))
}

fn decode(bytes: &[u8]) -> Result<StoreState, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Encoding(format!("{e}")))
}

/// Store state kept in a single redb table row.
pub struct RedbStateStorage {
    db: redb::Database,
    path: PathBuf,
}

impl RedbStateStorage {
    /// Open or create the database inside `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| StorageError::Io(format!("Failed to create dir: {e}")))?;
        let path = base_dir.join(DATABASE_FILE);
        let db = redb::Database::create(&path).map_err(|e| StorageError::Redb(format!("{e}")))?;
        log::info!("storage: opened {}", path.display());
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStorage for RedbStateStorage {
    fn load(&self) -> Result<Option<StoreState>, StorageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        let table = match read_txn.open_table(STORE_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StorageError::Redb(format!("{e}"))),
        };
        let Some(entry) = table
            .get(STATE_KEY)
            .map_err(|e| StorageError::Redb(format!("{e}")))?
        else {
            return Ok(None);
        };
        decode(entry.value()).map(Some)
    }

    fn save(&self, state: &StoreState) -> Result<(), StorageError> {
        let bytes = encode(state)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(STORE_TABLE)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            table
                .insert(STATE_KEY, bytes.as_slice())
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        Ok(())
    }

    fn set_aside_unreadable(&self) -> Result<(), StorageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        let moved = {
            let mut table = write_txn
                .open_table(STORE_TABLE)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            let removed = table
                .remove(STATE_KEY)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            removed.map(|guard| guard.value().to_vec())
        };
        let Some(bytes) = moved else {
            return Ok(());
        };
        let key = format!("{STATE_KEY}-{}", now_millis());
        {
            let mut aside = write_txn
                .open_table(UNREADABLE_TABLE)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            aside
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        log::warn!("storage: unreadable state kept under {key}");
        Ok(())
    }
}

/// In-process backend with switchable read and write failures and an
/// artificial write delay.
#[derive(Default)]
pub struct MemoryStateStorage {
    bytes: Mutex<Option<Vec<u8>>>,
    unreadable: Mutex<Vec<Vec<u8>>>,
    fail_next_load: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: Mutex<Duration>,
    writes: AtomicUsize,
}

impl MemoryStateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend as if `state` had been saved by an earlier run.
    pub fn with_state(state: &StoreState) -> Result<Self, StorageError> {
        let storage = Self::new();
        *storage.bytes.lock() = Some(encode(state)?);
        Ok(storage)
    }

    /// Seed the backend with an arbitrary saved record.
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        let storage = Self::new();
        *storage.bytes.lock() = Some(bytes);
        storage
    }

    /// Make the next `load` fail once with an I/O error.
    pub fn set_fail_next_load(&self, fail: bool) {
        self.fail_next_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    /// Number of successful saves.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Decoded copy of whatever was last saved.
    pub fn saved(&self) -> Option<StoreState> {
        let bytes = self.bytes.lock();
        bytes.as_deref().and_then(|b| decode(b).ok())
    }

    /// Records moved aside by `set_aside_unreadable`, oldest first.
    pub fn unreadable(&self) -> Vec<Vec<u8>> {
        self.unreadable.lock().clone()
    }
}

impl StateStorage for MemoryStateStorage {
    fn load(&self) -> Result<Option<StoreState>, StorageError> {
        if self.fail_next_load.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Io("injected read failure".to_string()));
        }
        match self.bytes.lock().as_deref() {
            Some(bytes) => decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, state: &StoreState) -> Result<(), StorageError> {
        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io("injected write failure".to_string()));
        }
        *self.bytes.lock() = Some(encode(state)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_aside_unreadable(&self) -> Result<(), StorageError> {
        if let Some(bytes) = self.bytes.lock().take() {
            self.unreadable.lock().push(bytes);
        }
        Ok(())
    }
}
