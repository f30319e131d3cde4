//! Table layer: keyed byte-string tables with an atomic multi-table commit.
//!
//! - `DiskTable`: a committed table decoded from its checksummed file
//! - `BufferedTable`: in-memory write overlay over a committed table
//! - `Manifest`: the committed-revision record, swapped atomically
//! - `DiskTableSet` / `BufferedTableSet`: the read-only and writable
//!   six-table managers
//! - `SessionLock`: directory-level single-writer lock
//! - `ModificationLog`: optional crc-framed access log

pub mod codec;

mod buffered;
mod disk;
mod lock;
mod log;
mod manager;
mod manifest;

pub use buffered::BufferedTable;
pub use disk::{DiskTable, RevisionGuard};
pub use lock::{SessionLock, LOCK_FILE};
pub use log::ModificationLog;
pub use manager::{BufferedTableSet, DiskTableSet, TABLE_NAMES};
pub use manifest::{Manifest, MANIFEST_FILE, MANIFEST_TMP_FILE};

use crate::error::Result;

/// Read access to one keyed table.
pub trait Table {
    /// Look up the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Write access to one keyed table. Only buffered tables are mutable; the
/// writes land in the in-memory overlay until the table set's `apply`.
pub trait MutableTable: Table {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;
}
