//! On-disk table files.
//!
//! Each table is one file per revision, `<name>.<revision>.tbl`, holding
//! length-prefixed key/value pairs in key order behind a checksummed
//! header. The whole table is decoded into an ordered map at open; a
//! `RevisionGuard` shared by every table of a read-only snapshot turns a
//! concurrent overwrite into `DatabaseModified` at the next read.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crc32fast::Hasher;

use super::codec::{decode_bytes, decode_vbyte, encode_bytes, encode_vbyte};
use super::manifest::Manifest;
use super::Table;
use crate::error::{Result, ShaleError};

const TABLE_MAGIC: &[u8; 4] = b"SHTB";
const TABLE_FORMAT_VERSION: u32 = 1;

/// Detects a reader's snapshot being replaced by a concurrent writer.
///
/// Every table of one opened snapshot shares a guard carrying the revision
/// the snapshot was opened at. Reads compare it against the revision the
/// manifest holds now; a mismatch means the table files this snapshot was
/// decoded from are no longer the committed state.
#[derive(Debug)]
pub struct RevisionGuard {
    dir: PathBuf,
    revision: u64,
}

impl RevisionGuard {
    pub fn new(dir: impl Into<PathBuf>, revision: u64) -> Self {
        Self {
            dir: dir.into(),
            revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Fail with `DatabaseModified` if the committed revision has moved on.
    pub fn check(&self) -> Result<()> {
        let current = Manifest::load(&self.dir)?;
        if current.revision != self.revision {
            return Err(ShaleError::DatabaseModified);
        }
        Ok(())
    }
}

/// A read-only table decoded from its revision file.
#[derive(Debug)]
pub struct DiskTable {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    guard: Option<Arc<RevisionGuard>>,
}

impl DiskTable {
    /// Open and fully decode a table file. `guard` is shared by all tables
    /// of a read-only snapshot; buffered base tables pass `None` (the
    /// single writer cannot be overwritten underneath itself).
    pub fn open(path: &Path, guard: Option<Arc<RevisionGuard>>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let header_len = TABLE_MAGIC.len() + 4;
        if contents.len() < header_len + 4 {
            return Err(corrupt(path, "file truncated"));
        }
        if &contents[..4] != TABLE_MAGIC {
            return Err(corrupt(path, "wrong magic"));
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&contents[4..8]);
        if u32::from_le_bytes(version_bytes) != TABLE_FORMAT_VERSION {
            return Err(corrupt(path, "unsupported format version"));
        }

        let payload = &contents[header_len..contents.len() - 4];
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&contents[contents.len() - 4..]);
        let mut hasher = Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
            return Err(corrupt(path, "checksum mismatch"));
        }

        let mut pos = 0;
        let count = decode_vbyte(payload, &mut pos).map_err(|_| corrupt(path, "bad entry count"))?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key = decode_bytes(payload, &mut pos).map_err(|_| corrupt(path, "bad key"))?;
            let value = decode_bytes(payload, &mut pos).map_err(|_| corrupt(path, "bad value"))?;
            entries.insert(key, value);
        }
        if pos != payload.len() {
            return Err(corrupt(path, "trailing bytes after entries"));
        }

        Ok(Self { entries, guard })
    }

    /// An empty table (a freshly-created database before its first commit).
    pub fn empty(guard: Option<Arc<RevisionGuard>>) -> Self {
        Self {
            entries: BTreeMap::new(),
            guard,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.entries
    }

    pub(crate) fn replace_entries(&mut self, entries: BTreeMap<Vec<u8>, Vec<u8>>) {
        self.entries = entries;
    }

    /// Write a table file for the given entries. `block_size` sizes the
    /// write buffer. The file is fsynced before returning.
    pub fn write_file(
        path: &Path,
        entries: &BTreeMap<Vec<u8>, Vec<u8>>,
        block_size: u32,
    ) -> Result<()> {
        let mut payload = Vec::new();
        encode_vbyte(entries.len() as u64, &mut payload);
        for (key, value) in entries {
            encode_bytes(key, &mut payload);
            encode_bytes(value, &mut payload);
        }
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::with_capacity(block_size as usize, file);
        writer.write_all(TABLE_MAGIC)?;
        writer.write_all(&TABLE_FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn check_guard(&self) -> Result<()> {
        match &self.guard {
            Some(guard) => guard.check(),
            None => Ok(()),
        }
    }
}

impl Table for DiskTable {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_guard()?;
        Ok(self.entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_guard()?;
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

fn corrupt(path: &Path, what: &str) -> ShaleError {
    ShaleError::DatabaseCorrupt(format!("table file {}: {}", path.display(), what))
}
