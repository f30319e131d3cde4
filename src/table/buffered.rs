//! In-memory write overlay over a committed table.
//!
//! Reads through the overlay see buffered writes; `cancel` drops the
//! overlay without touching the base. The overlay is merged into a new
//! table file by the table set's `apply`.

use std::collections::BTreeMap;

use super::disk::DiskTable;
use super::{MutableTable, Table};
use crate::error::Result;

/// A table with an uncommitted in-memory write buffer layered on top.
///
/// `None` in the overlay is a pending delete of the base entry.
#[derive(Debug)]
pub struct BufferedTable {
    base: DiskTable,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl BufferedTable {
    pub fn new(base: DiskTable) -> Self {
        Self {
            base,
            overlay: BTreeMap::new(),
        }
    }

    /// Whether any uncommitted writes are buffered.
    pub fn is_dirty(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// Discard all buffered writes. Idempotent.
    pub fn cancel(&mut self) {
        self.overlay.clear();
    }

    /// The base merged with the overlay: the entries a commit would persist.
    pub fn merged_entries(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let mut merged = self.base.entries().clone();
        for (key, value) in &self.overlay {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged
    }

    /// Install a freshly-committed base and drop the overlay.
    pub fn promote(&mut self, entries: BTreeMap<Vec<u8>, Vec<u8>>) {
        self.base.replace_entries(entries);
        self.overlay.clear();
    }
}

impl Table for BufferedTable {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.overlay.get(key) {
            Some(Some(value)) => Ok(Some(value.clone())),
            Some(None) => Ok(None),
            None => self.base.get(key),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.scan_prefix(prefix)?.into_iter().collect();
        for (key, value) in self
            .overlay
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl MutableTable for BufferedTable {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.overlay.insert(key, Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.overlay.insert(key.to_vec(), None);
        Ok(())
    }
}
