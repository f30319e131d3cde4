//! The two table-set variants behind the database facades.
//!
//! - `DiskTableSet`: read-only view of the committed snapshot, with a
//!   `reopen_because_overwritten` hook for the reader retry protocol.
//! - `BufferedTableSet`: the single writer's view, layering an in-memory
//!   write buffer over every table and committing all six atomically.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::buffered::BufferedTable;
use super::disk::{DiskTable, RevisionGuard};
use super::log::ModificationLog;
use super::manifest::{sync_dir, Manifest, MANIFEST_TMP_FILE};
use crate::config::DatabaseConfig;
use crate::error::{Result, ShaleError};

/// The six tables of a database, in commit order.
pub const TABLE_NAMES: [&str; 6] = [
    "record",
    "attribute",
    "termlist",
    "lexicon",
    "postlist",
    "position",
];

fn table_file(dir: &Path, name: &str, revision: u64) -> PathBuf {
    dir.join(format!("{}.{}.tbl", name, revision))
}

/// Read-only table set over a committed on-disk snapshot.
#[derive(Debug)]
pub struct DiskTableSet {
    dir: PathBuf,
    manifest: Manifest,
    pub record: DiskTable,
    pub attribute: DiskTable,
    pub termlist: DiskTable,
    pub lexicon: DiskTable,
    pub postlist: DiskTable,
    pub position: DiskTable,
    log: ModificationLog,
}

impl DiskTableSet {
    /// Open the committed snapshot in `config.dir`.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let log = ModificationLog::open(config.resolved_logfile().as_deref())?;
        let set = Self::load(config.dir.clone(), log)?;
        set.log.record("open read-only");
        Ok(set)
    }

    /// Refresh every table handle to the currently committed revision.
    /// Used when a reader detects that its snapshot was replaced.
    pub fn reopen_because_overwritten(&mut self) -> Result<()> {
        let fresh = Self::load(self.dir.clone(), ModificationLog::disabled())?;
        self.manifest = fresh.manifest;
        self.record = fresh.record;
        self.attribute = fresh.attribute;
        self.termlist = fresh.termlist;
        self.lexicon = fresh.lexicon;
        self.postlist = fresh.postlist;
        self.position = fresh.position;
        self.log.record(&format!("reopen revision={}", self.manifest.revision));
        tracing::debug!(revision = self.manifest.revision, "reopened overwritten tables");
        Ok(())
    }

    pub fn revision(&self) -> u64 {
        self.manifest.revision
    }

    fn load(dir: PathBuf, log: ModificationLog) -> Result<Self> {
        // A writer may commit (and remove the old revision's files) between
        // our manifest read and the table opens; retry against the fresh
        // manifest when that race loses.
        let mut attempts_left = 5;
        loop {
            let manifest = Manifest::load(&dir)?;
            match Self::load_at(&dir, &manifest) {
                Ok(tables) => {
                    let [record, attribute, termlist, lexicon, postlist, position] = tables;
                    return Ok(Self {
                        dir,
                        manifest,
                        record,
                        attribute,
                        termlist,
                        lexicon,
                        postlist,
                        position,
                        log,
                    });
                }
                Err(err) => {
                    let raced = Manifest::load(&dir)
                        .map(|current| current.revision != manifest.revision)
                        .unwrap_or(false);
                    if raced && attempts_left > 0 {
                        attempts_left -= 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn load_at(dir: &Path, manifest: &Manifest) -> Result<[DiskTable; 6]> {
        let guard = Arc::new(RevisionGuard::new(dir, manifest.revision));
        let mut tables = Vec::with_capacity(TABLE_NAMES.len());
        for name in TABLE_NAMES {
            let path = table_file(dir, name, manifest.revision);
            tables.push(DiskTable::open(&path, Some(Arc::clone(&guard)))?);
        }
        tables
            .try_into()
            .map_err(|_| ShaleError::Internal("table set arity mismatch".to_string()))
    }
}

/// Writable table set: every table wrapped with an in-memory write buffer,
/// committed across all six tables at once by `apply`.
#[derive(Debug)]
pub struct BufferedTableSet {
    dir: PathBuf,
    manifest: Manifest,
    pub record: BufferedTable,
    pub attribute: BufferedTable,
    pub termlist: BufferedTable,
    pub lexicon: BufferedTable,
    pub postlist: BufferedTable,
    pub position: BufferedTable,
    log: ModificationLog,
}

impl BufferedTableSet {
    /// Open `config.dir` for writing, creating an empty database when the
    /// directory holds none, and applying the recovery policy when a
    /// previous writer crashed mid-commit.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        let log = ModificationLog::open(config.resolved_logfile().as_deref())?;

        let manifest = if Manifest::exists(&config.dir) {
            let manifest = Manifest::load(&config.dir)?;
            recover_crash_residue(&config.dir, &manifest, config.perform_recovery, &log)?;
            manifest
        } else {
            if has_table_files(&config.dir)? {
                return Err(ShaleError::DatabaseCorrupt(
                    "table files present but manifest missing".to_string(),
                ));
            }
            config.validate()?;
            create_empty_database(&config.dir, config.block_size)?
        };

        let mut tables = Vec::with_capacity(TABLE_NAMES.len());
        for name in TABLE_NAMES {
            let path = table_file(&config.dir, name, manifest.revision);
            // The writer holds the only mutable view, so its base tables
            // need no revision guard.
            tables.push(BufferedTable::new(DiskTable::open(&path, None)?));
        }
        let [record, attribute, termlist, lexicon, postlist, position]: [BufferedTable; 6] =
            tables
                .try_into()
                .map_err(|_| ShaleError::Internal("table set arity mismatch".to_string()))?;

        log.record(&format!("open writable revision={}", manifest.revision));
        Ok(Self {
            dir: config.dir.clone(),
            manifest,
            record,
            attribute,
            termlist,
            lexicon,
            postlist,
            position,
            log,
        })
    }

    pub fn revision(&self) -> u64 {
        self.manifest.revision
    }

    /// Whether any table holds uncommitted writes.
    pub fn is_dirty(&self) -> bool {
        self.tables().iter().any(|(_, table)| table.is_dirty())
    }

    /// Atomically commit all buffered writes across the six tables.
    ///
    /// A clean buffer is a no-op, so repeated flushes leave the on-disk
    /// state untouched. On error the buffer is left intact for the caller
    /// to `cancel`; partially-written files of the aborted revision are
    /// crash residue handled by the recovery policy at next open.
    pub fn apply(&mut self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let old_revision = self.manifest.revision;
        let new_revision = old_revision + 1;
        let block_size = self.manifest.block_size;

        let mut merged: Vec<(&'static str, BTreeMap<Vec<u8>, Vec<u8>>)> = Vec::new();
        for (name, table) in self.tables() {
            merged.push((name, table.merged_entries()));
        }

        for (name, entries) in &merged {
            let path = table_file(&self.dir, name, new_revision);
            DiskTable::write_file(&path, entries, block_size)?;
        }

        let mut manifest = self.manifest.clone();
        manifest.revision = new_revision;
        manifest.store(&self.dir)?;

        // The rename above is the commit point; everything after is
        // in-memory promotion and best-effort cleanup.
        self.manifest = manifest;
        let mut merged = merged.into_iter();
        for (_, table) in self.tables_mut() {
            if let Some((_, entries)) = merged.next() {
                table.promote(entries);
            }
        }
        for name in TABLE_NAMES {
            let _ = fs::remove_file(table_file(&self.dir, name, old_revision));
        }

        self.log.record(&format!("commit revision={}", new_revision));
        tracing::debug!(revision = new_revision, "applied buffered modifications");
        Ok(())
    }

    /// Discard every buffered write across all six tables. Idempotent.
    pub fn cancel(&mut self) {
        let was_dirty = self.is_dirty();
        for (_, table) in self.tables_mut() {
            table.cancel();
        }
        if was_dirty {
            self.log.record("cancel");
            tracing::debug!("cancelled buffered modifications");
        }
    }

    pub fn log(&self) -> &ModificationLog {
        &self.log
    }

    fn tables(&self) -> [(&'static str, &BufferedTable); 6] {
        [
            ("record", &self.record),
            ("attribute", &self.attribute),
            ("termlist", &self.termlist),
            ("lexicon", &self.lexicon),
            ("postlist", &self.postlist),
            ("position", &self.position),
        ]
    }

    fn tables_mut(&mut self) -> [(&'static str, &mut BufferedTable); 6] {
        [
            ("record", &mut self.record),
            ("attribute", &mut self.attribute),
            ("termlist", &mut self.termlist),
            ("lexicon", &mut self.lexicon),
            ("postlist", &mut self.postlist),
            ("position", &mut self.position),
        ]
    }
}

fn has_table_files(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".tbl") {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn create_empty_database(dir: &Path, block_size: u32) -> Result<Manifest> {
    let empty = BTreeMap::new();
    for name in TABLE_NAMES {
        DiskTable::write_file(&table_file(dir, name, 1), &empty, block_size)?;
    }
    let manifest = Manifest::new(block_size);
    manifest.store(dir)?;
    tracing::debug!(dir = %dir.display(), block_size, "created empty database");
    Ok(manifest)
}

/// Find table files left behind by a writer that crashed between writing
/// new revision files and the manifest rename, plus any staged manifest.
fn crash_residue(dir: &Path, manifest: &Manifest) -> Result<Vec<PathBuf>> {
    let mut residue = Vec::new();

    let tmp_manifest = dir.join(MANIFEST_TMP_FILE);
    if tmp_manifest.is_file() {
        residue.push(tmp_manifest);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 3 || parts[2] != "tbl" {
            continue;
        }
        if !TABLE_NAMES.contains(&parts[0]) {
            continue;
        }
        match parts[1].parse::<u64>() {
            Ok(revision) if revision == manifest.revision => {}
            _ => residue.push(entry.path()),
        }
    }
    Ok(residue)
}

fn recover_crash_residue(
    dir: &Path,
    manifest: &Manifest,
    perform_recovery: bool,
    log: &ModificationLog,
) -> Result<()> {
    let residue = crash_residue(dir, manifest)?;
    if residue.is_empty() {
        return Ok(());
    }
    if !perform_recovery {
        return Err(ShaleError::NeedsRecovery);
    }

    for path in &residue {
        fs::remove_file(path)?;
    }
    sync_dir(dir)?;
    log.record(&format!("recover discarded={}", residue.len()));
    tracing::warn!(
        discarded = residue.len(),
        "recovered database by discarding partially-applied modifications"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{MutableTable, Table};
    use tempfile::TempDir;

    fn config(dir: &Path) -> DatabaseConfig {
        DatabaseConfig::new(dir)
    }

    #[test]
    fn test_create_open_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BufferedTableSet::open(&config(tmp.path())).unwrap();
        assert_eq!(writer.revision(), 1);

        writer
            .lexicon
            .put(b"cat".to_vec(), b"\x81".to_vec())
            .unwrap();
        assert!(writer.is_dirty());
        writer.apply().unwrap();
        assert!(!writer.is_dirty());
        assert_eq!(writer.revision(), 2);

        let reader = DiskTableSet::open(&config(tmp.path())).unwrap();
        assert_eq!(reader.revision(), 2);
        assert_eq!(reader.lexicon.get(b"cat").unwrap(), Some(b"\x81".to_vec()));
    }

    #[test]
    fn test_apply_without_changes_is_noop() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BufferedTableSet::open(&config(tmp.path())).unwrap();
        writer.apply().unwrap();
        writer.apply().unwrap();
        assert_eq!(writer.revision(), 1);
    }

    #[test]
    fn test_cancel_discards_everything() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BufferedTableSet::open(&config(tmp.path())).unwrap();

        writer.record.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        writer.lexicon.put(b"t".to_vec(), b"f".to_vec()).unwrap();
        writer.cancel();
        assert!(!writer.is_dirty());
        assert_eq!(writer.record.get(b"k").unwrap(), None);

        writer.apply().unwrap();
        assert_eq!(writer.revision(), 1);
    }

    #[test]
    fn test_reader_sees_old_snapshot_until_reopen() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BufferedTableSet::open(&config(tmp.path())).unwrap();
        writer.apply().unwrap();

        let mut reader = DiskTableSet::open(&config(tmp.path())).unwrap();
        assert_eq!(reader.lexicon.get(b"cat").unwrap(), None);

        writer
            .lexicon
            .put(b"cat".to_vec(), b"\x81".to_vec())
            .unwrap();
        writer.apply().unwrap();

        match reader.lexicon.get(b"cat") {
            Err(ShaleError::DatabaseModified) => {}
            other => panic!("expected DatabaseModified, got {:?}", other),
        }

        reader.reopen_because_overwritten().unwrap();
        assert_eq!(reader.lexicon.get(b"cat").unwrap(), Some(b"\x81".to_vec()));
    }

    #[test]
    fn test_crash_residue_needs_recovery() {
        let tmp = TempDir::new().unwrap();
        {
            let mut writer = BufferedTableSet::open(&config(tmp.path())).unwrap();
            writer.record.put(b"k".to_vec(), b"v".to_vec()).unwrap();
            writer.apply().unwrap();
        }

        // Simulate a crash between table writes and the manifest rename.
        let orphan = table_file(tmp.path(), "record", 9);
        DiskTable::write_file(&orphan, &BTreeMap::new(), 8192).unwrap();

        match BufferedTableSet::open(&config(tmp.path())) {
            Err(ShaleError::NeedsRecovery) => {}
            other => panic!("expected NeedsRecovery, got {:?}", other.map(|_| ())),
        }

        let writer =
            BufferedTableSet::open(&config(tmp.path()).perform_recovery(true)).unwrap();
        assert!(!orphan.exists());
        assert_eq!(writer.revision(), 2);
    }

    #[test]
    fn test_block_size_ignored_for_existing_database() {
        let tmp = TempDir::new().unwrap();
        BufferedTableSet::open(&config(tmp.path()).block_size(4096)).unwrap();

        // Invalid block size, but the database exists so it is ignored.
        let writer = BufferedTableSet::open(&config(tmp.path()).block_size(1)).unwrap();
        assert_eq!(writer.manifest.block_size, 4096);
    }

    #[test]
    fn test_invalid_block_size_rejected_at_create() {
        let tmp = TempDir::new().unwrap();
        assert!(BufferedTableSet::open(&config(tmp.path()).block_size(1000)).is_err());
    }
}
