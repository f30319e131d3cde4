//! Database manifest: the single source of truth for the committed revision.
//!
//! Commit atomicity:
//! 1. Write new table files at the next revision → fsync each
//! 2. Write `manifest.tmp` → fsync
//! 3. Atomic rename to `manifest` → fsync directory
//! 4. Only then remove the previous revision's table files

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShaleError};

/// File name of the manifest within the database directory.
pub const MANIFEST_FILE: &str = "manifest";

/// File name the manifest is staged under before the atomic rename.
pub const MANIFEST_TMP_FILE: &str = "manifest.tmp";

const MANIFEST_MAGIC: &[u8; 4] = b"SHMF";

/// The manifest tracks the committed revision shared by all six tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version (for format upgrades)
    pub version: u32,
    /// Committed revision; every table file carries this revision in its
    /// name. Incremented by each successful apply.
    pub revision: u64,
    /// Block size the tables were created with.
    pub block_size: u32,
}

impl Manifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    pub fn new(block_size: u32) -> Self {
        Self {
            version: Self::VERSION,
            revision: 1,
            block_size,
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn exists(dir: &Path) -> bool {
        Self::path(dir).is_file()
    }

    /// Load and verify the manifest from the database directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut file = File::open(Self::path(dir))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        if contents.len() < MANIFEST_MAGIC.len() + 4 {
            return Err(ShaleError::DatabaseCorrupt("manifest truncated".to_string()));
        }
        if &contents[..4] != MANIFEST_MAGIC {
            return Err(ShaleError::DatabaseCorrupt(
                "manifest has wrong magic".to_string(),
            ));
        }

        let payload = &contents[4..contents.len() - 4];
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&contents[contents.len() - 4..]);
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut hasher = Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != stored_crc {
            return Err(ShaleError::DatabaseCorrupt(
                "manifest checksum mismatch".to_string(),
            ));
        }

        let manifest: Manifest = bincode::deserialize(payload)?;
        if manifest.version != Self::VERSION {
            return Err(ShaleError::DatabaseCorrupt(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Store the manifest: staged write, fsync, atomic rename, directory
    /// fsync.
    pub fn store(&self, dir: &Path) -> Result<()> {
        let payload = bincode::serialize(self)?;
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let tmp_path = dir.join(MANIFEST_TMP_FILE);
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(MANIFEST_MAGIC)?;
            file.write_all(&payload)?;
            file.write_all(&crc.to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, Self::path(dir))?;
        sync_dir(dir)?;
        Ok(())
    }
}

/// Fsync a directory so a rename inside it is durable.
pub fn sync_dir(dir: &Path) -> Result<()> {
    let handle = File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let manifest = Manifest::new(8192);
        manifest.store(tmp.path()).unwrap();

        let loaded = Manifest::load(tmp.path()).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.block_size, 8192);
    }

    #[test]
    fn test_manifest_detects_corruption() {
        let tmp = TempDir::new().unwrap();
        Manifest::new(8192).store(tmp.path()).unwrap();

        let path = Manifest::path(tmp.path());
        let mut contents = std::fs::read(&path).unwrap();
        let mid = contents.len() / 2;
        contents[mid] ^= 0xff;
        std::fs::write(&path, contents).unwrap();

        match Manifest::load(tmp.path()) {
            Err(ShaleError::DatabaseCorrupt(_)) => {}
            other => panic!("expected DatabaseCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_manifest_store_replaces() {
        let tmp = TempDir::new().unwrap();
        let mut manifest = Manifest::new(4096);
        manifest.store(tmp.path()).unwrap();

        manifest.revision = 7;
        manifest.store(tmp.path()).unwrap();

        let loaded = Manifest::load(tmp.path()).unwrap();
        assert_eq!(loaded.revision, 7);
        assert!(!tmp.path().join(MANIFEST_TMP_FILE).exists());
    }
}
