//! Directory-level session lock: at most one writer per database directory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Result, ShaleError};

/// File name of the lock file within the database directory.
pub const LOCK_FILE: &str = "shale.lock";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exclusive filesystem lock preventing a second concurrent writer session
/// on the same database directory. Released on drop.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Acquire the lock, blocking up to `timeout`. A zero timeout means a
    /// single non-blocking attempt.
    pub fn acquire(dir: &Path, timeout: Duration) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(_) if Instant::now() >= deadline => return Err(ShaleError::DatabaseLocked),
                Err(_) => std::thread::sleep(POLL_INTERVAL),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
