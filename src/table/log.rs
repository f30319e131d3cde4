//! Optional modification/access log.
//!
//! Record format:
//! - u32 length (little endian)
//! - u32 crc32 of payload
//! - raw payload bytes (one UTF-8 event line)
//!
//! Logging is best-effort: a failed append is reported through `tracing`
//! and never fails the operation being logged.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crc32fast::Hasher;
use parking_lot::Mutex;

use crate::error::Result;

/// Append-only event log, disabled when no log file is configured.
#[derive(Debug)]
pub struct ModificationLog {
    file: Option<Mutex<File>>,
}

impl ModificationLog {
    /// Open the log at `path`, or a disabled log for `None`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(Self { file })
    }

    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one event record.
    pub fn record(&self, event: &str) {
        let Some(file) = &self.file else {
            return;
        };

        let payload = event.as_bytes();
        let mut hasher = Hasher::new();
        hasher.update(payload);
        let crc = hasher.finalize();

        let mut file = file.lock();
        let result = file
            .write_all(&(payload.len() as u32).to_le_bytes())
            .and_then(|_| file.write_all(&crc.to_le_bytes()))
            .and_then(|_| file.write_all(payload));
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to append to modification log");
        }
    }
}
