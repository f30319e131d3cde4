use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, ShaleError};

/// Default block size for newly-created tables, in bytes.
pub const DEFAULT_BLOCK_SIZE: u32 = 8192;

/// Smallest acceptable table block size.
pub const MIN_BLOCK_SIZE: u32 = 2048;

/// Largest acceptable table block size.
pub const MAX_BLOCK_SIZE: u32 = 65536;

/// Open-time configuration for a database directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory the database is stored in. Must be a full path.
    pub dir: PathBuf,
    /// File in which to record modifications and accesses made to the
    /// database. A relative path is taken relative to `dir`. When unset,
    /// no log is written.
    pub logfile: Option<PathBuf>,
    /// If true and the database needs a recovery step, perform it silently
    /// before opening for writing. If false, writable opens fail with
    /// `NeedsRecovery` instead. Read-only opens never need recovery.
    pub perform_recovery: bool,
    /// Block size used when creating tables, in bytes. Must be a power of
    /// two in [2048, 65536]. Completely ignored if the database already
    /// exists.
    pub block_size: u32,
}

impl DatabaseConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            logfile: None,
            perform_recovery: false,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.logfile = Some(path.into());
        self
    }

    pub fn perform_recovery(mut self, recover: bool) -> Self {
        self.perform_recovery = recover;
        self
    }

    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Resolve the configured log file path against the database directory.
    pub fn resolved_logfile(&self) -> Option<PathBuf> {
        self.logfile.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.dir.join(path)
            }
        })
    }

    /// Validate the block size constraint.
    pub fn validate(&self) -> Result<()> {
        let bs = self.block_size;
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&bs) || !bs.is_power_of_two() {
            return Err(ShaleError::InvalidOperation(format!(
                "block size must be a power of two in [{}, {}], got {}",
                MIN_BLOCK_SIZE, MAX_BLOCK_SIZE, bs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::new("/tmp/db");
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert!(!config.perform_recovery);
        assert!(config.logfile.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_block_size_validation() {
        assert!(DatabaseConfig::new("/tmp/db").block_size(2048).validate().is_ok());
        assert!(DatabaseConfig::new("/tmp/db").block_size(65536).validate().is_ok());

        // Out of range
        assert!(DatabaseConfig::new("/tmp/db").block_size(1024).validate().is_err());
        assert!(DatabaseConfig::new("/tmp/db").block_size(131072).validate().is_err());
        // Not a power of two
        assert!(DatabaseConfig::new("/tmp/db").block_size(3000).validate().is_err());
    }

    #[test]
    fn test_logfile_resolution() {
        let config = DatabaseConfig::new("/data/db").logfile("access.log");
        assert_eq!(
            config.resolved_logfile(),
            Some(PathBuf::from("/data/db/access.log"))
        );

        let config = DatabaseConfig::new("/data/db").logfile("/var/log/shale.log");
        assert_eq!(
            config.resolved_logfile(),
            Some(PathBuf::from("/var/log/shale.log"))
        );
    }
}
