use thiserror::Error;

/// Main error type for Shale operations
#[derive(Error, Debug)]
pub enum ShaleError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),

    #[error("database modified underneath reader; snapshot out of date")]
    DatabaseModified,

    #[error("unable to acquire database write lock")]
    DatabaseLocked,

    #[error("database needs recovery before it can be opened for writing")]
    NeedsRecovery,

    #[error("database corrupt: {0}")]
    DatabaseCorrupt(String),

    #[error("document {0} not found")]
    DocumentNotFound(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for Shale operations
pub type Result<T> = std::result::Result<T, ShaleError>;

impl ShaleError {
    /// Check if this error means the committed snapshot was replaced
    /// underneath a reader (the only error the reader retry path handles).
    pub fn is_modified(&self) -> bool {
        matches!(self, ShaleError::DatabaseModified)
    }
}
