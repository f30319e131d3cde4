//! Shale: a disk-resident inverted-index search database.
//!
//! Six co-operating on-disk tables (record, attribute, term-list, lexicon,
//! posting-list, position-list) kept mutually consistent behind two
//! facades: a read-only [`Database`] over a committed snapshot and a
//! single-writer [`WritableDatabase`] that buffers mutations in memory and
//! commits them to all six tables atomically.

pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod models;
pub mod table;

pub use config::DatabaseConfig;
pub use database::{Database, LazyDocument, WritableDatabase, MAX_SNAPSHOT_RETRIES};
pub use error::{Result, ShaleError};
pub use index::{
    PositionListCursor, PostingEntry, PostingListCursor, TermListCursor, TermListEntry,
};
pub use models::{DocId, DocumentContents, DocumentTerm, KeyId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
