//! Database facades.
//!
//! `Database` serves reads against a committed snapshot and is safe for
//! concurrent readers; `WritableDatabase` composes the same read surface
//! over a buffered table set and adds the mutation entry points. Every
//! public call acquires the per-database mutex for its duration; cursors
//! capture what they need at open time and never re-acquire it.

mod document;
mod writable;

pub use document::LazyDocument;
pub use writable::WritableDatabase;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::DatabaseConfig;
use crate::error::{Result, ShaleError};
use crate::index::{
    AttributeManager, Lexicon, PositionListCursor, PostingListCursor, RecordManager,
    TermListCursor, TermListManager,
};
use crate::models::{DocId, DocumentContents, DocumentTerm};
use crate::table::{BufferedTableSet, DiskTableSet, Table};

/// How many times `get_document` reopens and retries after the snapshot it
/// was reading is replaced by a concurrent writer.
pub const MAX_SNAPSHOT_RETRIES: u32 = 5;

/// The table set behind a database: a committed read-only snapshot, or the
/// single writer's buffered view.
pub(crate) enum Tables {
    Disk(DiskTableSet),
    Buffered(BufferedTableSet),
}

impl Tables {
    pub(crate) fn record(&self) -> &dyn Table {
        match self {
            Tables::Disk(set) => &set.record,
            Tables::Buffered(set) => &set.record,
        }
    }

    pub(crate) fn attribute(&self) -> &dyn Table {
        match self {
            Tables::Disk(set) => &set.attribute,
            Tables::Buffered(set) => &set.attribute,
        }
    }

    pub(crate) fn termlist(&self) -> &dyn Table {
        match self {
            Tables::Disk(set) => &set.termlist,
            Tables::Buffered(set) => &set.termlist,
        }
    }

    pub(crate) fn lexicon(&self) -> &dyn Table {
        match self {
            Tables::Disk(set) => &set.lexicon,
            Tables::Buffered(set) => &set.lexicon,
        }
    }

    pub(crate) fn postlist(&self) -> &dyn Table {
        match self {
            Tables::Disk(set) => &set.postlist,
            Tables::Buffered(set) => &set.postlist,
        }
    }

    pub(crate) fn position(&self) -> &dyn Table {
        match self {
            Tables::Disk(set) => &set.position,
            Tables::Buffered(set) => &set.position,
        }
    }

    fn reopen_because_overwritten(&mut self) -> Result<()> {
        match self {
            Tables::Disk(set) => set.reopen_because_overwritten(),
            // The single writer's snapshot cannot be replaced underneath it.
            Tables::Buffered(_) => Ok(()),
        }
    }
}

/// State shared between a database facade and every cursor and lazy
/// document it handed out. Cursors hold an `Arc` to it so the tables
/// outlive them even when the facade itself is dropped first.
pub(crate) struct DatabaseInner {
    pub(crate) tables: Mutex<Tables>,
}

impl DatabaseInner {
    pub(crate) fn doccount(tables: &Tables) -> Result<u64> {
        RecordManager::get_doccount(tables.record())
    }

    pub(crate) fn avlength(tables: &Tables) -> Result<f64> {
        let doccount = Self::doccount(tables)?;
        if doccount == 0 {
            return Ok(0.0);
        }
        let total_length = RecordManager::get_total_length(tables.record())?;
        Ok(total_length as f64 / doccount as f64)
    }

    pub(crate) fn termfreq(tables: &Tables, term: &str) -> Result<u64> {
        Ok(Lexicon::get_entry(tables.lexicon(), term)?.unwrap_or(0))
    }

    /// Read one document in a single pass over the four tables involved.
    /// Raises `DatabaseModified` when the snapshot is replaced mid-pass.
    fn read_document(tables: &Tables, did: DocId) -> Result<DocumentContents> {
        if did == 0 {
            return Err(ShaleError::DocumentNotFound(0));
        }

        let data = RecordManager::get_record(tables.record(), did)?;
        let keys = AttributeManager::get_all_attributes(tables.attribute(), did)?;
        let (_, raw_terms) = TermListManager::read_entries(tables.termlist(), did)?;

        let mut terms = BTreeMap::new();
        for (term, wdf) in raw_terms {
            let termfreq = Lexicon::get_entry(tables.lexicon(), &term)?.unwrap_or(0);
            let positions: Vec<u32> =
                PositionListCursor::read_data(tables.position(), did, &term, None)?.collect();
            terms.insert(
                term,
                DocumentTerm {
                    wdf,
                    termfreq,
                    positions,
                },
            );
        }

        Ok(DocumentContents { data, keys, terms })
    }

    /// The multi-table document read with the snapshot retry protocol: on
    /// `DatabaseModified` the tables are reopened at the now-committed
    /// revision and the whole read restarts, up to the retry budget. The
    /// final failure is returned to the caller.
    pub(crate) fn get_document_with_retry(
        tables: &mut Tables,
        did: DocId,
    ) -> Result<DocumentContents> {
        let mut tries_left = MAX_SNAPSHOT_RETRIES;
        loop {
            match Self::read_document(tables, did) {
                Err(err) if err.is_modified() && tries_left > 0 => {
                    tries_left -= 1;
                    tracing::debug!(docid = did, tries_left, "database modified; reopening");
                    tables.reopen_because_overwritten()?;
                }
                result => return result,
            }
        }
    }
}

fn read_only_error() -> ShaleError {
    ShaleError::InvalidOperation("database opened read-only".to_string())
}

/// Read-only database facade over a committed snapshot.
///
/// Thread-safe: concurrent readers are serialised by the per-database
/// mutex, held only for the duration of each call.
pub struct Database {
    pub(crate) inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open the database in `config.dir` read-only, at the currently
    /// committed revision.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let tables = DiskTableSet::open(config)?;
        Ok(Self::from_tables(Tables::Disk(tables)))
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                tables: Mutex::new(tables),
            }),
        }
    }

    /// Number of live documents.
    pub fn get_doccount(&self) -> Result<u64> {
        let tables = self.inner.tables.lock();
        DatabaseInner::doccount(&tables)
    }

    /// Average document length; 0 when the database is empty.
    pub fn get_avlength(&self) -> Result<f64> {
        let tables = self.inner.tables.lock();
        DatabaseInner::avlength(&tables)
    }

    /// Length of one document.
    pub fn get_doclength(&self, _did: DocId) -> Result<u64> {
        Err(ShaleError::Unimplemented("get_doclength"))
    }

    /// Number of documents containing `term`; 0 when absent.
    pub fn get_termfreq(&self, term: &str) -> Result<u64> {
        let tables = self.inner.tables.lock();
        DatabaseInner::termfreq(&tables, term)
    }

    /// Sum of `term`'s wdf across all documents; 0 when absent.
    pub fn get_collection_freq(&self, term: &str) -> Result<u64> {
        let tables = self.inner.tables.lock();
        crate::index::PostListManager::get_collection_freq(tables.postlist(), term)
    }

    /// Whether `term` appears in the lexicon.
    pub fn term_exists(&self, term: &str) -> Result<bool> {
        let tables = self.inner.tables.lock();
        Ok(Lexicon::get_entry(tables.lexicon(), term)?.is_some())
    }

    /// Cursor over `term`'s posting list; empty for an absent term.
    pub fn open_post_list(&self, term: &str) -> Result<PostingListCursor> {
        let tables = self.inner.tables.lock();
        PostingListCursor::open(tables.postlist(), term, Some(Arc::clone(&self.inner)))
    }

    /// Cursor over the term list of document `did`.
    pub fn open_term_list(&self, did: DocId) -> Result<TermListCursor> {
        if did == 0 {
            return Err(ShaleError::DocumentNotFound(0));
        }
        let tables = self.inner.tables.lock();
        TermListCursor::open(
            tables.termlist(),
            tables.lexicon(),
            did,
            Some(Arc::clone(&self.inner)),
        )
    }

    /// Cursor over the stored positions of `term` in document `did`.
    pub fn open_position_list(&self, _did: DocId, _term: &str) -> Result<PositionListCursor> {
        Err(ShaleError::Unimplemented("open_position_list"))
    }

    /// Lazy handle to document `did`; no table is read until an accessor
    /// is called.
    pub fn open_document(&self, did: DocId) -> Result<LazyDocument> {
        if did == 0 {
            return Err(ShaleError::DocumentNotFound(0));
        }
        Ok(LazyDocument::new(Arc::clone(&self.inner), did))
    }

    /// Eagerly fetch the full contents of document `did`, transparently
    /// retrying when a concurrent writer replaces the snapshot mid-read.
    pub fn get_document(&self, did: DocId) -> Result<DocumentContents> {
        let mut tables = self.inner.tables.lock();
        DatabaseInner::get_document_with_retry(&mut tables, did)
    }

    // Mutation entry points: this database was opened read-only.

    pub fn begin_session(&self, _timeout: Duration) -> Result<()> {
        Err(read_only_error())
    }

    pub fn end_session(&self) -> Result<()> {
        Err(read_only_error())
    }

    pub fn flush(&self) -> Result<()> {
        Err(read_only_error())
    }

    pub fn begin_transaction(&self) -> Result<()> {
        Err(read_only_error())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        Err(read_only_error())
    }

    pub fn cancel_transaction(&self) -> Result<()> {
        Err(read_only_error())
    }

    pub fn add_document(&self, _document: &DocumentContents) -> Result<DocId> {
        Err(read_only_error())
    }

    pub fn delete_document(&self, _did: DocId) -> Result<()> {
        Err(read_only_error())
    }

    pub fn replace_document(&self, _did: DocId, _document: &DocumentContents) -> Result<()> {
        Err(read_only_error())
    }
}
