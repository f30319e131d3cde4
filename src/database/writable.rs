//! Writable database facade.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Database, DatabaseInner, LazyDocument, Tables};
use crate::config::DatabaseConfig;
use crate::error::{Result, ShaleError};
use crate::index::{
    AttributeManager, Lexicon, PositionListCursor, PositionListManager, PostListManager,
    PostingListCursor, RecordManager, TermListCursor, TermListManager,
};
use crate::models::{DocId, DocumentContents};
use crate::table::{BufferedTableSet, SessionLock};

/// Write-side facade: the read surface over a buffered table set, plus
/// the mutation entry points.
///
/// Reads issued through this database see uncommitted buffered writes.
/// Nothing reaches disk until [`flush`](Self::flush) or
/// [`end_session`](Self::end_session) applies the buffer.
///
/// A failed mutation cancels the *entire* buffered change set, including
/// changes buffered by earlier calls that were never applied; there is no
/// per-operation rollback.
pub struct WritableDatabase {
    database_ro: Database,
    session: Mutex<Option<SessionLock>>,
    dir: PathBuf,
}

impl WritableDatabase {
    /// Open `config.dir` for writing, creating the database when absent
    /// and applying the configured recovery policy.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let tables = BufferedTableSet::open(config)?;
        Ok(Self {
            database_ro: Database::from_tables(Tables::Buffered(tables)),
            session: Mutex::new(None),
            dir: config.dir.clone(),
        })
    }

    fn with_buffered<T>(&self, f: impl FnOnce(&mut BufferedTableSet) -> Result<T>) -> Result<T> {
        let mut tables = self.database_ro.inner.tables.lock();
        match &mut *tables {
            Tables::Buffered(set) => f(set),
            Tables::Disk(_) => Err(ShaleError::Internal(
                "writable database backed by read-only tables".to_string(),
            )),
        }
    }

    /// Acquire the directory-level single-writer lock, blocking up to
    /// `timeout`. A zero timeout is a non-blocking attempt. Fails with
    /// `DatabaseLocked` when another session holds the lock.
    pub fn begin_session(&self, timeout: Duration) -> Result<()> {
        let tables = self.database_ro.inner.tables.lock();
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(ShaleError::InvalidOperation(
                "session already in progress".to_string(),
            ));
        }
        *session = Some(SessionLock::acquire(&self.dir, timeout)?);
        if let Tables::Buffered(set) = &*tables {
            set.log().record("begin session");
        }
        tracing::debug!(dir = %self.dir.display(), "began modification session");
        Ok(())
    }

    /// Apply all buffered modifications and release the session lock. The
    /// lock is released even when the apply fails, after which the error
    /// is surfaced.
    pub fn end_session(&self) -> Result<()> {
        let mut tables = self.database_ro.inner.tables.lock();
        let mut session = self.session.lock();
        let lock = session.take().ok_or_else(|| {
            ShaleError::InvalidOperation("no session in progress".to_string())
        })?;

        let result = match &mut *tables {
            Tables::Buffered(set) => {
                let result = set.apply();
                set.log().record("end session");
                result
            }
            Tables::Disk(_) => Err(ShaleError::Internal(
                "writable database backed by read-only tables".to_string(),
            )),
        };
        drop(lock);
        result
    }

    /// Apply all buffered modifications without ending the session.
    pub fn flush(&self) -> Result<()> {
        self.with_buffered(|set| set.apply())
    }

    pub fn begin_transaction(&self) -> Result<()> {
        Err(ShaleError::Unimplemented("begin_transaction"))
    }

    pub fn commit_transaction(&self) -> Result<()> {
        Err(ShaleError::Unimplemented("commit_transaction"))
    }

    pub fn cancel_transaction(&self) -> Result<()> {
        Err(ShaleError::Unimplemented("cancel_transaction"))
    }

    /// Buffer the insertion of a new document and return its docid.
    ///
    /// Failure-atomic: any error cancels the whole buffered change set
    /// before it is re-raised.
    pub fn add_document(&self, document: &DocumentContents) -> Result<DocId> {
        self.with_buffered(|set| {
            let result = insert_document(set, document);
            if let Err(err) = &result {
                tracing::warn!(error = %err, "add_document failed; cancelling buffer");
                set.cancel();
            }
            result
        })
    }

    /// Buffer the removal of document `did` from all six tables.
    ///
    /// Failure-atomic in the same whole-buffer sense as
    /// [`add_document`](Self::add_document).
    pub fn delete_document(&self, did: DocId) -> Result<()> {
        let mut tables = self.database_ro.inner.tables.lock();

        // Materialise the document first so the set of terms and positions
        // to remove is known. An absent docid fails here, before anything
        // is buffered.
        let document = DatabaseInner::get_document_with_retry(&mut tables, did)?;

        let set = match &mut *tables {
            Tables::Buffered(set) => set,
            Tables::Disk(_) => {
                return Err(ShaleError::Internal(
                    "writable database backed by read-only tables".to_string(),
                ))
            }
        };

        let result = remove_document(set, did, &document);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "delete_document failed; cancelling buffer");
            set.cancel();
        }
        result
    }

    pub fn replace_document(&self, _did: DocId, _document: &DocumentContents) -> Result<()> {
        Err(ShaleError::Unimplemented("replace_document"))
    }

    // Read surface, delegated to the embedded read database (which sees
    // the buffered writes).

    pub fn get_doccount(&self) -> Result<u64> {
        self.database_ro.get_doccount()
    }

    pub fn get_avlength(&self) -> Result<f64> {
        self.database_ro.get_avlength()
    }

    pub fn get_doclength(&self, did: DocId) -> Result<u64> {
        self.database_ro.get_doclength(did)
    }

    pub fn get_termfreq(&self, term: &str) -> Result<u64> {
        self.database_ro.get_termfreq(term)
    }

    pub fn get_collection_freq(&self, term: &str) -> Result<u64> {
        self.database_ro.get_collection_freq(term)
    }

    pub fn term_exists(&self, term: &str) -> Result<bool> {
        self.database_ro.term_exists(term)
    }

    pub fn open_post_list(&self, term: &str) -> Result<PostingListCursor> {
        self.database_ro.open_post_list(term)
    }

    pub fn open_term_list(&self, did: DocId) -> Result<TermListCursor> {
        self.database_ro.open_term_list(did)
    }

    pub fn open_position_list(&self, did: DocId, term: &str) -> Result<PositionListCursor> {
        self.database_ro.open_position_list(did, term)
    }

    pub fn open_document(&self, did: DocId) -> Result<LazyDocument> {
        self.database_ro.open_document(did)
    }

    pub fn get_document(&self, did: DocId) -> Result<DocumentContents> {
        self.database_ro.get_document(did)
    }
}

impl Drop for WritableDatabase {
    fn drop(&mut self) {
        // Best-effort end of an open session; never panic out of a drop.
        // Without a session, buffered-but-unapplied changes are discarded.
        let has_session = self.session.lock().is_some();
        if has_session {
            if let Err(err) = self.end_session() {
                tracing::warn!(error = %err, "ignoring end_session failure during drop");
            }
        }
    }
}

/// Insert protocol, in table order: record, attributes, termlist, total
/// length, then lexicon/postlist/positionlist per term.
fn insert_document(set: &mut BufferedTableSet, document: &DocumentContents) -> Result<DocId> {
    let new_doclen = document.length();

    let did = RecordManager::add_record(&mut set.record, &document.data, new_doclen)?;
    if did == 0 {
        return Err(ShaleError::Internal("allocated docid zero".to_string()));
    }

    for (key_id, value) in &document.keys {
        AttributeManager::add_attribute(&mut set.attribute, did, *key_id, value)?;
    }

    TermListManager::set_entries(&mut set.termlist, did, &document.terms, new_doclen, false)?;

    // Old doclen is always zero, since this is a new document.
    RecordManager::modify_total_length(&mut set.record, 0, new_doclen)?;

    for (term, entry) in &document.terms {
        Lexicon::increment_termfreq(&mut set.lexicon, term)?;
        PostListManager::add_entry(&mut set.postlist, term, did, entry.wdf, new_doclen)?;
        PositionListManager::set_positionlist(&mut set.position, did, term, &entry.positions)?;
    }

    set.log().record(&format!("add docid={}", did));
    Ok(did)
}

/// Delete protocol: unindex every term of the materialised document, give
/// back its length, then drop attributes, term list and record.
fn remove_document(set: &mut BufferedTableSet, did: DocId, document: &DocumentContents) -> Result<()> {
    for term in document.terms.keys() {
        PostListManager::delete_entry(&mut set.postlist, term, did)?;
        PositionListManager::delete_positionlist(&mut set.position, did, term)?;
        Lexicon::decrement_termfreq(&mut set.lexicon, term)?;
    }

    // New doclen is always zero, since the document is going away.
    let old_doclen = TermListManager::get_doclength(&set.termlist, did)?;
    RecordManager::modify_total_length(&mut set.record, old_doclen, 0)?;

    AttributeManager::delete_all_attributes(&mut set.attribute, did)?;
    TermListManager::delete_termlist(&mut set.termlist, did)?;
    RecordManager::delete_record(&mut set.record, did)?;

    set.log().record(&format!("delete docid={}", did));
    Ok(())
}
