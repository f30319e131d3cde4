//! Lazy document handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::DatabaseInner;
use crate::error::Result;
use crate::index::{AttributeManager, RecordManager};
use crate::models::{DocId, DocumentContents, KeyId};

/// A handle to one document that fetches nothing until asked.
///
/// Each accessor re-enters the database (taking its mutex), so the handle
/// stays valid across commits on a writable database; the shared handle
/// keeps the database alive even if the caller drops it first.
pub struct LazyDocument {
    inner: Arc<DatabaseInner>,
    did: DocId,
}

impl LazyDocument {
    pub(crate) fn new(inner: Arc<DatabaseInner>, did: DocId) -> Self {
        Self { inner, did }
    }

    pub fn docid(&self) -> DocId {
        self.did
    }

    /// The opaque record data.
    pub fn get_data(&self) -> Result<Vec<u8>> {
        let tables = self.inner.tables.lock();
        RecordManager::get_record(tables.record(), self.did)
    }

    /// One attribute value, when stored.
    pub fn get_attribute(&self, key_id: KeyId) -> Result<Option<Vec<u8>>> {
        let tables = self.inner.tables.lock();
        AttributeManager::get_attribute(tables.attribute(), self.did, key_id)
    }

    /// All attributes of the document.
    pub fn get_all_attributes(&self) -> Result<BTreeMap<KeyId, Vec<u8>>> {
        let tables = self.inner.tables.lock();
        AttributeManager::get_all_attributes(tables.attribute(), self.did)
    }

    /// The full document contents, with the snapshot retry protocol.
    pub fn get_full_contents(&self) -> Result<DocumentContents> {
        let mut tables = self.inner.tables.lock();
        DatabaseInner::get_document_with_retry(&mut tables, self.did)
    }
}
