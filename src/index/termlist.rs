//! Term-list table: per-document ordered list of (term, wdf) plus the
//! document length.
//!
//! Key layout: docid as 8 big-endian bytes. Payload: vbyte doclen, vbyte
//! entry count, then per entry a length-prefixed term and its vbyte wdf,
//! in term order.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::lexicon::Lexicon;
use super::record::docid_key;
use crate::database::DatabaseInner;
use crate::error::{Result, ShaleError};
use crate::models::{DocId, DocumentTerm};
use crate::table::codec::{decode_bytes, decode_vbyte, encode_bytes, encode_vbyte};
use crate::table::{MutableTable, Table};

fn corrupt(did: DocId, what: &str) -> ShaleError {
    ShaleError::DatabaseCorrupt(format!("termlist for document {}: {}", did, what))
}

/// Stateless facade over the term-list table.
pub struct TermListManager;

impl TermListManager {
    /// Write the term list for `did`. `is_replacement` states whether an
    /// existing list is expected to be overwritten.
    pub fn set_entries(
        table: &mut dyn MutableTable,
        did: DocId,
        terms: &BTreeMap<String, DocumentTerm>,
        doclen: u64,
        is_replacement: bool,
    ) -> Result<()> {
        if !is_replacement && table.get(&docid_key(did))?.is_some() {
            return Err(corrupt(did, "already present"));
        }

        let mut payload = Vec::new();
        encode_vbyte(doclen, &mut payload);
        encode_vbyte(terms.len() as u64, &mut payload);
        for (term, entry) in terms {
            encode_bytes(term.as_bytes(), &mut payload);
            encode_vbyte(entry.wdf, &mut payload);
        }
        table.put(docid_key(did).to_vec(), payload)
    }

    /// Remove the term list for `did`.
    pub fn delete_termlist(table: &mut dyn MutableTable, did: DocId) -> Result<()> {
        if table.get(&docid_key(did))?.is_none() {
            return Err(ShaleError::DocumentNotFound(did));
        }
        table.delete(&docid_key(did))
    }

    /// The stored document length for `did`.
    pub fn get_doclength(table: &dyn Table, did: DocId) -> Result<u64> {
        let payload = table
            .get(&docid_key(did))?
            .ok_or(ShaleError::DocumentNotFound(did))?;
        let mut pos = 0;
        decode_vbyte(&payload, &mut pos).map_err(|_| corrupt(did, "bad doclen"))
    }

    /// Decode the full term list: (doclen, entries in term order).
    pub(crate) fn read_entries(table: &dyn Table, did: DocId) -> Result<(u64, Vec<(String, u64)>)> {
        let payload = table
            .get(&docid_key(did))?
            .ok_or(ShaleError::DocumentNotFound(did))?;

        let mut pos = 0;
        let doclen = decode_vbyte(&payload, &mut pos).map_err(|_| corrupt(did, "bad doclen"))?;
        let count = decode_vbyte(&payload, &mut pos).map_err(|_| corrupt(did, "bad count"))?;

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let term_bytes =
                decode_bytes(&payload, &mut pos).map_err(|_| corrupt(did, "bad term"))?;
            let term = String::from_utf8(term_bytes)
                .map_err(|_| corrupt(did, "term is not valid UTF-8"))?;
            let wdf = decode_vbyte(&payload, &mut pos).map_err(|_| corrupt(did, "bad wdf"))?;
            entries.push((term, wdf));
        }
        if pos != payload.len() {
            return Err(corrupt(did, "trailing bytes"));
        }
        Ok((doclen, entries))
    }
}

/// One entry yielded by a [`TermListCursor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermListEntry {
    pub term: String,
    pub wdf: u64,
    /// Number of documents containing the term, read from the lexicon when
    /// the cursor was opened.
    pub termfreq: u64,
}

/// Cursor over one document's term list, in term order.
///
/// The list and its term frequencies are captured when the cursor is
/// opened, so iteration never touches the database again; the back-pointer
/// only keeps the database alive for as long as the cursor exists.
pub struct TermListCursor {
    doclen: u64,
    entries: std::vec::IntoIter<TermListEntry>,
    _database: Option<Arc<DatabaseInner>>,
}

impl TermListCursor {
    pub(crate) fn open(
        termlist: &dyn Table,
        lexicon: &dyn Table,
        did: DocId,
        database: Option<Arc<DatabaseInner>>,
    ) -> Result<Self> {
        let (doclen, raw) = TermListManager::read_entries(termlist, did)?;
        let mut entries = Vec::with_capacity(raw.len());
        for (term, wdf) in raw {
            let termfreq = Lexicon::get_entry(lexicon, &term)?.unwrap_or(0);
            entries.push(TermListEntry {
                term,
                wdf,
                termfreq,
            });
        }
        Ok(Self {
            doclen,
            entries: entries.into_iter(),
            _database: database,
        })
    }

    /// The document length stored alongside the term list.
    pub fn doclength(&self) -> u64 {
        self.doclen
    }

    /// Whether the cursor has yielded every entry.
    pub fn at_end(&self) -> bool {
        self.entries.len() == 0
    }
}

impl Iterator for TermListCursor {
    type Item = TermListEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
