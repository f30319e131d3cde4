//! Posting-list table: per-term ascending list of (docid, wdf, doclen).
//!
//! Key layout: the raw term bytes. Payload: vbyte entry count, vbyte
//! collection frequency, then per entry the docid delta, wdf and doclen as
//! vbytes. Docids are delta-coded against the previous entry.

use std::sync::Arc;

use crate::database::DatabaseInner;
use crate::error::{Result, ShaleError};
use crate::models::DocId;
use crate::table::codec::{decode_vbyte, encode_vbyte};
use crate::table::{MutableTable, Table};

/// A single posting: one document's occurrence data for one term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostingEntry {
    pub docid: DocId,
    pub wdf: u64,
    pub doclen: u64,
}

fn corrupt(term: &str, what: &str) -> ShaleError {
    ShaleError::DatabaseCorrupt(format!("posting list for term {:?}: {}", term, what))
}

fn decode_list(term: &str, payload: &[u8]) -> Result<(u64, Vec<PostingEntry>)> {
    let mut pos = 0;
    let count = decode_vbyte(payload, &mut pos).map_err(|_| corrupt(term, "bad count"))?;
    let collection_freq =
        decode_vbyte(payload, &mut pos).map_err(|_| corrupt(term, "bad collection freq"))?;

    let mut entries = Vec::with_capacity(count as usize);
    let mut docid = 0u64;
    for _ in 0..count {
        let delta = decode_vbyte(payload, &mut pos).map_err(|_| corrupt(term, "bad docid"))?;
        let wdf = decode_vbyte(payload, &mut pos).map_err(|_| corrupt(term, "bad wdf"))?;
        let doclen = decode_vbyte(payload, &mut pos).map_err(|_| corrupt(term, "bad doclen"))?;
        docid += delta;
        entries.push(PostingEntry { docid, wdf, doclen });
    }
    if pos != payload.len() {
        return Err(corrupt(term, "trailing bytes"));
    }
    Ok((collection_freq, entries))
}

fn encode_list(collection_freq: u64, entries: &[PostingEntry]) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_vbyte(entries.len() as u64, &mut payload);
    encode_vbyte(collection_freq, &mut payload);
    let mut prev = 0u64;
    for entry in entries {
        encode_vbyte(entry.docid - prev, &mut payload);
        encode_vbyte(entry.wdf, &mut payload);
        encode_vbyte(entry.doclen, &mut payload);
        prev = entry.docid;
    }
    payload
}

/// Stateless facade over the posting-list table.
pub struct PostListManager;

impl PostListManager {
    /// Insert `(did, wdf, doclen)` into the term's posting list, keeping
    /// the list sorted by docid.
    pub fn add_entry(
        table: &mut dyn MutableTable,
        term: &str,
        did: DocId,
        wdf: u64,
        doclen: u64,
    ) -> Result<()> {
        let (mut collection_freq, mut entries) = match table.get(term.as_bytes())? {
            Some(payload) => decode_list(term, &payload)?,
            None => (0, Vec::new()),
        };

        let entry = PostingEntry {
            docid: did,
            wdf,
            doclen,
        };
        match entries.binary_search_by_key(&did, |e| e.docid) {
            Ok(_) => return Err(corrupt(term, "duplicate docid")),
            Err(at) => entries.insert(at, entry),
        }
        collection_freq += wdf;

        table.put(term.as_bytes().to_vec(), encode_list(collection_freq, &entries))
    }

    /// Remove `did` from the term's posting list, dropping the whole row
    /// when the list becomes empty.
    pub fn delete_entry(table: &mut dyn MutableTable, term: &str, did: DocId) -> Result<()> {
        let payload = table
            .get(term.as_bytes())?
            .ok_or_else(|| corrupt(term, "missing posting list"))?;
        let (collection_freq, mut entries) = decode_list(term, &payload)?;

        let at = entries
            .binary_search_by_key(&did, |e| e.docid)
            .map_err(|_| corrupt(term, "posting entry missing"))?;
        let removed = entries.remove(at);
        let collection_freq = collection_freq
            .checked_sub(removed.wdf)
            .ok_or_else(|| corrupt(term, "collection freq underflow"))?;

        if entries.is_empty() {
            table.delete(term.as_bytes())
        } else {
            table.put(term.as_bytes().to_vec(), encode_list(collection_freq, &entries))
        }
    }

    /// Sum of wdf over the term's posting list; 0 for an absent term.
    pub fn get_collection_freq(table: &dyn Table, term: &str) -> Result<u64> {
        match table.get(term.as_bytes())? {
            Some(payload) => {
                let mut pos = 0;
                decode_vbyte(&payload, &mut pos).map_err(|_| corrupt(term, "bad count"))?;
                decode_vbyte(&payload, &mut pos).map_err(|_| corrupt(term, "bad collection freq"))
            }
            None => Ok(0),
        }
    }
}

/// Cursor over one term's posting list, ascending by docid.
///
/// The raw list payload is captured when the cursor is opened and decoded
/// lazily; iteration never touches the database again.
pub struct PostingListCursor {
    data: Vec<u8>,
    pos: usize,
    remaining: u64,
    last_docid: u64,
    termfreq: u64,
    collection_freq: u64,
    _database: Option<Arc<DatabaseInner>>,
}

impl PostingListCursor {
    pub(crate) fn open(
        table: &dyn Table,
        term: &str,
        database: Option<Arc<DatabaseInner>>,
    ) -> Result<Self> {
        let (data, termfreq, collection_freq, pos) = match table.get(term.as_bytes())? {
            Some(payload) => {
                let mut pos = 0;
                let count =
                    decode_vbyte(&payload, &mut pos).map_err(|_| corrupt(term, "bad count"))?;
                let collection_freq = decode_vbyte(&payload, &mut pos)
                    .map_err(|_| corrupt(term, "bad collection freq"))?;
                (payload, count, collection_freq, pos)
            }
            None => (Vec::new(), 0, 0, 0),
        };

        Ok(Self {
            data,
            pos,
            remaining: termfreq,
            last_docid: 0,
            termfreq,
            collection_freq,
            _database: database,
        })
    }

    /// Number of documents in the list.
    pub fn termfreq(&self) -> u64 {
        self.termfreq
    }

    /// Sum of wdf over the list.
    pub fn collection_freq(&self) -> u64 {
        self.collection_freq
    }

    /// Whether every posting has been yielded.
    pub fn at_end(&self) -> bool {
        self.remaining == 0
    }

    /// Advance to the first posting with `docid >= target`.
    pub fn skip_to(&mut self, target: DocId) -> Option<PostingEntry> {
        self.find(|entry| entry.docid >= target)
    }
}

impl Iterator for PostingListCursor {
    type Item = PostingEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let mut pos = self.pos;
        let decoded = (|| -> std::io::Result<PostingEntry> {
            let delta = decode_vbyte(&self.data, &mut pos)?;
            let wdf = decode_vbyte(&self.data, &mut pos)?;
            let doclen = decode_vbyte(&self.data, &mut pos)?;
            Ok(PostingEntry {
                docid: self.last_docid + delta,
                wdf,
                doclen,
            })
        })();

        match decoded {
            Ok(entry) => {
                self.pos = pos;
                self.last_docid = entry.docid;
                self.remaining -= 1;
                Some(entry)
            }
            Err(_) => {
                debug_assert!(false, "malformed posting list payload");
                self.remaining = 0;
                None
            }
        }
    }
}
