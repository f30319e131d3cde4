//! Position-list table: per (docid, term) strictly-increasing positions.
//!
//! Key layout: docid as 8 big-endian bytes followed by the raw term bytes.
//! Payload: vbyte count, the first position, then the position deltas.

use std::sync::Arc;

use super::record::docid_key;
use crate::database::DatabaseInner;
use crate::error::{Result, ShaleError};
use crate::models::DocId;
use crate::table::codec::{decode_vbyte, encode_vbyte};
use crate::table::{MutableTable, Table};

fn position_key(did: DocId, term: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + term.len());
    key.extend_from_slice(&docid_key(did));
    key.extend_from_slice(term.as_bytes());
    key
}

fn corrupt(did: DocId, term: &str, what: &str) -> ShaleError {
    ShaleError::DatabaseCorrupt(format!(
        "position list for (document {}, term {:?}): {}",
        did, term, what
    ))
}

/// Stateless facade over the position-list table.
pub struct PositionListManager;

impl PositionListManager {
    /// Store the position list for `(did, term)`. Positions are sorted and
    /// deduplicated so the stored sequence is strictly increasing.
    pub fn set_positionlist(
        table: &mut dyn MutableTable,
        did: DocId,
        term: &str,
        positions: &[u32],
    ) -> Result<()> {
        let mut sorted = positions.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut payload = Vec::new();
        encode_vbyte(sorted.len() as u64, &mut payload);
        let mut prev = 0u64;
        for (index, position) in sorted.iter().enumerate() {
            let position = *position as u64;
            if index == 0 {
                encode_vbyte(position, &mut payload);
            } else {
                encode_vbyte(position - prev, &mut payload);
            }
            prev = position;
        }
        table.put(position_key(did, term), payload)
    }

    /// Remove the position list for `(did, term)`.
    pub fn delete_positionlist(table: &mut dyn MutableTable, did: DocId, term: &str) -> Result<()> {
        table.delete(&position_key(did, term))
    }

    /// Decode the whole position list; absent entries read as empty.
    pub(crate) fn read_positions(table: &dyn Table, did: DocId, term: &str) -> Result<Vec<u32>> {
        PositionListCursor::read_data(table, did, term, None).map(|cursor| cursor.collect())
    }
}

/// Cursor over one stored position list, ascending.
///
/// The raw payload is captured at open and decoded lazily.
pub struct PositionListCursor {
    data: Vec<u8>,
    pos: usize,
    remaining: u64,
    last_position: u64,
    started: bool,
    _database: Option<Arc<DatabaseInner>>,
}

impl PositionListCursor {
    /// Open a cursor over the stored sequence for `(did, term)`.
    pub(crate) fn read_data(
        table: &dyn Table,
        did: DocId,
        term: &str,
        database: Option<Arc<DatabaseInner>>,
    ) -> Result<Self> {
        let (data, remaining, pos) = match table.get(&position_key(did, term))? {
            Some(payload) => {
                let mut pos = 0;
                let count = decode_vbyte(&payload, &mut pos)
                    .map_err(|_| corrupt(did, term, "bad count"))?;
                (payload, count, pos)
            }
            None => (Vec::new(), 0, 0),
        };

        Ok(Self {
            data,
            pos,
            remaining,
            last_position: 0,
            started: false,
            _database: database,
        })
    }

    pub fn at_end(&self) -> bool {
        self.remaining == 0
    }
}

impl Iterator for PositionListCursor {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let mut pos = self.pos;
        match decode_vbyte(&self.data, &mut pos) {
            Ok(value) => {
                let position = if self.started {
                    self.last_position + value
                } else {
                    value
                };
                self.pos = pos;
                self.started = true;
                self.last_position = position;
                self.remaining -= 1;
                Some(position as u32)
            }
            Err(_) => {
                debug_assert!(false, "malformed position list payload");
                self.remaining = 0;
                None
            }
        }
    }
}
