//! Lexicon: ordered map from term name to its term frequency.
//!
//! Key layout: the raw term bytes. The byte ordering of the underlying
//! table is the lexicon ordering.

use crate::error::{Result, ShaleError};
use crate::table::codec::{decode_vbyte, encode_vbyte};
use crate::table::{MutableTable, Table};

/// Stateless facade over the lexicon table.
pub struct Lexicon;

impl Lexicon {
    /// Look up a term, returning its term frequency when present.
    pub fn get_entry<T: Table + ?Sized>(table: &T, term: &str) -> Result<Option<u64>> {
        match table.get(term.as_bytes())? {
            Some(payload) => {
                let mut pos = 0;
                let termfreq = decode_vbyte(&payload, &mut pos).map_err(|_| {
                    ShaleError::DatabaseCorrupt(format!("lexicon: bad entry for term {:?}", term))
                })?;
                Ok(Some(termfreq))
            }
            None => Ok(None),
        }
    }

    /// Bump a term's frequency, creating the entry at 1 when absent.
    pub fn increment_termfreq(table: &mut dyn MutableTable, term: &str) -> Result<()> {
        let termfreq = Self::get_entry(&*table, term)?.unwrap_or(0) + 1;
        let mut payload = Vec::new();
        encode_vbyte(termfreq, &mut payload);
        table.put(term.as_bytes().to_vec(), payload)
    }

    /// Drop a term's frequency, removing the entry when it reaches zero.
    pub fn decrement_termfreq(table: &mut dyn MutableTable, term: &str) -> Result<()> {
        let termfreq = Self::get_entry(&*table, term)?.ok_or_else(|| {
            ShaleError::DatabaseCorrupt(format!(
                "lexicon: decrement of absent term {:?}",
                term
            ))
        })?;

        if termfreq <= 1 {
            table.delete(term.as_bytes())
        } else {
            let mut payload = Vec::new();
            encode_vbyte(termfreq - 1, &mut payload);
            table.put(term.as_bytes().to_vec(), payload)
        }
    }
}
