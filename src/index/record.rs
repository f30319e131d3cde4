//! Record table: opaque document data plus the database-wide aggregates.
//!
//! Key layout: docid as 8 big-endian bytes. Docid zero is reserved, and its
//! key slot holds the aggregates row (next docid to allocate, document
//! count, total document length) so aggregate updates commit atomically
//! with the record mutations they describe.

use crate::error::{Result, ShaleError};
use crate::models::DocId;
use crate::table::codec::{decode_vbyte, encode_vbyte};
use crate::table::{MutableTable, Table};

const AGGREGATES_KEY: [u8; 8] = [0u8; 8];

pub(crate) fn docid_key(did: DocId) -> [u8; 8] {
    did.to_be_bytes()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Aggregates {
    next_docid: DocId,
    doccount: u64,
    total_length: u64,
}

impl Aggregates {
    fn initial() -> Self {
        Self {
            next_docid: 1,
            doccount: 0,
            total_length: 0,
        }
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let next_docid = decode_vbyte(payload, &mut pos)
            .map_err(|_| corrupt("bad aggregates row"))?;
        let doccount = decode_vbyte(payload, &mut pos)
            .map_err(|_| corrupt("bad aggregates row"))?;
        let total_length = decode_vbyte(payload, &mut pos)
            .map_err(|_| corrupt("bad aggregates row"))?;
        Ok(Self {
            next_docid,
            doccount,
            total_length,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        encode_vbyte(self.next_docid, &mut payload);
        encode_vbyte(self.doccount, &mut payload);
        encode_vbyte(self.total_length, &mut payload);
        payload
    }
}

fn read_aggregates<T: Table + ?Sized>(table: &T) -> Result<Aggregates> {
    match table.get(&AGGREGATES_KEY)? {
        Some(payload) => Aggregates::decode(&payload),
        None => Ok(Aggregates::initial()),
    }
}

fn write_aggregates(table: &mut dyn MutableTable, aggregates: Aggregates) -> Result<()> {
    table.put(AGGREGATES_KEY.to_vec(), aggregates.encode())
}

fn corrupt(what: &str) -> ShaleError {
    ShaleError::DatabaseCorrupt(format!("record table: {}", what))
}

/// Stateless facade over the record table.
pub struct RecordManager;

impl RecordManager {
    /// Store a new record, allocating the next unused docid. The allocator
    /// is monotonic, so docids are never reused, and never zero.
    pub fn add_record(table: &mut dyn MutableTable, data: &[u8], doclen: u64) -> Result<DocId> {
        let mut aggregates = read_aggregates(&*table)?;
        let did = aggregates.next_docid;
        aggregates.next_docid += 1;
        aggregates.doccount += 1;

        let mut payload = Vec::with_capacity(data.len() + 4);
        encode_vbyte(doclen, &mut payload);
        payload.extend_from_slice(data);
        table.put(docid_key(did).to_vec(), payload)?;

        write_aggregates(table, aggregates)?;
        Ok(did)
    }

    /// Fetch the opaque record data for `did`.
    pub fn get_record(table: &dyn Table, did: DocId) -> Result<Vec<u8>> {
        let payload = table
            .get(&docid_key(did))?
            .ok_or(ShaleError::DocumentNotFound(did))?;
        let mut pos = 0;
        decode_vbyte(&payload, &mut pos).map_err(|_| corrupt("bad record row"))?;
        Ok(payload[pos..].to_vec())
    }

    /// Remove the record for `did` and decrement the document count.
    pub fn delete_record(table: &mut dyn MutableTable, did: DocId) -> Result<()> {
        if table.get(&docid_key(did))?.is_none() {
            return Err(ShaleError::DocumentNotFound(did));
        }
        table.delete(&docid_key(did))?;

        let mut aggregates = read_aggregates(&*table)?;
        aggregates.doccount = aggregates
            .doccount
            .checked_sub(1)
            .ok_or_else(|| corrupt("doccount underflow"))?;
        write_aggregates(table, aggregates)
    }

    pub fn get_doccount(table: &dyn Table) -> Result<u64> {
        Ok(read_aggregates(table)?.doccount)
    }

    pub fn get_total_length(table: &dyn Table) -> Result<u64> {
        Ok(read_aggregates(table)?.total_length)
    }

    /// Compensating update to the stored total document length: inserts
    /// pass `old_doclen = 0`, deletes pass `new_doclen = 0`.
    pub fn modify_total_length(
        table: &mut dyn MutableTable,
        old_doclen: u64,
        new_doclen: u64,
    ) -> Result<()> {
        let mut aggregates = read_aggregates(&*table)?;
        aggregates.total_length = aggregates
            .total_length
            .checked_sub(old_doclen)
            .ok_or_else(|| corrupt("total_length underflow"))?
            + new_doclen;
        write_aggregates(table, aggregates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{BufferedTable, DiskTable};

    fn empty_table() -> BufferedTable {
        BufferedTable::new(DiskTable::empty(None))
    }

    #[test]
    fn test_add_allocates_monotonic_docids() {
        let mut table = empty_table();

        let did1 = RecordManager::add_record(&mut table, b"one", 3).unwrap();
        let did2 = RecordManager::add_record(&mut table, b"two", 5).unwrap();
        assert_eq!(did1, 1);
        assert_eq!(did2, 2);
        assert_eq!(RecordManager::get_doccount(&table).unwrap(), 2);

        assert_eq!(RecordManager::get_record(&table, did1).unwrap(), b"one");
        assert_eq!(RecordManager::get_record(&table, did2).unwrap(), b"two");
    }

    #[test]
    fn test_docids_not_reused_after_delete() {
        let mut table = empty_table();

        let did1 = RecordManager::add_record(&mut table, b"one", 1).unwrap();
        RecordManager::delete_record(&mut table, did1).unwrap();
        assert_eq!(RecordManager::get_doccount(&table).unwrap(), 0);

        let did2 = RecordManager::add_record(&mut table, b"two", 1).unwrap();
        assert!(did2 > did1);
    }

    #[test]
    fn test_missing_record() {
        let mut table = empty_table();
        match RecordManager::get_record(&table, 7) {
            Err(ShaleError::DocumentNotFound(7)) => {}
            other => panic!("expected DocumentNotFound, got {:?}", other),
        }
        assert!(RecordManager::delete_record(&mut table, 7).is_err());
    }

    #[test]
    fn test_total_length_bookkeeping() {
        let mut table = empty_table();
        assert_eq!(RecordManager::get_total_length(&table).unwrap(), 0);

        RecordManager::modify_total_length(&mut table, 0, 10).unwrap();
        RecordManager::modify_total_length(&mut table, 0, 4).unwrap();
        assert_eq!(RecordManager::get_total_length(&table).unwrap(), 14);

        RecordManager::modify_total_length(&mut table, 10, 0).unwrap();
        assert_eq!(RecordManager::get_total_length(&table).unwrap(), 4);

        assert!(RecordManager::modify_total_length(&mut table, 100, 0).is_err());
    }
}
