//! Attribute table: per-document keyed values.
//!
//! Key layout: docid as 8 big-endian bytes followed by the key id as 4
//! big-endian bytes, so one document's attributes are contiguous and a
//! docid prefix scan collects them all.

use std::collections::BTreeMap;

use super::record::docid_key;
use crate::error::{Result, ShaleError};
use crate::models::{DocId, KeyId};
use crate::table::{MutableTable, Table};

fn attribute_key(did: DocId, key_id: KeyId) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&docid_key(did));
    key.extend_from_slice(&key_id.to_be_bytes());
    key
}

/// Stateless facade over the attribute table.
pub struct AttributeManager;

impl AttributeManager {
    /// Store one attribute value for `did` under `key_id`.
    pub fn add_attribute(
        table: &mut dyn MutableTable,
        did: DocId,
        key_id: KeyId,
        value: &[u8],
    ) -> Result<()> {
        table.put(attribute_key(did, key_id), value.to_vec())
    }

    /// One attribute of `did`, when stored.
    pub fn get_attribute(
        table: &dyn Table,
        did: DocId,
        key_id: KeyId,
    ) -> Result<Option<Vec<u8>>> {
        table.get(&attribute_key(did, key_id))
    }

    /// All attributes of `did`, keyed by key id.
    pub fn get_all_attributes(table: &dyn Table, did: DocId) -> Result<BTreeMap<KeyId, Vec<u8>>> {
        let mut attributes = BTreeMap::new();
        for (key, value) in table.scan_prefix(&docid_key(did))? {
            if key.len() != 12 {
                return Err(ShaleError::DatabaseCorrupt(format!(
                    "attribute table: bad key length {}",
                    key.len()
                )));
            }
            let mut key_id_bytes = [0u8; 4];
            key_id_bytes.copy_from_slice(&key[8..]);
            attributes.insert(KeyId::from_be_bytes(key_id_bytes), value);
        }
        Ok(attributes)
    }

    /// Remove every attribute stored for `did`.
    pub fn delete_all_attributes(table: &mut dyn MutableTable, did: DocId) -> Result<()> {
        let keys: Vec<Vec<u8>> = table
            .scan_prefix(&docid_key(did))?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            table.delete(&key)?;
        }
        Ok(())
    }
}
