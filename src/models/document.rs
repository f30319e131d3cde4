use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique document identifier. Zero is reserved and never allocated.
pub type DocId = u64;

/// Per-document attribute key identifier.
pub type KeyId = u32;

/// A term's occurrence data within one document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTerm {
    /// Within-document frequency: number of occurrences of the term in the
    /// document.
    pub wdf: u64,
    /// Cached term frequency (number of documents containing the term).
    /// Filled in when the document is read back; ignored on insert.
    pub termfreq: u64,
    /// Occurrence positions within the document, ascending.
    pub positions: Vec<u32>,
}

impl DocumentTerm {
    pub fn new(wdf: u64) -> Self {
        Self {
            wdf,
            termfreq: 0,
            positions: Vec::new(),
        }
    }

    pub fn with_positions(wdf: u64, positions: Vec<u32>) -> Self {
        Self {
            wdf,
            termfreq: 0,
            positions,
        }
    }
}

/// The full contents of one document: opaque record data, keyed attributes,
/// and the indexed terms with their positions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContents {
    /// Opaque record payload.
    pub data: Vec<u8>,
    /// Per-key attribute values.
    pub keys: BTreeMap<KeyId, Vec<u8>>,
    /// Indexed terms, keyed by term name.
    pub terms: BTreeMap<String, DocumentTerm>,
}

impl DocumentContents {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            keys: BTreeMap::new(),
            terms: BTreeMap::new(),
        }
    }

    /// Add an attribute value under the given key.
    pub fn add_key(&mut self, key_id: KeyId, value: impl Into<Vec<u8>>) {
        self.keys.insert(key_id, value.into());
    }

    /// Add a term with the given within-document frequency and positions.
    pub fn add_term(&mut self, term: impl Into<String>, wdf: u64, positions: Vec<u32>) {
        self.terms
            .insert(term.into(), DocumentTerm::with_positions(wdf, positions));
    }

    /// Document length: the sum of the within-document frequencies of all
    /// indexed terms.
    pub fn length(&self) -> u64 {
        self.terms.values().map(|t| t.wdf).sum()
    }
}
