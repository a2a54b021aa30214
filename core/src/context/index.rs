//! Inverted index over context metadata.
//!
//! Answers "which values have metadata matching these key/value pairs" by
//! intersecting posting sets keyed on encoded `(type, field, value)` triples.

use std::collections::{BTreeSet, HashMap};

use super::types::{ContextId, ContextMetadata, ContextValueType};

const SEP: char = '\u{1f}';

/// Encode `value_type` and every field value of `meta` as posting keys.
///
/// The bare type is always included, so the result is never empty and a query
/// with empty metadata matches every value of that type.
pub fn encode_metadata_and_type(
    value_type: ContextValueType,
    meta: &ContextMetadata,
) -> BTreeSet<String> {
    let ty = value_type.as_str();
    let mut keys = BTreeSet::new();
    keys.insert(ty.to_string());
    for (field, values) in &meta.fields {
        for value in values {
            keys.insert(format!("{ty}{SEP}{field}{SEP}{value}"));
        }
    }
    keys
}

#[derive(Debug, Default)]
pub struct ContextIndex {
    // encoded key -> ids
    index: HashMap<String, BTreeSet<ContextId>>,
}

impl ContextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &str, value_type: ContextValueType, meta: &ContextMetadata) {
        for key in encode_metadata_and_type(value_type, meta) {
            self.index.entry(key).or_default().insert(id.to_string());
        }
    }

    /// Removing an id that is not indexed under a key is a no-op.
    pub fn remove(&mut self, id: &str, value_type: ContextValueType, meta: &ContextMetadata) {
        for key in encode_metadata_and_type(value_type, meta) {
            if let Some(set) = self.index.get_mut(&key) {
                set.remove(id);
                if set.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
    }

    /// Ids of type `value_type` matching every field value in `meta`.
    pub fn query(
        &self,
        value_type: ContextValueType,
        meta: &ContextMetadata,
    ) -> BTreeSet<ContextId> {
        let keys = encode_metadata_and_type(value_type, meta);
        let mut postings = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.index.get(key) {
                Some(set) => postings.push(set),
                None => return BTreeSet::new(),
            }
        }
        postings.sort_by_key(|s| s.len());

        let Some((smallest, rest)) = postings.split_first() else {
            return BTreeSet::new();
        };
        smallest
            .iter()
            .filter(|id| rest.iter().all(|set| set.contains(*id)))
            .cloned()
            .collect()
    }

    /// Number of distinct posting keys
    pub fn key_count(&self) -> usize {
        self.index.len()
    }
}
