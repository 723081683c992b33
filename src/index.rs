//! Maintenance of the property and value indexes.

use redb::WriteTransaction;

use crate::{
    derive::TermCounts,
    error::Result,
    store::{self, IndexTable},
};

/// What a delta changed, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexDelta {
    pub added: usize,
    pub removed: usize,
    pub recounted: usize,
}

impl IndexDelta {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.recounted == 0
    }
}

/// Bring the entries of record `id` from `old` to `new` inside `txn`.
///
/// Terms only in `old` are deleted, terms only in `new` are inserted and
/// terms whose occurrence count changed are rewritten. Entries shared with
/// the same count are left alone.
pub(crate) fn apply_delta(
    txn: &WriteTransaction,
    id: &str,
    old: &TermCounts,
    new: &TermCounts,
) -> Result<IndexDelta> {
    let mut delta = IndexDelta::default();
    let mut stale_props = Vec::new();
    let mut stale_values = Vec::new();
    for (key, entry) in old {
        if !new.contains_key(key) {
            stale_props.push(entry.term.property_key(id));
            stale_values.push(entry.term.value_key(id));
            delta.removed += 1;
        }
    }

    let mut props = Vec::new();
    let mut values = Vec::new();
    for (key, entry) in new {
        match old.get(key) {
            Some(prev) if prev.count == entry.count => continue,
            Some(_) => delta.recounted += 1,
            None => delta.added += 1,
        }
        props.push((entry.term.property_key(id), entry.count));
        values.push((entry.term.value_key(id), entry.count));
    }

    store::delete_index_entries(txn, IndexTable::Property, &stale_props)?;
    store::delete_index_entries(txn, IndexTable::Value, &stale_values)?;
    store::put_index_entries(txn, IndexTable::Property, &props)?;
    store::put_index_entries(txn, IndexTable::Value, &values)?;

    if !delta.is_empty() {
        tracing::debug!(
            id,
            added = delta.added,
            removed = delta.removed,
            recounted = delta.recounted,
            "updated index entries"
        );
    }
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use serde_json::json;

    use super::*;
    use crate::{
        config::Config,
        derive::{Deriver, IndexEntry},
        store::Store,
        text::Tokenizer,
        value::Value,
    };

    fn test_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            Store::open(&tmp.path().join("test.redb"), &Config::default())
                .unwrap();
        (tmp, store)
    }

    fn counts(json: serde_json::Value) -> TermCounts {
        let tokenizer = Tokenizer::default();
        Deriver::new(None, Some(&tokenizer)).record_counts(&Value::from(json))
    }

    fn entries(store: &Store, table: IndexTable) -> Vec<(IndexEntry, u64)> {
        store
            .index_entries(table, Bound::Unbounded, Bound::Unbounded)
            .map(|row| {
                let (key, count) = row.unwrap();
                let entry = match table {
                    IndexTable::Property => IndexEntry::from_property_key(&key),
                    IndexTable::Value => IndexEntry::from_value_key(&key),
                };
                (entry.unwrap(), count)
            })
            .collect()
    }

    #[test]
    fn insert_then_remove() {
        let (_tmp, store) = test_store();
        let new = counts(json!({"name": "joe", "age": 21}));
        let delta = store
            .write(|txn| apply_delta(txn, "P@1", &TermCounts::new(), &new))
            .unwrap();
        assert_eq!(delta.added, 2);
        assert_eq!(entries(&store, IndexTable::Property).len(), 2);
        assert_eq!(entries(&store, IndexTable::Value).len(), 2);

        let delta = store
            .write(|txn| apply_delta(txn, "P@1", &new, &TermCounts::new()))
            .unwrap();
        assert_eq!(delta.removed, 2);
        assert!(entries(&store, IndexTable::Property).is_empty());
        assert!(entries(&store, IndexTable::Value).is_empty());
    }

    #[test]
    fn only_changed_terms_are_touched() {
        let (_tmp, store) = test_store();
        let old = counts(json!({"name": "joe", "age": 21}));
        let new = counts(json!({"name": "joe", "age": 22}));
        store
            .write(|txn| apply_delta(txn, "P@1", &TermCounts::new(), &old))
            .unwrap();
        let delta = store
            .write(|txn| apply_delta(txn, "P@1", &old, &new))
            .unwrap();
        assert_eq!(
            delta,
            IndexDelta {
                added: 1,
                removed: 1,
                recounted: 0
            }
        );
        let ages: Vec<_> = entries(&store, IndexTable::Property)
            .into_iter()
            .filter(|(e, _)| e.path == ["age"])
            .map(|(e, _)| e.leaf)
            .collect();
        assert_eq!(ages, vec![crate::keys::KeyPart::Number(22.0)]);
    }

    #[test]
    fn repeated_tokens_are_recounted() {
        let (_tmp, store) = test_store();
        let old = counts(json!({"text": "go"}));
        let new = counts(json!({"text": "go go"}));
        store
            .write(|txn| apply_delta(txn, "T@1", &TermCounts::new(), &old))
            .unwrap();
        let delta = store
            .write(|txn| apply_delta(txn, "T@1", &old, &new))
            .unwrap();
        assert_eq!(delta.recounted, 1);
        let rows = entries(&store, IndexTable::Value);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, 2);
    }
}
