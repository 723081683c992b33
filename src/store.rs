use std::{collections::VecDeque, ops::Bound, path::Path};

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{Error, Result},
    schema::SchemaRecord,
};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
const PROPERTY_INDEX: TableDefinition<&[u8], u64> =
    TableDefinition::new("property_index");
const VALUE_INDEX: TableDefinition<&[u8], u64> =
    TableDefinition::new("value_index");
const VECTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");
const SCHEMAS: TableDefinition<&str, &[u8]> = TableDefinition::new("schemas");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// A record as persisted in the primary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub version: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexTable {
    Property,
    Value,
}

impl IndexTable {
    fn definition(self) -> TableDefinition<'static, &'static [u8], u64> {
        match self {
            Self::Property => PROPERTY_INDEX,
            Self::Value => VALUE_INDEX,
        }
    }
}

/// The redb database behind an [`crate::IndexDb`]: one primary table, the
/// two indexes, vectors, schemas and settings.
pub(crate) struct Store {
    db: Database,
    batch: usize,
}

impl Store {
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(RECORDS)?;
        txn.open_table(PROPERTY_INDEX)?;
        txn.open_table(VALUE_INDEX)?;
        txn.open_table(VECTORS)?;
        txn.open_table(SCHEMAS)?;
        {
            let mut settings = txn.open_table(SETTINGS)?;
            for (name, wanted) in config.index_settings()? {
                let stored = settings.get(name)?.map(|v| v.value().to_string());
                match stored {
                    Some(stored) if stored != wanted => {
                        return Err(Error::Config(format!(
                            "database was indexed with {name} = {stored}, \
                             reopened with {wanted}"
                        )));
                    }
                    Some(_) => {}
                    None => {
                        settings.insert(name, wanted.as_str())?;
                    }
                }
            }
        }
        txn.commit()?;

        Ok(Self {
            db,
            batch: config.scan_batch,
        })
    }

    /// Run `f` in one write transaction, committing on `Ok` and aborting on
    /// `Err` so that nothing `f` wrote becomes visible.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> Result<T>,
    ) -> Result<T> {
        let txn = self.db.begin_write()?;
        match f(&txn) {
            Ok(out) => {
                txn.commit()?;
                Ok(out)
            }
            Err(err) => {
                txn.abort()?;
                Err(err)
            }
        }
    }

    pub fn get_record(&self, key: &str) -> Result<Option<StoredRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        match table.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    pub fn load_schemas(&self) -> Result<Vec<SchemaRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SCHEMAS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn index_entries(
        &self,
        table: IndexTable,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> Scan<'_, Vec<u8>, u64> {
        let fetch: FetchFn<Vec<u8>, u64> = match table {
            IndexTable::Property => fetch_property_index,
            IndexTable::Value => fetch_value_index,
        };
        Scan::new(self, fetch, start, end)
    }

    pub fn records(
        &self,
        start: Bound<String>,
        end: Bound<String>,
    ) -> Scan<'_, String, StoredRecord> {
        Scan::new(self, fetch_records, start, end)
    }

    pub fn vectors(
        &self,
        start: Bound<String>,
        end: Bound<String>,
    ) -> Scan<'_, String, Vec<Option<f32>>> {
        Scan::new(self, fetch_vectors, start, end)
    }

    fn fetch_index(
        &self,
        table: IndexTable,
        start: &Bound<Vec<u8>>,
        end: &Bound<Vec<u8>>,
    ) -> Result<Vec<(Vec<u8>, u64)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table.definition())?;
        let range = (
            start.as_ref().map(Vec::as_slice),
            end.as_ref().map(Vec::as_slice),
        );
        let mut rows = Vec::new();
        for entry in table.range::<&[u8]>(range)?.take(self.batch) {
            let (k, v) = entry?;
            rows.push((k.value().to_vec(), v.value()));
        }
        Ok(rows)
    }

    fn fetch_str<T>(
        &self,
        definition: TableDefinition<&str, &[u8]>,
        start: &Bound<String>,
        end: &Bound<String>,
        decode: impl Fn(&[u8]) -> Result<T>,
    ) -> Result<Vec<(String, T)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(definition)?;
        let range = (
            start.as_ref().map(String::as_str),
            end.as_ref().map(String::as_str),
        );
        let mut rows = Vec::new();
        for entry in table.range::<&str>(range)?.take(self.batch) {
            let (k, v) = entry?;
            rows.push((k.value().to_string(), decode(v.value())?));
        }
        Ok(rows)
    }
}

type FetchFn<K, T> = fn(&Store, &Bound<K>, &Bound<K>) -> Result<Vec<(K, T)>>;

fn fetch_property_index(
    store: &Store,
    start: &Bound<Vec<u8>>,
    end: &Bound<Vec<u8>>,
) -> Result<Vec<(Vec<u8>, u64)>> {
    store.fetch_index(IndexTable::Property, start, end)
}

fn fetch_value_index(
    store: &Store,
    start: &Bound<Vec<u8>>,
    end: &Bound<Vec<u8>>,
) -> Result<Vec<(Vec<u8>, u64)>> {
    store.fetch_index(IndexTable::Value, start, end)
}

fn fetch_records(
    store: &Store,
    start: &Bound<String>,
    end: &Bound<String>,
) -> Result<Vec<(String, StoredRecord)>> {
    store.fetch_str(RECORDS, start, end, |bytes| {
        Ok(serde_json::from_slice(bytes)?)
    })
}

fn fetch_vectors(
    store: &Store,
    start: &Bound<String>,
    end: &Bound<String>,
) -> Result<Vec<(String, Vec<Option<f32>>)>> {
    store.fetch_str(VECTORS, start, end, |bytes| Ok(unpack_vector(bytes)))
}

/// A lazy range read. Rows are fetched in batches, each in its own short
/// read transaction, resuming after the last key seen; dropping the scan
/// early holds nothing open.
pub(crate) struct Scan<'s, K, T> {
    store: &'s Store,
    fetch: FetchFn<K, T>,
    start: Bound<K>,
    end: Bound<K>,
    buffer: VecDeque<(K, T)>,
    done: bool,
}

impl<'s, K: Clone, T> Scan<'s, K, T> {
    fn new(
        store: &'s Store,
        fetch: FetchFn<K, T>,
        start: Bound<K>,
        end: Bound<K>,
    ) -> Self {
        Self {
            store,
            fetch,
            start,
            end,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let rows = (self.fetch)(self.store, &self.start, &self.end)?;
        if rows.len() < self.store.batch {
            self.done = true;
        }
        if let Some((last, _)) = rows.last() {
            self.start = Bound::Excluded(last.clone());
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl<K: Clone, T> Iterator for Scan<'_, K, T> {
    type Item = Result<(K, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(err) = self.refill() {
                self.done = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

// -- Write-transaction helpers --

pub(crate) fn read_record(
    txn: &WriteTransaction,
    key: &str,
) -> Result<Option<StoredRecord>> {
    let table = txn.open_table(RECORDS)?;
    match table.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
        None => Ok(None),
    }
}

/// Records in the `<type_name>@` key space that are bound to `type_name`.
pub(crate) fn read_typed_records(
    txn: &WriteTransaction,
    type_name: &str,
) -> Result<Vec<(String, StoredRecord)>> {
    let table = txn.open_table(RECORDS)?;
    let start = format!("{type_name}@");
    let end = format!("{type_name}A");
    let mut rows = Vec::new();
    for entry in table.range::<&str>(start.as_str()..end.as_str())? {
        let (k, v) = entry?;
        let record: StoredRecord = serde_json::from_slice(v.value())?;
        if record.type_name.as_deref() == Some(type_name) {
            rows.push((k.value().to_string(), record));
        }
    }
    Ok(rows)
}

pub(crate) fn write_record(
    txn: &WriteTransaction,
    key: &str,
    record: &StoredRecord,
) -> Result<()> {
    let bytes = serde_json::to_vec(record)?;
    let mut table = txn.open_table(RECORDS)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

pub(crate) fn delete_record(txn: &WriteTransaction, key: &str) -> Result<bool> {
    let mut table = txn.open_table(RECORDS)?;
    let removed = table.remove(key)?.is_some();
    Ok(removed)
}

pub(crate) fn write_vector(
    txn: &WriteTransaction,
    key: &str,
    vector: &[Option<f32>],
) -> Result<()> {
    let bytes = pack_vector(vector);
    let mut table = txn.open_table(VECTORS)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

pub(crate) fn delete_vector(txn: &WriteTransaction, key: &str) -> Result<()> {
    let mut table = txn.open_table(VECTORS)?;
    table.remove(key)?;
    Ok(())
}

pub(crate) fn write_schema(
    txn: &WriteTransaction,
    record: &SchemaRecord,
) -> Result<()> {
    let bytes = serde_json::to_vec(record)?;
    let mut table = txn.open_table(SCHEMAS)?;
    table.insert(record.type_name.as_str(), bytes.as_slice())?;
    Ok(())
}

/// Insert or overwrite index entries with their counts.
pub(crate) fn put_index_entries(
    txn: &WriteTransaction,
    table: IndexTable,
    entries: &[(Vec<u8>, u64)],
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut table = txn.open_table(table.definition())?;
    for (key, count) in entries {
        table.insert(key.as_slice(), *count)?;
    }
    Ok(())
}

pub(crate) fn delete_index_entries(
    txn: &WriteTransaction,
    table: IndexTable,
    keys: &[Vec<u8>],
) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let mut table = txn.open_table(table.definition())?;
    for key in keys {
        table.remove(key.as_slice())?;
    }
    Ok(())
}

/// Missing features are stored as NaN.
fn pack_vector(vector: &[Option<f32>]) -> Vec<u8> {
    let floats: Vec<f32> =
        vector.iter().map(|v| v.unwrap_or(f32::NAN)).collect();
    bytemuck::cast_slice(&floats).to_vec()
}

fn unpack_vector(bytes: &[u8]) -> Vec<Option<f32>> {
    let present = |f: f32| (!f.is_nan()).then_some(f);
    // Slices handed out by redb are not guaranteed to be f32-aligned.
    match bytemuck::try_cast_slice::<u8, f32>(bytes) {
        Ok(floats) => floats.iter().copied().map(present).collect(),
        Err(_) => bytes
            .chunks_exact(4)
            .map(|c| present(f32::from_ne_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
    }
}
