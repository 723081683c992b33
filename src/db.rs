use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Bound,
    path::Path,
};

use redb::WriteTransaction;

use crate::{
    codec,
    config::{Config, DataDir},
    derive::{Deriver, IndexEntry, TermCounts},
    error::{Error, Result},
    index,
    pattern::Pattern,
    query::{Finish, IndexMatches, IndexQuery, IndexRange},
    schema::{Schema, SchemaOptions, SchemaRecord, SchemaRegistry},
    select::Projection,
    store::{self, IndexTable, Store, StoredRecord},
    text::Tokenizer,
    value::Value,
    vector::{self, VectorOptions, VectorQuery, VectorRange},
};

/// A stored record with its version.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: Value,
    pub version: u64,
    pub type_name: Option<String>,
}

/// Options of [`IndexDb::put`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Bind the record to this type, indexing it under the type's schema.
    pub type_name: Option<String>,
    /// Version to store; defaults to the previous version plus one.
    pub version: Option<u64>,
    /// Only write if the stored version equals this.
    pub if_version: Option<u64>,
}

impl PutOptions {
    pub fn of_type(type_name: &str) -> Self {
        Self {
            type_name: Some(type_name.to_string()),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn if_version(mut self, version: u64) -> Self {
        self.if_version = Some(version);
        self
    }
}

/// Options of [`IndexDb::copy`] and [`IndexDb::move_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Replace a record already stored under the destination.
    pub overwrite: bool,
    pub version: Option<u64>,
    /// Only proceed if the source's version equals this.
    pub if_version: Option<u64>,
}

impl CopyOptions {
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn if_version(mut self, version: u64) -> Self {
        self.if_version = Some(version);
        self
    }
}

/// One write transaction plus the schema changes it makes. Schema changes
/// are persisted with the transaction and published to the registry only
/// after it commits.
struct Txn<'t> {
    txn: &'t WriteTransaction,
    schemas: HashMap<String, Schema>,
}

impl Txn<'_> {
    fn schema(&mut self, registry: &SchemaRegistry, type_name: &str) -> Schema {
        if let Some(schema) = self.schemas.get(type_name) {
            return schema.clone();
        }
        if let Some(schema) = registry.get(type_name) {
            return schema;
        }
        let schema = Schema::new(type_name);
        self.schemas.insert(type_name.to_string(), schema.clone());
        schema
    }

    fn update_schema(&mut self, schema: Schema) {
        self.schemas.insert(schema.type_name.clone(), schema);
    }
}

/// An indexed record database.
///
/// Records bound to a type are indexed under the type's schema on every
/// write, inside the same transaction as the write itself.
///
/// # Examples
///
/// ```
/// # let tmp = tempfile::tempdir().unwrap();
/// use kvdex::{Config, IndexDb, IndexQuery, Pattern, PutOptions, Value};
///
/// let db = IndexDb::open(&tmp.path().join("db.redb"), Config::default()).unwrap();
/// let person = Value::object().with("name", "joe").with("age", 21);
/// let id = db.put(None, person, PutOptions::of_type("Person")).unwrap().unwrap();
///
/// let query = Pattern::object().with("name", "joe");
/// let hits: Vec<_> = db
///     .get_range_from_index(query, None, None, IndexQuery::of_type("Person"))
///     .unwrap()
///     .collect::<kvdex::Result<_>>()
///     .unwrap();
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].key, id);
/// ```
pub struct IndexDb {
    store: Store,
    config: Config,
    tokenizer: Option<Tokenizer>,
    schemas: SchemaRegistry,
}

impl IndexDb {
    /// Open or create a database at `path`.
    pub fn open(path: &Path, config: Config) -> Result<Self> {
        config.validate()?;
        let store = Store::open(path, &config)?;
        let schemas = SchemaRegistry::default();
        for record in store.load_schemas()? {
            schemas.insert(Schema::from_record(record));
        }
        tracing::debug!(
            path = %path.display(),
            schemas = schemas.type_names().len(),
            "opened database"
        );
        Ok(Self {
            store,
            tokenizer: config.tokenizer(),
            config,
            schemas,
        })
    }

    /// Open the database file inside a data directory.
    pub fn open_in(data_dir: &DataDir, config: Config) -> Result<Self> {
        Self::open(&data_dir.database(), config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -- Schemas --

    /// Define or update the schema of `type_name`.
    ///
    /// When the indexed paths change, the index entries of the type's
    /// records are rebuilt in the same transaction.
    pub fn define_schema(
        &self,
        type_name: &str,
        options: SchemaOptions,
    ) -> Result<Schema> {
        let old = self.schemas.get(type_name);
        let schema = self.schemas.resolve(type_name, options);
        self.write(|txn| {
            txn.update_schema(schema.clone());
            if let Some(old) = &old
                && old.indexed_paths != schema.indexed_paths
            {
                self.reindex_type(txn, old, &schema)?;
            }
            Ok(())
        })?;
        Ok(schema)
    }

    /// The schema of `type_name`. When absent it is created with defaults if
    /// `create` is set, and `None` is returned otherwise.
    pub fn get_schema(
        &self,
        type_name: &str,
        create: bool,
    ) -> Result<Option<Schema>> {
        if let Some(schema) = self.schemas.get(type_name) {
            return Ok(Some(schema));
        }
        if !create {
            return Ok(None);
        }
        let (schema, created) = self.schemas.get_or_create(type_name);
        if created {
            self.store
                .write(|txn| store::write_schema(txn, &schema.to_record()))?;
        }
        Ok(Some(schema))
    }

    // -- Records --

    pub fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.store.get_record(key)?.map(|record| Entry {
            key: key.to_string(),
            value: codec::decode(record.value),
            version: record.version,
            type_name: record.type_name,
        }))
    }

    /// Store a record and return its key.
    ///
    /// Without a key, a typed record gets the identity it carries or a fresh
    /// `<Type>@<id>`, and an untyped record a fresh uuid. Returns `Ok(None)`
    /// when `if_version` does not match the stored version.
    pub fn put(
        &self,
        key: Option<&str>,
        value: impl Into<Value>,
        options: PutOptions,
    ) -> Result<Option<String>> {
        let mut value = value.into();
        self.write(|txn| {
            let (key, type_name) = match (key, &options.type_name) {
                (Some(key), type_name) => (key.to_string(), type_name.clone()),
                (None, Some(type_name)) => {
                    let schema = txn.schema(&self.schemas, type_name);
                    let key = match schema.identity_of(&value) {
                        Some(Value::String(id)) => id.clone(),
                        Some(other) => {
                            return Err(Error::InvalidOption(format!(
                                "identity {other} is not a string"
                            )));
                        }
                        None => schema.generate_id(),
                    };
                    (key, Some(type_name.clone()))
                }
                (None, None) => (uuid::Uuid::new_v4().to_string(), None),
            };
            let prev = store::read_record(txn.txn, &key)?;
            let type_name = type_name
                .or_else(|| prev.as_ref().and_then(|p| p.type_name.clone()))
                .or_else(|| self.type_of_key(&key));

            if let Some(type_name) = &type_name {
                check_key_type(&key, type_name)?;
                let schema = txn.schema(&self.schemas, type_name);
                bind_identity(&schema, &key, &mut value)?;
            }

            if !version_matches(prev.as_ref(), options.if_version) {
                tracing::debug!(key = %key, "put skipped: version mismatch");
                return Ok(None);
            }
            let value = std::mem::take(&mut value);
            self.put_in(txn, &key, value, type_name, options.version, prev)?;
            Ok(Some(key))
        })
    }

    /// Deep-merge `patch` into the stored record; an `Undefined` property
    /// deletes the property. Returns `Ok(false)` when the record is missing
    /// or `if_version` does not match.
    pub fn patch(
        &self,
        key: &str,
        patch: impl Into<Value>,
        version: Option<u64>,
        if_version: Option<u64>,
    ) -> Result<bool> {
        let patch = patch.into();
        self.write(|txn| {
            let Some(prev) = store::read_record(txn.txn, key)? else {
                return Ok(false);
            };
            if !version_matches(Some(&prev), if_version) {
                tracing::debug!(key, "patch skipped: version mismatch");
                return Ok(false);
            }
            let mut merged = codec::decode(prev.value.clone());
            merge(&mut merged, patch);
            let type_name = prev.type_name.clone();
            if let Some(type_name) = &type_name {
                let schema = txn.schema(&self.schemas, type_name);
                bind_identity(&schema, key, &mut merged)?;
            }
            self.put_in(txn, key, merged, type_name, version, Some(prev))?;
            Ok(true)
        })
    }

    /// Remove a record with its index entries and vector. Returns the key,
    /// or `Ok(None)` if nothing was removed.
    pub fn remove(
        &self,
        key: &str,
        if_version: Option<u64>,
    ) -> Result<Option<String>> {
        self.write(|txn| {
            let Some(prev) = store::read_record(txn.txn, key)? else {
                return Ok(None);
            };
            if !version_matches(Some(&prev), if_version) {
                tracing::debug!(key, "remove skipped: version mismatch");
                return Ok(None);
            }
            self.remove_in(txn, key, prev)?;
            Ok(Some(key.to_string()))
        })
    }

    /// Copy a record to `dest`, or to a fresh identity when `dest` is
    /// `None`. Returns the new key.
    pub fn copy(
        &self,
        key: &str,
        dest: Option<&str>,
        options: CopyOptions,
    ) -> Result<Option<String>> {
        self.write(|txn| {
            Ok(self.copy_in(txn, key, dest, &options)?.map(|(dest, _)| dest))
        })
    }

    /// Copy a record to `dest` (or a fresh identity) and remove the source,
    /// in one transaction.
    pub fn move_key(
        &self,
        key: &str,
        dest: Option<&str>,
        options: CopyOptions,
    ) -> Result<Option<String>> {
        if dest == Some(key) {
            return Ok(self.get(key)?.map(|_| key.to_string()));
        }
        self.write(|txn| {
            let Some((dest, source)) = self.copy_in(txn, key, dest, &options)?
            else {
                return Ok(None);
            };
            self.remove_in(txn, key, source)?;
            Ok(Some(dest))
        })
    }

    // -- Queries --

    /// Records matching `pattern` through the indexes.
    ///
    /// Candidates are verified against `value_match`, which defaults to
    /// `pattern` itself for strict queries; ranked (sortable or full-text)
    /// queries keep partial matches unless a `value_match` is given.
    /// `select` projects each yielded value.
    pub fn get_range_from_index(
        &self,
        pattern: impl Into<Pattern>,
        value_match: Option<Pattern>,
        select: Option<Projection>,
        options: IndexQuery,
    ) -> Result<IndexRange<'_>> {
        options.validate()?;
        let pattern = pattern.into();
        let schema = options
            .type_name
            .as_deref()
            .and_then(|t| self.schemas.get(t));
        let paths = schema.as_ref().and_then(|s| s.indexed_paths.as_deref());
        let terms = Deriver::new(paths, self.tokenizer.as_ref())
            .query_terms(&pattern);
        tracing::debug!(
            terms = terms.len(),
            type_name = ?options.type_name,
            ranked = options.ranked(),
            "index query"
        );

        let value_match = match value_match {
            Some(pattern) => Some(pattern),
            None if !options.ranked() => Some(pattern),
            None => None,
        };
        let finish =
            Finish::new(value_match, select, options.offset, options.limit);
        let matches = IndexMatches::new(
            &self.store,
            terms,
            &options,
            self.tokenizer.is_some(),
        );
        IndexRange::new(&self.store, matches, finish, &options)
    }

    /// Records whose feature vectors lie within `max_distance` of the query.
    pub fn get_range_from_vector(
        &self,
        query: impl Into<VectorQuery>,
        value_match: Option<Pattern>,
        select: Option<Projection>,
        options: VectorOptions,
    ) -> Result<VectorRange<'_>> {
        options.validate()?;
        let schema = self.vector_schema(options.type_name.as_deref())?;
        let vector = match query.into() {
            VectorQuery::Vector(vector) => vector,
            VectorQuery::Value(value) => {
                let Some(schema) = schema else {
                    return Err(Error::InvalidOption(
                        "a value vector query needs a type".into(),
                    ));
                };
                vector::get_vector(&schema, &value)
            }
        };
        tracing::debug!(
            dimensions = vector.len(),
            type_name = ?options.type_name,
            sort = options.sort,
            "vector query"
        );
        let finish =
            Finish::new(value_match, select, options.offset, options.limit);
        VectorRange::new(&self.store, vector, options, finish)
    }

    /// Recompute the stored vectors of every record of `type_name` from the
    /// schema's current feature statistics. Returns the number of records
    /// visited.
    pub fn reindex_vectors(&self, type_name: &str) -> Result<usize> {
        let schema = self
            .vector_schema(Some(type_name))?
            .ok_or_else(|| Error::VectorsDisabled(type_name.to_string()))?;
        let records = self
            .store
            .records(
                Bound::Included(format!("{type_name}@")),
                Bound::Excluded(format!("{type_name}A")),
            )
            .collect::<Result<Vec<_>>>()?;
        let count = records.len();
        self.store.write(|txn| {
            for (key, record) in records {
                let value = codec::decode(record.value);
                write_vector(txn, &key, &vector::get_vector(&schema, &value))?;
            }
            Ok(())
        })?;
        tracing::debug!(type_name, records = count, "reindexed vectors");
        Ok(count)
    }

    /// Compare every index entry with a fresh derivation of the records and
    /// return the ids whose entries disagree.
    pub fn check_integrity(&self) -> Result<Vec<String>> {
        let mut actual: BTreeMap<String, Entries> = BTreeMap::new();
        for table in [IndexTable::Property, IndexTable::Value] {
            let rows =
                self.store
                    .index_entries(table, Bound::Unbounded, Bound::Unbounded);
            for row in rows {
                let (key, count) = row?;
                let entry = match table {
                    IndexTable::Property => IndexEntry::from_property_key(&key)?,
                    IndexTable::Value => IndexEntry::from_value_key(&key)?,
                };
                actual
                    .entry(entry.id)
                    .or_default()
                    .table_mut(table)
                    .insert(key, count);
            }
        }

        let mut expected: BTreeMap<String, Entries> = BTreeMap::new();
        for row in self.store.records(Bound::Unbounded, Bound::Unbounded) {
            let (key, record) = row?;
            let Some(type_name) = &record.type_name else {
                continue;
            };
            let schema = self
                .schemas
                .get(type_name)
                .unwrap_or_else(|| Schema::new(type_name));
            let counts = self.terms(&schema, &codec::decode(record.value));
            if counts.is_empty() {
                continue;
            }
            let entries = expected.entry(key.clone()).or_default();
            for term in counts.values() {
                entries
                    .property
                    .insert(term.term.property_key(&key), term.count);
                entries.value.insert(term.term.value_key(&key), term.count);
            }
        }

        let ids: BTreeSet<&String> = actual.keys().chain(expected.keys()).collect();
        let broken: Vec<String> = ids
            .into_iter()
            .filter(|id| actual.get(*id) != expected.get(*id))
            .cloned()
            .collect();
        if !broken.is_empty() {
            tracing::warn!(records = broken.len(), "index entries out of sync");
        }
        Ok(broken)
    }

    // -- Internals --

    fn write<T>(&self, f: impl FnOnce(&mut Txn<'_>) -> Result<T>) -> Result<T> {
        let (out, changed) = self.store.write(|txn| {
            let mut scope = Txn {
                txn,
                schemas: HashMap::new(),
            };
            let out = f(&mut scope)?;
            for schema in scope.schemas.values() {
                store::write_schema(txn, &schema.to_record())?;
            }
            Ok((out, scope.schemas))
        })?;
        for schema in changed.into_values() {
            self.schemas.insert(schema);
        }
        Ok(out)
    }

    /// Move the index entries of every record of `new`'s type from `old`'s
    /// indexed paths to `new`'s.
    fn reindex_type(&self, txn: &Txn<'_>, old: &Schema, new: &Schema) -> Result<()> {
        let records = store::read_typed_records(txn.txn, &new.type_name)?;
        let (mut added, mut removed) = (0, 0);
        for (key, record) in &records {
            let value = codec::decode(record.value.clone());
            let old_terms = self.terms(old, &value);
            let new_terms = self.terms(new, &value);
            let delta = index::apply_delta(txn.txn, key, &old_terms, &new_terms)?;
            added += delta.added;
            removed += delta.removed;
        }
        tracing::info!(
            type_name = %new.type_name,
            records = records.len(),
            added,
            removed,
            "reindexed records for new indexed paths"
        );
        Ok(())
    }

    fn terms(&self, schema: &Schema, value: &Value) -> TermCounts {
        Deriver::new(schema.indexed_paths.as_deref(), self.tokenizer.as_ref())
            .record_counts(value)
    }

    fn stored_terms(&self, txn: &mut Txn<'_>, record: &StoredRecord) -> TermCounts {
        match &record.type_name {
            Some(type_name) => {
                let schema = txn.schema(&self.schemas, type_name);
                self.terms(&schema, &codec::decode(record.value.clone()))
            }
            None => TermCounts::new(),
        }
    }

    /// A registered type named by the `<Type>@` prefix of `key`.
    fn type_of_key(&self, key: &str) -> Option<String> {
        let (type_name, _) = key.split_once('@')?;
        self.schemas.get(type_name).map(|s| s.type_name)
    }

    /// The schema vector queries run against, after checking that vectors
    /// are enabled for it.
    fn vector_schema(&self, type_name: Option<&str>) -> Result<Option<Schema>> {
        if !self.config.vectors {
            return Err(Error::VectorsDisabled("this database".into()));
        }
        let Some(type_name) = type_name else {
            return Ok(None);
        };
        match self.schemas.get(type_name) {
            Some(schema) if schema.has_vectors() => Ok(Some(schema)),
            _ => Err(Error::VectorsDisabled(type_name.to_string())),
        }
    }

    /// Write `value` under `key` and bring its index entries and vector in
    /// line with it.
    fn put_in(
        &self,
        txn: &mut Txn<'_>,
        key: &str,
        value: Value,
        type_name: Option<String>,
        version: Option<u64>,
        prev: Option<StoredRecord>,
    ) -> Result<()> {
        let old_terms = match &prev {
            Some(record) => self.stored_terms(txn, record),
            None => TermCounts::new(),
        };
        let mut schema = type_name
            .as_deref()
            .map(|t| txn.schema(&self.schemas, t));
        let new_terms = match &schema {
            Some(schema) => self.terms(schema, &value),
            None => TermCounts::new(),
        };

        let vector = match &mut schema {
            Some(schema) if self.config.vectors && schema.has_vectors() => {
                if vector::learn(&mut schema.vector_paths, &value) {
                    txn.update_schema(schema.clone());
                }
                vector::get_vector(schema, &value)
            }
            _ => Vec::new(),
        };
        write_vector(txn.txn, key, &vector)?;

        let version = version
            .or_else(|| prev.as_ref().map(|p| p.version + 1))
            .unwrap_or(1);
        let record = StoredRecord {
            version,
            type_name,
            value: codec::encode(&value, self.config.keep_undefined),
        };
        store::write_record(txn.txn, key, &record)?;
        let delta = index::apply_delta(txn.txn, key, &old_terms, &new_terms)?;
        tracing::debug!(
            key,
            version,
            terms = new_terms.len(),
            added = delta.added,
            removed = delta.removed,
            "stored record"
        );
        Ok(())
    }

    fn remove_in(
        &self,
        txn: &mut Txn<'_>,
        key: &str,
        prev: StoredRecord,
    ) -> Result<()> {
        let old_terms = self.stored_terms(txn, &prev);
        store::delete_record(txn.txn, key)?;
        store::delete_vector(txn.txn, key)?;
        index::apply_delta(txn.txn, key, &old_terms, &TermCounts::new())?;
        tracing::debug!(key, terms = old_terms.len(), "removed record");
        Ok(())
    }

    /// Returns the destination key and the source record.
    fn copy_in(
        &self,
        txn: &mut Txn<'_>,
        key: &str,
        dest: Option<&str>,
        options: &CopyOptions,
    ) -> Result<Option<(String, StoredRecord)>> {
        let Some(source) = store::read_record(txn.txn, key)? else {
            return Ok(None);
        };
        if !version_matches(Some(&source), options.if_version) {
            tracing::debug!(key, "copy skipped: version mismatch");
            return Ok(None);
        }
        let type_name = source.type_name.clone();
        let dest = match (dest, &type_name) {
            (Some(dest), _) => dest.to_string(),
            (None, Some(type_name)) => {
                txn.schema(&self.schemas, type_name).generate_id()
            }
            (None, None) => uuid::Uuid::new_v4().to_string(),
        };

        if let Some(type_name) = &type_name {
            check_key_type(&dest, type_name)?;
        }
        let existing = store::read_record(txn.txn, &dest)?;
        if existing.is_some() && !options.overwrite {
            return Err(Error::AlreadyExists(dest));
        }
        let mut value = codec::decode(source.value.clone());
        if let Some(type_name) = &type_name {
            let schema = txn.schema(&self.schemas, type_name);
            rebind_identity(&schema, &dest, &mut value);
        }
        self.put_in(txn, &dest, value, type_name, options.version, existing)?;
        tracing::debug!(from = key, to = %dest, "copied record");
        Ok(Some((dest, source)))
    }
}

/// Index entries of one record, per table.
#[derive(Debug, Default, PartialEq)]
struct Entries {
    property: BTreeMap<Vec<u8>, u64>,
    value: BTreeMap<Vec<u8>, u64>,
}

impl Entries {
    fn table_mut(&mut self, table: IndexTable) -> &mut BTreeMap<Vec<u8>, u64> {
        match table {
            IndexTable::Property => &mut self.property,
            IndexTable::Value => &mut self.value,
        }
    }
}

fn version_matches(record: Option<&StoredRecord>, if_version: Option<u64>) -> bool {
    match if_version {
        Some(expected) => record.is_some_and(|r| r.version == expected),
        None => true,
    }
}

/// Typed records must live under `<Type>@`, the key space typed queries scan.
fn check_key_type(key: &str, type_name: &str) -> Result<()> {
    let in_space = key
        .strip_prefix(type_name)
        .is_some_and(|rest| rest.starts_with('@'));
    if in_space {
        Ok(())
    } else {
        Err(Error::KeyType {
            key: key.to_string(),
            type_name: type_name.to_string(),
        })
    }
}

/// Check that an object's identity agrees with `key`, filling it in when
/// absent.
fn bind_identity(schema: &Schema, key: &str, value: &mut Value) -> Result<()> {
    match schema.identity_of(value) {
        Some(Value::String(id)) if id == key => Ok(()),
        Some(id) => Err(Error::Conflict {
            key: key.to_string(),
            id: id.coerce_str().unwrap_or_else(|| id.to_string()),
        }),
        None => {
            if let Some(map) = value.as_object_mut() {
                map.insert(schema.id_property.clone(), Value::from(key));
            }
            Ok(())
        }
    }
}

/// Point an object's identity at a new key.
fn rebind_identity(schema: &Schema, key: &str, value: &mut Value) {
    if let Some(map) = value.as_object_mut() {
        map.insert(schema.id_property.clone(), Value::from(key));
    }
}

/// Store the vector, or drop a stale one when there is nothing to store.
fn write_vector(
    txn: &WriteTransaction,
    key: &str,
    vector: &[Option<f32>],
) -> Result<()> {
    if vector.iter().any(Option::is_some) {
        store::write_vector(txn, key, vector)
    } else {
        store::delete_vector(txn, key)
    }
}

/// Deep-merge `patch` into `target`. Objects merge property by property and
/// an undefined patch property deletes the target's; anything else replaces.
fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_undefined() {
                    target.remove(&key);
                    continue;
                }
                match target.get_mut(&key) {
                    Some(existing)
                        if existing.as_object().is_some()
                            && value.as_object().is_some() =>
                    {
                        merge(existing, value);
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

impl std::fmt::Debug for IndexDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDb")
            .field("config", &self.config)
            .field("schemas", &self.schemas)
            .finish_non_exhaustive()
    }
}
