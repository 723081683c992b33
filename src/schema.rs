//! Per-type configuration: identity, indexed paths and vector features.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Property holding a record's identity unless a schema names another.
pub const DEFAULT_ID_PROPERTY: &str = "#";

pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

fn uuid_generator() -> IdGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// Split a dotted path (`"address.city"`) into segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

/// One position of a record's feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFeature {
    pub path: Vec<String>,
    pub kind: FeatureKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Rescaled into `[0, 1]` by `min`/`max`. Unfixed bounds widen as records
    /// are written.
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
        fixed: bool,
    },
    /// Mapped to `(index + 1) / values.len()`. Unfixed lists grow as new
    /// categories are written; unknown values of a fixed list are missing.
    Categorical { values: Vec<String>, fixed: bool },
}

impl VectorFeature {
    /// A numeric feature whose bounds are learned from written records.
    pub fn numeric(path: &str) -> Self {
        Self {
            path: split_path(path),
            kind: FeatureKind::Numeric {
                min: None,
                max: None,
                fixed: false,
            },
        }
    }

    pub fn numeric_range(path: &str, min: f64, max: f64) -> Self {
        Self {
            path: split_path(path),
            kind: FeatureKind::Numeric {
                min: Some(min),
                max: Some(max),
                fixed: true,
            },
        }
    }

    /// A categorical feature learning its categories from written records.
    pub fn categorical(path: &str) -> Self {
        Self {
            path: split_path(path),
            kind: FeatureKind::Categorical {
                values: Vec::new(),
                fixed: false,
            },
        }
    }

    pub fn categories<S: AsRef<str>>(path: &str, values: &[S]) -> Self {
        Self {
            path: split_path(path),
            kind: FeatureKind::Categorical {
                values: values.iter().map(|v| v.as_ref().to_string()).collect(),
                fixed: true,
            },
        }
    }
}

/// Options for [`crate::IndexDb::define_schema`]. Unset options keep their
/// current (or inherited) values.
#[derive(Clone, Default)]
pub struct SchemaOptions {
    pub id_property: Option<String>,
    pub indexed_paths: Option<Vec<String>>,
    pub vector_paths: Option<Vec<VectorFeature>>,
    /// Type whose options are inherited when first defining this one.
    pub parent: Option<String>,
    pub id_generator: Option<IdGenerator>,
}

impl SchemaOptions {
    pub fn id_property(mut self, name: &str) -> Self {
        self.id_property = Some(name.to_string());
        self
    }

    pub fn indexed_paths<S: AsRef<str>>(mut self, paths: &[S]) -> Self {
        self.indexed_paths =
            Some(paths.iter().map(|p| p.as_ref().to_string()).collect());
        self
    }

    pub fn vector_paths(mut self, features: Vec<VectorFeature>) -> Self {
        self.vector_paths = Some(features);
        self
    }

    pub fn parent(mut self, type_name: &str) -> Self {
        self.parent = Some(type_name.to_string());
        self
    }

    pub fn id_generator<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(f));
        self
    }
}

#[derive(Clone)]
pub struct Schema {
    pub type_name: String,
    pub id_property: String,
    /// `None` indexes every path.
    pub indexed_paths: Option<Vec<Vec<String>>>,
    pub vector_paths: Vec<VectorFeature>,
    pub parent: Option<String>,
    id_generator: IdGenerator,
}

impl Schema {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            id_property: DEFAULT_ID_PROPERTY.to_string(),
            indexed_paths: None,
            vector_paths: Vec::new(),
            parent: None,
            id_generator: uuid_generator(),
        }
    }

    /// A fresh identity of the form `<TypeName>@<unique>`.
    pub fn generate_id(&self) -> String {
        format!("{}@{}", self.type_name, (self.id_generator)())
    }

    /// The identity stored in the record, if it carries one.
    pub fn identity_of<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        value
            .as_object()?
            .get(&self.id_property)
            .filter(|v| !v.is_undefined())
    }

    pub fn has_vectors(&self) -> bool {
        !self.vector_paths.is_empty()
    }

    fn apply(&mut self, options: SchemaOptions) {
        if let Some(id_property) = options.id_property {
            self.id_property = id_property;
        }
        if let Some(paths) = options.indexed_paths {
            self.indexed_paths =
                Some(paths.iter().map(|p| split_path(p)).collect());
        }
        if let Some(features) = options.vector_paths {
            self.vector_paths = features;
        }
        if let Some(parent) = options.parent {
            self.parent = Some(parent);
        }
        if let Some(generator) = options.id_generator {
            self.id_generator = generator;
        }
    }

    pub(crate) fn to_record(&self) -> SchemaRecord {
        SchemaRecord {
            type_name: self.type_name.clone(),
            id_property: self.id_property.clone(),
            indexed_paths: self.indexed_paths.clone(),
            vector_paths: self.vector_paths.clone(),
            parent: self.parent.clone(),
        }
    }

    pub(crate) fn from_record(record: SchemaRecord) -> Self {
        Self {
            type_name: record.type_name,
            id_property: record.id_property,
            indexed_paths: record.indexed_paths,
            vector_paths: record.vector_paths,
            parent: record.parent,
            id_generator: uuid_generator(),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("id_property", &self.id_property)
            .field("indexed_paths", &self.indexed_paths)
            .field("vector_paths", &self.vector_paths)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Persisted form of a schema. Id generators are process-local and reset
/// to the default on reopen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SchemaRecord {
    pub type_name: String,
    pub id_property: String,
    pub indexed_paths: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub vector_paths: Vec<VectorFeature>,
    pub parent: Option<String>,
}

/// Schemas of one opened database, keyed by type name.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Schema>>,
}

impl SchemaRegistry {
    pub fn get(&self, type_name: &str) -> Option<Schema> {
        self.schemas.read().get(type_name).cloned()
    }

    /// The schema for `type_name`, synthesizing a default one when absent.
    /// The flag reports whether it was created.
    pub fn get_or_create(&self, type_name: &str) -> (Schema, bool) {
        let mut schemas = self.schemas.write();
        if let Some(schema) = schemas.get(type_name) {
            return (schema.clone(), false);
        }
        let schema = Schema::new(type_name);
        schemas.insert(type_name.to_string(), schema.clone());
        (schema, true)
    }

    /// The schema that results from applying `options` to `type_name`,
    /// without registering it. Options of an existing schema are merged; a
    /// new schema with a parent starts from the parent's options.
    pub fn resolve(&self, type_name: &str, options: SchemaOptions) -> Schema {
        let schemas = self.schemas.read();
        let mut schema = match schemas.get(type_name) {
            Some(existing) => existing.clone(),
            None => {
                let inherited = options
                    .parent
                    .as_deref()
                    .and_then(|parent| schemas.get(parent));
                match inherited {
                    Some(parent) => Schema {
                        type_name: type_name.to_string(),
                        ..parent.clone()
                    },
                    None => Schema::new(type_name),
                }
            }
        };
        schema.apply(options);
        schema
    }

    /// Replace a schema wholesale (used for reloads and learned statistics).
    pub fn insert(&self, schema: Schema) {
        self.schemas
            .write()
            .insert(schema.type_name.clone(), schema);
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn define(
        registry: &SchemaRegistry,
        type_name: &str,
        options: SchemaOptions,
    ) -> Schema {
        let schema = registry.resolve(type_name, options);
        registry.insert(schema.clone());
        schema
    }

    #[test]
    fn defaults() {
        let registry = SchemaRegistry::default();
        assert!(registry.get("Person").is_none());

        let (schema, created) = registry.get_or_create("Person");
        assert!(created);
        assert_eq!(schema.id_property, DEFAULT_ID_PROPERTY);
        assert!(schema.indexed_paths.is_none());
        assert!(schema.generate_id().starts_with("Person@"));

        let (_, created) = registry.get_or_create("Person");
        assert!(!created);
    }

    #[test]
    fn redefining_merges_options() {
        let registry = SchemaRegistry::default();
        define(
            &registry,
            "Person",
            SchemaOptions::default().indexed_paths(&["name", "address.city"]),
        );
        let schema =
            define(&registry, "Person", SchemaOptions::default().id_property("id"));
        assert_eq!(schema.id_property, "id");
        assert_eq!(
            schema.indexed_paths,
            Some(vec![
                vec!["name".to_string()],
                vec!["address".to_string(), "city".to_string()],
            ])
        );
    }

    #[test]
    fn child_inherits_parent_options() {
        let registry = SchemaRegistry::default();
        define(
            &registry,
            "Person",
            SchemaOptions::default()
                .id_property("id")
                .indexed_paths(&["name"]),
        );
        let employee = define(
            &registry,
            "Employee",
            SchemaOptions::default()
                .parent("Person")
                .indexed_paths(&["name", "salary"]),
        );
        assert_eq!(employee.type_name, "Employee");
        assert_eq!(employee.id_property, "id");
        assert_eq!(employee.indexed_paths.as_ref().map(Vec::len), Some(2));
        assert!(employee.generate_id().starts_with("Employee@"));
    }

    #[test]
    fn custom_id_generator() {
        let registry = SchemaRegistry::default();
        let schema = define(
            &registry,
            "Counter",
            SchemaOptions::default().id_generator(|| "fixed".to_string()),
        );
        assert_eq!(schema.generate_id(), "Counter@fixed");
    }

    #[test]
    fn record_round_trip_keeps_everything_but_generator() {
        let mut schema = Schema::new("Point");
        schema.vector_paths = vec![
            VectorFeature::numeric_range("x", 0.0, 1.0),
            VectorFeature::categories("color", &["red", "blue"]),
        ];
        let json = serde_json::to_vec(&schema.to_record()).unwrap();
        let record: SchemaRecord = serde_json::from_slice(&json).unwrap();
        let restored = Schema::from_record(record);
        assert_eq!(restored.vector_paths, schema.vector_paths);
        assert_eq!(restored.type_name, "Point");
    }

    #[test]
    fn identity_reads_configured_property() {
        let schema = Schema::new("Person");
        let value = Value::object().with("#", "Person@1");
        assert_eq!(schema.identity_of(&value), Some(&Value::from("Person@1")));
        assert_eq!(schema.identity_of(&Value::from(1)), None);
    }
}
