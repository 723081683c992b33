//! kvdex - secondary indexing, full-text and vector queries over an embedded
//! [redb](https://github.com/cberner/redb) store.
//!
//! Records bound to a type are decomposed into key-terms (property path plus
//! leaf value) and indexed twice: once ordered by path, once ordered by
//! value. Queries are patterns over nested values; each derivable term is
//! answered by an ordered range scan and the candidate ids are intersected
//! and scored before every hit is re-verified against the stored record.
//!
//! # Quick start
//!
//! ```
//! # let tmp = tempfile::tempdir().unwrap();
//! use kvdex::{Config, FullText, IndexDb, IndexQuery, Pattern, PutOptions, Value, ops};
//!
//! let db = IndexDb::open(&tmp.path().join("db.redb"), Config::default()).unwrap();
//! for (name, age) in [("john jones", 30), ("john johnston", 41), ("mary", 30)] {
//!     let person = Value::object().with("name", name).with("age", age);
//!     db.put(None, person, PutOptions::of_type("Person")).unwrap();
//! }
//!
//! let query = Pattern::object().with("age", ops::gte(40));
//! let older: Vec<_> = db
//!     .get_range_from_index(query, None, None, IndexQuery::of_type("Person"))
//!     .unwrap()
//!     .collect::<kvdex::Result<_>>()
//!     .unwrap();
//! assert_eq!(older.len(), 1);
//!
//! let query = Pattern::object().with("name", "john");
//! let johns = db
//!     .get_range_from_index(
//!         query,
//!         None,
//!         None,
//!         IndexQuery::of_type("Person").fulltext(FullText::Any),
//!     )
//!     .unwrap()
//!     .count();
//! assert_eq!(johns, 2);
//! ```

pub mod codec;
pub mod config;
pub mod db;
pub mod derive;
pub mod error;
pub mod index;
pub mod keys;
pub mod matching;
pub mod ops;
pub mod pattern;
pub mod query;
pub mod schema;
pub mod select;
pub mod store;
pub mod text;
pub mod value;
pub mod vector;

pub use config::{Config, DataDir};
pub use db::{CopyOptions, Entry, IndexDb, PutOptions};
pub use error::{Error, Result};
pub use pattern::{Pattern, Verdict};
pub use query::{FullText, Hit, IndexQuery};
pub use schema::{Schema, SchemaOptions, VectorFeature};
pub use select::Projection;
pub use value::Value;
pub use vector::{Distance, VectorHit, VectorOptions};
