use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    /// The record's identity field disagrees with the key it is stored under.
    #[error("identity conflict: key {key} does not match record id {id}")]
    Conflict { key: String, id: String },

    /// A typed record stored outside its type's `<Type>@` key space.
    #[error("key {key} is not a {type_name} key")]
    KeyType { key: String, type_name: String },

    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("vector search is not enabled for {0}")]
    VectorsDisabled(String),

    #[error("index key could not be decoded")]
    CorruptKey,
}
