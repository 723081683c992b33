use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    text::{DEFAULT_STOP_WORDS, Tokenizer},
};

/// Environment variable naming the database directory.
pub const DATA_DIR_ENV: &str = "KVDEX_DATA_DIR";

const DATABASE_FILE: &str = "kvdex.redb";

/// Rows fetched per read transaction by lazy range scans.
pub const DEFAULT_SCAN_BATCH: usize = 256;

/// Options fixed for the lifetime of an opened database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tokenize string leaves into word terms when indexing.
    pub fulltext: bool,
    /// Maintain the vector store for schemas declaring vector features.
    pub vectors: bool,
    /// Stop words dropped from full-text tokens.
    pub stop_words: Vec<String>,
    /// Persist undefined fields as `@undefined` instead of dropping them.
    pub keep_undefined: bool,
    pub scan_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fulltext: true,
            vectors: false,
            stop_words: DEFAULT_STOP_WORDS
                .iter()
                .map(|w| (*w).to_string())
                .collect(),
            keep_undefined: false,
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }
}

impl Config {
    pub fn with_fulltext(mut self, fulltext: bool) -> Self {
        self.fulltext = fulltext;
        self
    }

    pub fn with_vectors(mut self, vectors: bool) -> Self {
        self.vectors = vectors;
        self
    }

    pub fn with_stop_words<S: AsRef<str>>(mut self, words: &[S]) -> Self {
        self.stop_words = words.iter().map(|w| w.as_ref().to_string()).collect();
        self
    }

    pub fn with_keep_undefined(mut self, keep: bool) -> Self {
        self.keep_undefined = keep;
        self
    }

    pub fn with_scan_batch(mut self, rows: usize) -> Self {
        self.scan_batch = rows;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_batch == 0 {
            return Err(Error::Config("scan_batch must be at least 1".into()));
        }
        Ok(())
    }

    /// The tokenizer applied to string leaves, if full-text indexing is on.
    pub fn tokenizer(&self) -> Option<Tokenizer> {
        self.fulltext.then(|| Tokenizer::new(&self.stop_words))
    }

    /// Settings that shape stored index keys. Reopening a database with
    /// different values would leave its indexes inconsistent.
    pub(crate) fn index_settings(&self) -> Result<Vec<(&'static str, String)>> {
        let mut stop_words = self.stop_words.clone();
        stop_words.sort();
        Ok(vec![
            ("fulltext", self.fulltext.to_string()),
            ("stop_words", serde_json::to_string(&stop_words)?),
        ])
    }
}

/// The directory a database file lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir(PathBuf);

impl DataDir {
    /// Use `explicit` when given, else `$KVDEX_DATA_DIR`, else the XDG data
    /// home (`~/.local/share/kvdex`). The directory is created if missing.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(dir) => PathBuf::from(dir),
                None => xdg_data_home()?,
            },
        };
        std::fs::create_dir_all(&root).map_err(|_| Error::DataDir(root.clone()))?;
        tracing::debug!(root = %root.display(), "resolved data directory");
        Ok(Self(root))
    }

    pub fn root(&self) -> &Path {
        &self.0
    }

    /// The redb file holding records, indexes, vectors and schemas.
    pub fn database(&self) -> PathBuf {
        self.0.join(DATABASE_FILE)
    }
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("kvdex")
        .get_data_home()
        .ok_or_else(|| Error::Config("no XDG data home to put the database in".into()))
}
