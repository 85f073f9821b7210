use camino::Utf8PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TaxTreeError {
    #[error("malformed record in {source_name} at line {line}: expected at least {expected} fields, found {found}")]
    #[diagnostic(help("the dump is truncated or not in .dmp format; re-download the archive"))]
    MalformedRecord {
        source_name: String,
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("taxon {id} references parent {parent_id}, which is not present in the dump")]
    #[diagnostic(help("the dump is incomplete; re-download the archive"))]
    DanglingParent { id: String, parent_id: String },

    #[error("parent chain of taxon {id} loops back onto itself")]
    CyclicParent { id: String },

    #[error("node set has no root taxon")]
    MissingRoot,

    #[error("node set has more than one root taxon: {}", ids.join(", "))]
    MultipleRoots { ids: Vec<String> },

    #[error("taxon {id} appears more than once in the node records")]
    DuplicateTaxon { id: String },

    #[error("invalid taxon id: {0}")]
    InvalidTaxonId(String),

    #[error("invalid rank: {0}")]
    InvalidRank(String),

    #[error("taxon not found: {0}")]
    TaxonNotFound(String),

    #[error("archive {archive} has no entry named {entry}")]
    ArchiveEntry { archive: Utf8PathBuf, entry: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("archive not found at {0} and downloads are disabled")]
    #[diagnostic(help("drop --offline or place taxdmp.zip in the cache directory"))]
    ArchiveMissing(Utf8PathBuf),

    #[error("taxonomy download failed: {0}")]
    Http(String),

    #[error("taxonomy server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl TaxTreeError {
    /// Structural errors mean the input itself is bad; retrying will not help.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TaxTreeError::MalformedRecord { .. }
                | TaxTreeError::DanglingParent { .. }
                | TaxTreeError::CyclicParent { .. }
                | TaxTreeError::MissingRoot
                | TaxTreeError::MultipleRoots { .. }
                | TaxTreeError::DuplicateTaxon { .. }
        )
    }
}

impl From<rusqlite::Error> for TaxTreeError {
    fn from(err: rusqlite::Error) -> Self {
        TaxTreeError::Store(err.to_string())
    }
}
