//! Error types for angrycat_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using angrycat_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced id, file name, author or part is absent.
    NotFound,
    /// An id, file name, update hash or author name is already present.
    Duplicate,
    /// A catalog document, sidecar, manifest, config or container is malformed.
    Format,
    /// Underlying file system failure.
    Io,
    /// A split sequence has a gap before completion.
    MissingPart,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Format => "format",
            ErrorKind::Io => "io",
            ErrorKind::MissingPart => "missing_part",
        }
    }
}

/// Errors that can occur during catalog and transfer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON document could not be parsed or produced.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Catalog document is structurally valid JSON but violates the data model.
    #[error("Invalid catalog at {path}: {reason}")]
    InvalidCatalog { path: PathBuf, reason: String },

    /// Invalid bundle id format.
    #[error("Invalid bundle id: {reason}")]
    InvalidId { reason: String },

    /// Invalid digest format or encoding.
    #[error("Invalid digest: {reason}")]
    InvalidDigest { reason: String },

    /// Unsupported digest algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Record fails an invariant before insertion or mutation.
    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },

    /// Bundle not found in the catalog.
    #[error("Bundle not found: {id}")]
    BundleNotFound { id: String },

    /// Script not found in the catalog.
    #[error("Script not found: {file_name}")]
    ScriptNotFound { file_name: String },

    /// No bundle carries the given author name.
    #[error("Author not found: {author}")]
    AuthorNotFound { author: String },

    /// Bundle with the same id already exists.
    #[error("Bundle already exists: {id}")]
    DuplicateBundle { id: String },

    /// Script with the same file name already exists.
    #[error("Script already exists: {file_name}")]
    DuplicateScript { file_name: String },

    /// Hash is already present in a record's update log.
    #[error("Hash {hash} is already in the update log of {key}")]
    DuplicateUpdate { key: String, hash: String },

    /// Rename target is already used by another author's bundles.
    #[error("Author name already in use: {author}")]
    AuthorTaken { author: String },

    /// Bundle file is not a readable bundle.
    #[error("Invalid bundle at {path}: {reason}")]
    InvalidBundle { path: PathBuf, reason: String },

    /// Bundle manifest declares a different id than expected.
    #[error("Bundle id mismatch: expected {expected}, got {got}")]
    IdMismatch { expected: String, got: String },

    /// Required file is absent (thumbnail, certificate, source).
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Legacy container layout is inconsistent.
    #[error("Invalid container: {reason}")]
    InvalidContainer { reason: String },

    /// Part size must be positive.
    #[error("Invalid part size: {size}")]
    InvalidPartSize { size: u64 },

    /// Numbered part sequence has a gap.
    #[error("Missing part {number} of {base}")]
    MissingPart { base: String, number: u32 },

    /// Path already exists (for outputs that must not be overwritten).
    #[error("Path already exists: {path}")]
    PathExists { path: PathBuf },

    /// Project configuration is invalid.
    #[error("Invalid config at {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// Project root could not be located or is incomplete.
    #[error("Invalid project at {path}: {reason}")]
    InvalidProject { path: PathBuf, reason: String },

    /// Another process holds the project lock.
    #[error("Project is locked: {path}")]
    Locked { path: PathBuf },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } | Error::PathExists { .. } | Error::Locked { .. } => ErrorKind::Io,
            Error::BundleNotFound { .. }
            | Error::ScriptNotFound { .. }
            | Error::AuthorNotFound { .. }
            | Error::FileNotFound { .. } => ErrorKind::NotFound,
            Error::DuplicateBundle { .. }
            | Error::DuplicateScript { .. }
            | Error::DuplicateUpdate { .. }
            | Error::AuthorTaken { .. } => ErrorKind::Duplicate,
            Error::MissingPart { .. } => ErrorKind::MissingPart,
            Error::Json { .. }
            | Error::InvalidCatalog { .. }
            | Error::InvalidId { .. }
            | Error::InvalidDigest { .. }
            | Error::UnsupportedAlgorithm { .. }
            | Error::InvalidRecord { .. }
            | Error::InvalidBundle { .. }
            | Error::IdMismatch { .. }
            | Error::InvalidContainer { .. }
            | Error::InvalidPartSize { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidProject { .. } => ErrorKind::Format,
        }
    }

    /// Create an InvalidCatalog error.
    pub fn invalid_catalog(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidCatalog {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidId error.
    pub fn invalid_id(reason: impl Into<String>) -> Self {
        Error::InvalidId {
            reason: reason.into(),
        }
    }

    /// Create an InvalidDigest error.
    pub fn invalid_digest(reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create an InvalidRecord error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Error::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Create a BundleNotFound error.
    pub fn bundle_not_found(id: impl Into<String>) -> Self {
        Error::BundleNotFound { id: id.into() }
    }

    /// Create a ScriptNotFound error.
    pub fn script_not_found(file_name: impl Into<String>) -> Self {
        Error::ScriptNotFound {
            file_name: file_name.into(),
        }
    }

    /// Create an AuthorNotFound error.
    pub fn author_not_found(author: impl Into<String>) -> Self {
        Error::AuthorNotFound {
            author: author.into(),
        }
    }

    /// Create a DuplicateBundle error.
    pub fn duplicate_bundle(id: impl Into<String>) -> Self {
        Error::DuplicateBundle { id: id.into() }
    }

    /// Create a DuplicateScript error.
    pub fn duplicate_script(file_name: impl Into<String>) -> Self {
        Error::DuplicateScript {
            file_name: file_name.into(),
        }
    }

    /// Create a DuplicateUpdate error.
    pub fn duplicate_update(key: impl Into<String>, hash: impl Into<String>) -> Self {
        Error::DuplicateUpdate {
            key: key.into(),
            hash: hash.into(),
        }
    }

    /// Create an AuthorTaken error.
    pub fn author_taken(author: impl Into<String>) -> Self {
        Error::AuthorTaken {
            author: author.into(),
        }
    }

    /// Create an InvalidBundle error.
    pub fn invalid_bundle(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidBundle {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an IdMismatch error.
    pub fn id_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::IdMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a FileNotFound error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Error::FileNotFound { path: path.into() }
    }

    /// Create an InvalidContainer error.
    pub fn invalid_container(reason: impl Into<String>) -> Self {
        Error::InvalidContainer {
            reason: reason.into(),
        }
    }

    /// Create a MissingPart error.
    pub fn missing_part(base: impl Into<String>, number: u32) -> Self {
        Error::MissingPart {
            base: base.into(),
            number,
        }
    }

    /// Create a PathExists error.
    pub fn path_exists(path: impl Into<PathBuf>) -> Self {
        Error::PathExists { path: path.into() }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidProject error.
    pub fn invalid_project(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidProject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a Locked error.
    pub fn locked(path: impl Into<PathBuf>) -> Self {
        Error::Locked { path: path.into() }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        // Archive errors wrap an io::Error or describe a malformed archive
        match err {
            zip::result::ZipError::Io(source) => Error::Io { source },
            other => Error::InvalidBundle {
                path: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}
