//! Error types for quire.
//!
//! Failures are split by blast radius. [`ValidationError`] and [`NetworkError`]
//! are scoped to a single picked file, [`PersistenceError`] only ever shows up
//! as autosave status, and [`PublishError`] is returned to whoever pressed
//! publish. [`QuireError`] wraps all of them for callers that just want `?`.

use std::path::PathBuf;

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// Top-level error type for quire operations
#[derive(Debug, Error, Diagnostic)]
pub enum QuireError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),
}

/// Input rejected before anything touches the network or the document.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ValidationError {
    #[error("'{name}' is not a supported image type ({detected})")]
    #[diagnostic(
        code(quire::validation::file_type),
        help("supported types are JPEG, PNG, GIF and WebP")
    )]
    UnsupportedType { name: SmolStr, detected: SmolStr },

    #[error("'{name}' is {size} bytes, larger than the {limit} byte limit")]
    #[diagnostic(code(quire::validation::file_size))]
    TooLarge { name: SmolStr, size: usize, limit: usize },

    #[error("'{name}' is empty")]
    #[diagnostic(code(quire::validation::empty_file))]
    EmptyFile { name: SmolStr },

    #[error("a post needs a title")]
    #[diagnostic(code(quire::validation::title))]
    MissingTitle,

    #[error("a post needs some content")]
    #[diagnostic(code(quire::validation::content))]
    MissingContent,

    #[error("{count} image upload(s) still in progress")]
    #[diagnostic(
        code(quire::validation::uploads_pending),
        help("wait for uploads to finish or remove the images")
    )]
    UploadsPending { count: usize },
}

/// A signing or transfer call for one file failed.
///
/// Every message starts with `upload failed:` so the per-file error shown to
/// the user reads the same regardless of which stage broke.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum NetworkError {
    #[error("upload failed: could not get upload credentials: {message}")]
    #[diagnostic(code(quire::network::signing))]
    Signing { message: String },

    #[error("upload failed: {message}")]
    #[diagnostic(code(quire::network::transfer))]
    Transfer { message: String },

    #[error("upload failed: {stage} timed out after {secs}s")]
    #[diagnostic(code(quire::network::timeout))]
    Timeout { stage: &'static str, secs: u64 },

    #[error("upload failed: unexpected response: {message}")]
    #[diagnostic(code(quire::network::response))]
    MalformedResponse { message: String },

    #[error("upload failed: cancelled")]
    #[diagnostic(code(quire::network::cancelled))]
    Cancelled,
}

/// Draft persistence errors
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("failed to access draft at {}", path.display())]
    #[diagnostic(code(quire::persistence::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode draft")]
    #[diagnostic(code(quire::persistence::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("draft storage failed: {message}")]
    #[diagnostic(code(quire::persistence::backend))]
    Backend { message: String },
}

impl From<serde_json::Error> for PersistenceError {
    fn from(source: serde_json::Error) -> Self {
        Self::Serde { source }
    }
}

/// Configuration loading errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("error reading config file {}", path.display())]
    #[diagnostic(code(quire::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config file {}", path.display())]
    #[diagnostic(code(quire::config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {message}")]
    #[diagnostic(code(quire::config::env))]
    InvalidEnv { var: &'static str, message: String },

    #[error("{key} is not set")]
    #[diagnostic(
        code(quire::config::missing),
        help("set it in the config file or through QUIRE_SIGNING_ENDPOINT")
    )]
    Missing { key: &'static str },
}

/// Errors returned by the publish collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum PublishError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error("publish rejected: {message}")]
    #[diagnostic(code(quire::publish::rejected))]
    Rejected { message: String },

    #[error("publish failed: {message}")]
    #[diagnostic(code(quire::publish::transport))]
    Transport { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),
}

/// The document session is no longer running.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SessionError {
    #[error("document session has been disposed")]
    #[diagnostic(code(quire::session::closed))]
    Closed,
}
