//! Shared plumbing for the quire crates: errors, configuration and tracing setup.

pub mod config;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::config::{
    AutosaveConfig, Config, DraftConfig, PlaceholderText, UploadConfig, DEFAULT_DRAFT_KEY,
};
pub use crate::error::{
    ConfigError, NetworkError, PersistenceError, PublishError, QuireError, SessionError,
    ValidationError,
};
