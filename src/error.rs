//! Crate-wide error type.
//!
//! Mirrors the four error categories a caller can hit: bad files on disk,
//! a model file that doesn't parse, bad configuration values, and the
//! (should-be-impossible) internal encoding invariant violation.

/// Errors surfaced by any public entry point in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed model: {0}")]
    MalformedModel(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, Error>;
