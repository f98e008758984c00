//! Larder error taxonomy.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LarderError>;

/// Errors surfaced by Larder components.
///
/// The split matters for the scheduler: `Store` aborts only the affected
/// branch of the current tick, `Dispatch` affects only one recipient, and
/// `MalformedItem` marks a row that must be excluded from automatic flows
/// entirely. Only `Config` is ever fatal, and only at startup.
#[derive(Debug, Error)]
pub enum LarderError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("malformed item {id}: {reason}")]
    MalformedItem { id: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LarderError {
    /// True when the failed work is safe to retry on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, LarderError::Store(_) | LarderError::Dispatch(_))
    }
}
