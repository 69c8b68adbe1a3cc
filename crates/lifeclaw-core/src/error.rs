//! Error types shared across the LifeClaw crates.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LifeClawError>;

/// Everything that can go wrong inside LifeClaw.
///
/// Transaction-side callers normally see these folded into a `false`
/// return (the transaction aborts); `open` reports them directly so the
/// caller can distinguish the failure kind.
#[derive(Debug, Error)]
pub enum LifeClawError {
    /// Bad arguments at environment open: wrong variable count, no
    /// handlers, or a handler declaration without `=`.
    #[error("invalid open arguments: {0}")]
    InvalidOpen(String),

    /// A length-prefixed input value could not be decoded.
    #[error("malformed value: {0}")]
    MalformedValue(String),

    /// An input string failed its grammar.
    #[error("grammar mismatch: {0}")]
    Grammar(String),

    /// A handler pipe could not be created or written.
    #[error("handler driver: {0}")]
    Driver(String),

    /// Configuration file problems.
    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
