//! Error types shared by every cachemint component.

use thiserror::Error;

/// Unified error type for key generation, stores and cache instances.
///
/// A cache miss is never an error: stores report it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid cache configuration (limit/expire below -1, missing client, bad signature).
    #[error("configuration error: {0}")]
    Config(String),

    /// No process-wide configuration was installed before it was needed.
    #[error("there is no active cache configuration")]
    NotConfigured,

    /// Invalid argument passed to a store constructor.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested operation is not available in the current key mode.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Call arguments could not be bound to the call signature.
    #[error("cannot bind arguments: {0}")]
    Binding(String),

    /// The external key-value service failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl CacheError {
    /// Returns `true` for the unsupported-operation condition.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CacheError::Unsupported(_))
    }
}

/// Convenience result type for cachemint operations.
pub type Result<T> = std::result::Result<T, CacheError>;
