//! # Core Error Types
//!
//! Validation and decoding errors for the change model.

use thiserror::Error;

/// Errors that can occur while building or decoding change values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A builder was finished without a required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A query limit resolved to zero or a negative number.
    #[error("limit has to be positive, got {0}")]
    NonPositiveLimit(i32),

    /// Restoration was requested for a change set with competing values.
    #[error("only distinct change sets can be restored")]
    NotDistinct,

    /// A persisted reason name did not match any known reason.
    #[error("unknown change reason: {0}")]
    UnknownReason(String),

    /// A persisted subject type did not match any known type.
    #[error("unknown change type: {0}")]
    UnknownChangeType(String),

    /// The serialized parts of a subject could not be reassembled.
    #[error("malformed subject: {0}")]
    MalformedSubject(String),

    /// A state blob could not be encoded or decoded.
    #[error("state codec failure: {0}")]
    Codec(String),
}

/// Result type for change model operations.
pub type CoreResult<T> = Result<T, CoreError>;
