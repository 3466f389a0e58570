//! Error types for envelope construction and decoding.

use thiserror::Error;

/// Errors raised while building or parsing an [`crate::Envelope`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// An envelope was built or decoded with both `receiver_id` and `topic`
    /// set, or with neither set. Exactly one is required.
    #[error("envelope addressing must set exactly one of receiver_id or topic")]
    InvalidAddressing,

    /// The envelope failed some other construction or decode invariant:
    /// an empty sender id, an out-of-range field, an unknown `msg_type`,
    /// a missing required field, or a payload that does not match the
    /// declared `msg_type`.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
