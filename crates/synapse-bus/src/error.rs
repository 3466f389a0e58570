//! Typed errors and result aliases for the message bus.

use error_stack::Report;
use thiserror::Error;

/// Error-stack–backed result alias for bus operations.
///
/// Equivalent to `Result<T, error_stack::Report<BusError>>`.
pub type BusResult<T> = ::std::result::Result<T, Report<BusError>>;

/// Extension trait to convert `Result<T, BusError>` into [`BusResult<T>`].
pub trait IntoBusReport<T> {
    /// Wrap the error in an `error_stack::Report`.
    fn into_report(self) -> BusResult<T>;
}

impl<T> IntoBusReport<T> for ::std::result::Result<T, BusError> {
    #[inline]
    fn into_report(self) -> BusResult<T> {
        self.map_err(Report::new)
    }
}

/// Errors surfaced by a [`crate::MessageBus`] implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    /// `publish` was attempted before `connect` succeeded, or after
    /// `disconnect`.
    #[error("bus is not connected")]
    NotConnected,

    /// The underlying transport (broker connection, channel) failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The reconnect publish buffer's high-water mark was exceeded.
    #[error(
        "backpressure exceeded: {pending} publishes buffered while reconnecting (limit {limit})"
    )]
    BackpressureExceeded { pending: usize, limit: usize },

    /// `subscribe_agent` was called for an agent id that already has a
    /// registered unicast handler.
    #[error("agent already subscribed: {0}")]
    AlreadySubscribed(String),

    /// A message could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A receiver detected it had lagged past the configured buffer.
    #[error("receiver lagged by {0} message(s)")]
    MessageLag(u64),

    /// A send onto an internal channel failed (receiver dropped).
    #[error("send failed: {0}")]
    SendFailed(String),
}
