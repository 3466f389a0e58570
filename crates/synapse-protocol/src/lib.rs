//! Typed wire format for all inter-agent traffic in Synapse.
//!
//! An [`Envelope`] addresses exactly one of a receiver agent id or a
//! topic, carries a [`payload::Payload`] whose shape is fixed by its
//! `msg_type`, and round-trips through [`Envelope::encode`] /
//! [`Envelope::decode`] as canonical JSON.

pub mod envelope;
pub mod error;
pub mod payload;

pub use envelope::{Destination, Envelope, EnvelopeBuilder};
pub use error::{ProtocolError, ProtocolResult};
pub use payload::{
    DataSubmit, DataType, LogBroadcast, LogLevel, MessageType, Payload, StatusUpdate, TaskAssign,
    ValidationRequest, ValidationResponse,
};
