//! The uniform inter-agent message record.

use crate::error::{ProtocolError, ProtocolResult};
use crate::payload::{MessageType, Payload};
use serde::{Deserialize, Serialize};

/// Exactly one of these is ever set on an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Direct(String),
    Topic(String),
}

/// The canonical wire shape: a flat JSON object with an explicit
/// `msg_type` discriminator and an opaque `payload` object whose shape is
/// determined by that discriminator. See `original_source`'s
/// `ACPMessage` for the source of this layout.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    msg_type: MessageType,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

/// Every inter-agent message. Immutable once built: there are no public
/// setters, only [`Envelope::build`] (via [`EnvelopeBuilder`]) and
/// [`Envelope::decode`].
#[derive(Debug, Clone)]
pub struct Envelope {
    sender_id: String,
    receiver_id: Option<String>,
    topic: Option<String>,
    payload: Payload,
    timestamp: Option<String>,
    correlation_id: Option<String>,
}

impl Envelope {
    /// Build a new envelope. `dest` must name exactly one of a receiver
    /// agent id or a topic; `payload` fixes `msg_type`.
    pub fn build(
        sender_id: impl Into<String>,
        dest: Destination,
        payload: impl Into<Payload>,
    ) -> ProtocolResult<Self> {
        EnvelopeBuilder::new(sender_id, dest, payload).build()
    }

    /// Start a builder for an envelope that also needs a timestamp or
    /// correlation id.
    pub fn builder(
        sender_id: impl Into<String>,
        dest: Destination,
        payload: impl Into<Payload>,
    ) -> EnvelopeBuilder {
        EnvelopeBuilder::new(sender_id, dest, payload)
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> Option<&str> {
        self.receiver_id.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn destination(&self) -> Destination {
        match (&self.receiver_id, &self.topic) {
            (Some(r), None) => Destination::Direct(r.clone()),
            (None, Some(t)) => Destination::Topic(t.clone()),
            _ => unreachable!("envelope invariant: exactly one of receiver_id/topic is set"),
        }
    }

    pub fn msg_type(&self) -> MessageType {
        self.payload.msg_type()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Produce the canonical external text form (JSON).
    pub fn encode(&self) -> String {
        let wire = WireEnvelope {
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            topic: self.topic.clone(),
            msg_type: self.msg_type(),
            payload: self.payload.to_value(),
            timestamp: self.timestamp.clone(),
            correlation_id: self.correlation_id.clone(),
        };
        serde_json::to_string(&wire).expect("wire envelope always serializes")
    }

    /// Parse the canonical external text form, validating every
    /// invariant that [`Envelope::build`] would.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let wire: WireEnvelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

        let dest = match (wire.receiver_id, wire.topic) {
            (Some(r), None) => Destination::Direct(r),
            (None, Some(t)) => Destination::Topic(t),
            _ => return Err(ProtocolError::InvalidAddressing),
        };

        let payload = Payload::from_value(wire.msg_type, wire.payload)?;

        EnvelopeBuilder {
            sender_id: wire.sender_id,
            dest,
            payload,
            timestamp: wire.timestamp,
            correlation_id: wire.correlation_id,
        }
        .build()
    }
}

/// Builder for [`Envelope`]; the only way to attach a timestamp or
/// correlation id before the invariants are checked in [`build`](Self::build).
pub struct EnvelopeBuilder {
    sender_id: String,
    dest: Destination,
    payload: Payload,
    timestamp: Option<String>,
    correlation_id: Option<String>,
}

impl EnvelopeBuilder {
    pub fn new(sender_id: impl Into<String>, dest: Destination, payload: impl Into<Payload>) -> Self {
        Self {
            sender_id: sender_id.into(),
            dest,
            payload: payload.into(),
            timestamp: None,
            correlation_id: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn build(self) -> ProtocolResult<Envelope> {
        if self.sender_id.trim().is_empty() {
            return Err(ProtocolError::MalformedEnvelope(
                "sender_id must not be empty".into(),
            ));
        }
        self.payload.validate()?;

        let (receiver_id, topic) = match self.dest {
            Destination::Direct(r) => {
                if r.trim().is_empty() {
                    return Err(ProtocolError::MalformedEnvelope(
                        "receiver_id must not be empty".into(),
                    ));
                }
                (Some(r), None)
            }
            Destination::Topic(t) => {
                if t.trim().is_empty() {
                    return Err(ProtocolError::MalformedEnvelope(
                        "topic must not be empty".into(),
                    ));
                }
                (None, Some(t))
            }
        };

        Ok(Envelope {
            sender_id: self.sender_id,
            receiver_id,
            topic,
            payload: self.payload,
            timestamp: self.timestamp,
            correlation_id: self.correlation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{LogLevel, StatusUpdate, TaskAssign};

    #[test]
    fn build_direct_envelope() {
        let env = Envelope::build(
            "search_agent",
            Destination::Direct("orchestrator".into()),
            StatusUpdate::new("running"),
        )
        .unwrap();
        assert_eq!(env.sender_id(), "search_agent");
        assert_eq!(env.receiver_id(), Some("orchestrator"));
        assert_eq!(env.topic(), None);
    }

    #[test]
    fn empty_sender_rejected() {
        let err = Envelope::build(
            "",
            Destination::Topic("logs".into()),
            StatusUpdate::new("x"),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }

    #[test]
    fn progress_out_of_range_rejected() {
        let err = Envelope::build(
            "a",
            Destination::Topic("logs".into()),
            StatusUpdate::new("x").with_progress(150.0),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }

    #[test]
    fn priority_out_of_range_rejected() {
        let mut task_data = serde_json::Map::new();
        task_data.insert("q".into(), "x".into());
        let err = Envelope::build(
            "a",
            Destination::Direct("b".into()),
            TaskAssign::new("web_search", task_data).with_priority(9),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let env = Envelope::builder(
            "orchestrator",
            Destination::Topic("logs".into()),
            crate::payload::LogBroadcast::new(LogLevel::Info, "hello"),
        )
        .with_correlation_id("corr-1")
        .build()
        .unwrap();

        let text = env.encode();
        let restored = Envelope::decode(&text).unwrap();

        assert_eq!(restored.sender_id(), env.sender_id());
        assert_eq!(restored.topic(), env.topic());
        assert_eq!(restored.correlation_id(), Some("corr-1"));
        assert_eq!(restored.encode(), text);
    }

    #[test]
    fn decode_rejects_both_receiver_and_topic() {
        let text = r#"{"sender_id":"a","receiver_id":"b","topic":"c","msg_type":"status_update","payload":{"status":"ok"}}"#;
        let err = Envelope::decode(text).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidAddressing);
    }

    #[test]
    fn decode_rejects_neither_receiver_nor_topic() {
        let text = r#"{"sender_id":"a","msg_type":"status_update","payload":{"status":"ok"}}"#;
        let err = Envelope::decode(text).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidAddressing);
    }

    #[test]
    fn decode_rejects_unknown_msg_type() {
        let text = r#"{"sender_id":"a","topic":"t","msg_type":"bogus","payload":{}}"#;
        assert!(Envelope::decode(text).is_err());
    }

    #[test]
    fn decode_rejects_payload_mismatch() {
        let text = r#"{"sender_id":"a","topic":"t","msg_type":"log_broadcast","payload":{"status":"ok"}}"#;
        let err = Envelope::decode(text).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
    }
}
