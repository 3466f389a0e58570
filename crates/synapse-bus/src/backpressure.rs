//! Backpressure configuration for the agent communication bus.
//!
//! Provides fine-grained control over how the bus handles buffer overflow
//! and slow consumers. Each channel can be independently configured with
//! its own buffer size and lag recovery policy.
//!
//! # Design Rationale
//!
//! The bus uses [`tokio::sync::broadcast`] under the hood for fan-out.
//! Broadcast channels have a fixed-size internal ring buffer; when a slow
//! receiver falls behind, the oldest messages are overwritten and the
//! receiver gets [`tokio::sync::broadcast::error::RecvError::Lagged(n)`].
//!
//! Rather than fighting this model (the failed PR #441 tried to replace
//! broadcast entirely), we embrace it and give callers control over:
//!
//! - **Buffer size** — how many messages to buffer per channel.
//! - **Lag policy** — what to do when a receiver detects it has lagged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies which channel a [`ChannelConfig`] override applies to: a
/// specific agent's unicast inbox, or a specific topic's fan-out channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKey {
    Agent(String),
    Topic(String),
}

// ---------------------------------------------------------------------------
// Lag Policy
// ---------------------------------------------------------------------------

/// Policy for handling receiver lag (when a slow consumer misses messages).
///
/// Broadcast channels overwrite the oldest buffered messages when full.
/// When a receiver detects it has fallen behind, the lag policy determines
/// the recovery behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LagPolicy {
    /// Return [`BusError::MessageLag(n)`] immediately.
    ///
    /// Callers must handle the error explicitly. Best for systems where
    /// message loss is unacceptable and the caller needs to take corrective
    /// action (e.g., request a full state sync).
    #[default]
    Error,

    /// Log the lag event, increment metrics, and automatically re-try
    /// `recv()` to return the next available message.
    ///
    /// Best for telemetry, monitoring, and non-critical event streams
    /// where occasional message loss is tolerable.
    SkipAndContinue,
}

// ---------------------------------------------------------------------------
// Channel Configuration
// ---------------------------------------------------------------------------

/// Default buffer size for channels. Chosen to balance memory usage against
/// tolerance for short bursts. For high-throughput channels, callers should
/// set a larger value via [`BusConfig`].
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Configuration for a single bus channel.
///
/// # Examples
///
/// ```
/// use synapse_bus::backpressure::{ChannelConfig, LagPolicy};
///
/// // High-throughput telemetry: large buffer, skip lag events
/// let telemetry = ChannelConfig::new(4096).with_lag_policy(LagPolicy::SkipAndContinue);
///
/// // Critical consensus: small buffer, strict lag errors
/// let consensus = ChannelConfig::new(64).with_lag_policy(LagPolicy::Error);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Number of messages the channel can buffer before the oldest is
    /// overwritten. Must be ≥ 1.
    buffer_size: usize,

    /// How to handle receiver lag (missed messages).
    lag_policy: LagPolicy,
}

impl ChannelConfig {
    /// Create a new channel configuration with the given buffer size.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is 0 (broadcast channels require ≥ 1).
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "buffer_size must be ≥ 1");
        Self {
            buffer_size,
            lag_policy: LagPolicy::default(),
        }
    }

    /// Set the lag policy for this channel.
    #[must_use]
    pub fn with_lag_policy(mut self, policy: LagPolicy) -> Self {
        self.lag_policy = policy;
        self
    }

    /// Returns the configured buffer size.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the configured lag policy.
    #[inline]
    pub fn lag_policy(&self) -> &LagPolicy {
        &self.lag_policy
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

// ---------------------------------------------------------------------------
// Bus Configuration
// ---------------------------------------------------------------------------

/// Top-level configuration for a [`crate::MessageBus`] implementation.
///
/// Provides a default channel config plus optional per-channel overrides
/// keyed by agent id or topic name.
///
/// # Examples
///
/// ```
/// use synapse_bus::backpressure::{BusConfig, ChannelConfig, ChannelKey, LagPolicy};
///
/// let config = BusConfig::default().with_override(
///     ChannelKey::Topic("telemetry".into()),
///     ChannelConfig::new(4096).with_lag_policy(LagPolicy::SkipAndContinue),
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Default configuration applied to all channels unless overridden.
    default_channel: ChannelConfig,

    /// Per-channel overrides. Takes precedence over `default_channel`.
    #[serde(default)]
    overrides: HashMap<ChannelKey, ChannelConfig>,

    /// Maximum number of publishes buffered while the transport is
    /// reconnecting before `publish` fails with `BackpressureExceeded`.
    reconnect_buffer: usize,
}

/// Default high-water mark for the reconnect publish buffer.
pub const DEFAULT_RECONNECT_BUFFER: usize = 1024;

impl BusConfig {
    /// Create a bus config with the given default channel config.
    #[must_use]
    pub fn new(default_channel: ChannelConfig) -> Self {
        Self {
            default_channel,
            overrides: HashMap::new(),
            reconnect_buffer: DEFAULT_RECONNECT_BUFFER,
        }
    }

    /// Add a per-channel override.
    #[must_use]
    pub fn with_override(mut self, key: ChannelKey, config: ChannelConfig) -> Self {
        self.overrides.insert(key, config);
        self
    }

    /// Set the reconnect publish-buffer high-water mark.
    #[must_use]
    pub fn with_reconnect_buffer(mut self, size: usize) -> Self {
        self.reconnect_buffer = size;
        self
    }

    /// Resolve the effective config for a given channel.
    ///
    /// Priority: per-channel override > default.
    pub fn resolve(&self, key: &ChannelKey) -> &ChannelConfig {
        self.overrides.get(key).unwrap_or(&self.default_channel)
    }

    /// Returns the default channel config.
    pub fn default_channel(&self) -> &ChannelConfig {
        &self.default_channel
    }

    /// Returns the reconnect publish-buffer high-water mark.
    pub fn reconnect_buffer(&self) -> usize {
        self.reconnect_buffer
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}
