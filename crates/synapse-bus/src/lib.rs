//! Unicast and topic-based message routing between agents.
//!
//! [`MessageBus`] is the contract; [`memory::InMemoryBus`] and
//! [`amqp::AmqpBus`] are the two bindings this crate ships. Callers pick
//! one at startup based on a connection URL's scheme (`amqp://` selects
//! the broker binding, anything else falls back to the in-memory one)
//! and program against the trait from then on.

pub mod amqp;
pub mod backpressure;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod traits;

pub use amqp::AmqpBus;
pub use backpressure::{BusConfig, ChannelConfig, ChannelKey, LagPolicy};
pub use error::{BusError, BusResult, IntoBusReport};
pub use memory::InMemoryBus;
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use traits::{BoxFuture, Handler, MessageBus};

use std::sync::Arc;

/// Construct the bus binding named by `url`'s scheme: `amqp://...` or
/// `amqps://...` yields an [`AmqpBus`] (not yet connected); anything
/// else yields an [`InMemoryBus`], ignoring `url`.
pub fn bus_from_url(url: &str, config: BusConfig) -> Arc<dyn MessageBus> {
    if url.starts_with("amqp://") || url.starts_with("amqps://") {
        Arc::new(AmqpBus::new(url, config.reconnect_buffer()))
    } else {
        Arc::new(InMemoryBus::new(config))
    }
}
