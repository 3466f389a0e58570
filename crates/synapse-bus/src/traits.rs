//! The bus contract: unicast delivery to an agent id, fan-out delivery to
//! a topic, both driven by push handlers rather than polling.

use crate::error::BusResult;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use synapse_protocol::Envelope;

/// An async callback invoked once per envelope delivered to a subscription.
///
/// Handlers run on a dedicated dispatch task per subscription; a handler
/// that blocks only delays delivery to that one subscriber, never to
/// others on the same channel.
pub type Handler = Arc<dyn Fn(Envelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// A boxed, `'static` future, since trait objects cannot return `impl Future`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Point-to-point and topic message routing for agents.
///
/// Implementations must guarantee:
/// - unicast delivery (`subscribe_agent`) is exclusive: a second
///   subscription for the same agent id fails with
///   [`crate::error::BusError::AlreadySubscribed`] rather than silently
///   replacing the first;
/// - topic delivery (`subscribe_topic`) fans out to every current
///   subscriber of that topic, in publish order per subscriber;
/// - `unsubscribe_agent`/`unsubscribe_topic` let any delivery already
///   handed to the handler finish, but admit no further deliveries once
///   they return.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Establish the underlying transport connection. Implementations
    /// that have no connection step (e.g. an in-memory bus) treat this
    /// as a no-op that still flips the connected flag `publish` checks.
    async fn connect(&self) -> BusResult<()>;

    /// Route `envelope` to its destination's subscriber(s). A topic with
    /// no subscribers, or an agent with none, silently drops the
    /// envelope; that is not an error.
    async fn publish(&self, envelope: Envelope) -> BusResult<()>;

    /// Register the (sole) handler for an agent's unicast inbox.
    async fn subscribe_agent(&self, agent_id: &str, handler: Handler) -> BusResult<()>;

    /// Register a handler among the fan-out set for a topic.
    async fn subscribe_topic(&self, topic: &str, handler: Handler) -> BusResult<()>;

    /// Remove the unicast handler for `agent_id`, if any.
    async fn unsubscribe_agent(&self, agent_id: &str) -> BusResult<()>;

    /// Remove one topic subscription. Implementations that cannot
    /// address a single handler among several remove all subscriptions
    /// registered through the same topic handle returned internally;
    /// this crate's implementations track subscriptions individually.
    async fn unsubscribe_topic(&self, topic: &str) -> BusResult<()>;

    /// Tear down the transport connection. `publish` after `disconnect`
    /// fails with [`crate::error::BusError::NotConnected`].
    async fn disconnect(&self) -> BusResult<()>;
}
