//! # EventBus Abstraction
//!
//! Topic-based publish/subscribe with durable topology and manual acknowledgement.
//!
//! A consumer declares a [`Topology`] (exchange, durable queue, binding pattern) and
//! then pulls [`Delivery`] values from it. Every delivery must be settled exactly once
//! with [`Delivery::ack`] or [`Delivery::nack`]; a nack with `requeue = true` makes the
//! broker hand the message out again with a higher attempt number.
//!
//! ## Implementations
//!
//! - **NatsBus**: NATS JetStream. Exchange = stream, queue = durable pull consumer.
//! - **InMemoryBus**: in-process queues with the same ack/requeue semantics, for tests
//!   and local development.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, InMemoryBus, Topology};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = InMemoryBus::new();
//! let topology = Topology::new("recipe-events", "mealplanner-recipe-events", "recipe.>");
//!
//! // Safe to repeat on every start
//! bus.declare(&topology).await?;
//!
//! bus.publish("recipe.upserted", b"{}".to_vec()).await?;
//!
//! let mut deliveries = bus.consume(&topology).await?;
//! while let Some(delivery) = deliveries.next().await {
//!     let delivery = delivery?;
//!     println!("{} (attempt {})", delivery.message.subject, delivery.attempt);
//!     delivery.ack().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer_retry;
mod envelope;
mod inmemory_bus;
mod nats_bus;

pub use envelope::{validate_envelope_fields, EnvelopeHeader, EventEnvelope};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// A message received from the event bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The subject/routing key this message was published to
    pub subject: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self { subject, payload }
    }
}

/// Durable routing topology owned by one consumer.
///
/// `binding` uses token wildcards: `*` matches one token, `>` matches the rest
/// (the AMQP `recipe.#` pattern is written `recipe.>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Durable topic exchange (JetStream stream name)
    pub exchange: String,
    /// Durable, non-exclusive queue (JetStream durable consumer name)
    pub queue: String,
    /// Routing pattern binding the queue to the exchange
    pub binding: String,
}

impl Topology {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        binding: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            binding: binding.into(),
        }
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> BusResult<()>;

    /// Negative acknowledgement. `requeue = false` discards the message.
    async fn nack(&self, requeue: bool) -> BusResult<()>;
}

/// A message handed out by [`EventBus::consume`] that has not been settled yet.
pub struct Delivery {
    pub message: BusMessage,
    /// 1 on first delivery, incremented on every redelivery
    pub attempt: u32,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: BusMessage, attempt: u32, acker: impl Acknowledger + 'static) -> Self {
        Self {
            message,
            attempt,
            acker: Box::new(acker),
        }
    }

    pub async fn ack(self) -> BusResult<()> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> BusResult<()> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.message.subject)
            .field("payload_len", &self.message.payload.len())
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("topology conflict: {0}")]
    TopologyConflict(String),

    #[error("failed to settle delivery: {0}")]
    AckError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl BusError {
    /// Whether retrying the same call can succeed.
    ///
    /// A topology conflict means the broker already holds a different declaration;
    /// repeating the declaration cannot fix that.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            BusError::TopologyConflict(_) | BusError::SerializationError(_)
        )
    }
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Stream of unsettled deliveries from one queue
pub type DeliveryStream = BoxStream<'static, BusResult<Delivery>>;

/// Core event bus abstraction
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message to a subject. Every queue whose binding matches receives a copy.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Idempotently declare exchange, queue and binding.
    ///
    /// Declaring an identical topology again is a no-op. Declaring a queue or
    /// exchange that already exists with different parameters fails with
    /// [`BusError::TopologyConflict`].
    async fn declare(&self, topology: &Topology) -> BusResult<()>;

    /// Start pulling deliveries from the topology's queue (manual ack).
    async fn consume(&self, topology: &Topology) -> BusResult<DeliveryStream>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
