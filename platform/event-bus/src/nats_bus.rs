//! NATS JetStream implementation of the EventBus trait

use crate::{
    Acknowledger, BusError, BusMessage, BusResult, Delivery, DeliveryStream, EventBus, Topology,
};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer},
    stream::{self, RetentionPolicy, StorageType},
    AckKind,
};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::StreamExt;

/// EventBus implementation using NATS JetStream
///
/// - exchange → file-backed stream whose subjects include the binding
/// - queue → durable pull consumer filtered on the binding, explicit ack
/// - nack with requeue → `Nak` (redelivered), nack without requeue → `Term`
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus, Topology};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats_client = async_nats::connect("nats://localhost:4222").await?;
/// let bus = NatsBus::new(nats_client);
///
/// bus.declare(&Topology::new("recipe-events", "mealplanner-recipe-events", "recipe.>"))
///     .await?;
/// bus.publish("recipe.upserted", b"{}".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
    jetstream: jetstream::Context,
}

impl NatsBus {
    /// Create a new NatsBus from an existing NATS client
    pub fn new(client: Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }

    /// Get a reference to the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn consumer_config(topology: &Topology) -> pull::Config {
        pull::Config {
            durable_name: Some(topology.queue.clone()),
            filter_subject: topology.binding.clone(),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::All,
            ..Default::default()
        }
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        // Wait for the stream ack so the message is durable before returning
        self.jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn declare(&self, topology: &Topology) -> BusResult<()> {
        let stream = self
            .jetstream
            .get_or_create_stream(stream::Config {
                name: topology.exchange.clone(),
                subjects: vec![topology.binding.clone()],
                retention: RetentionPolicy::Limits,
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        let stream_config = &stream.cached_info().config;
        if !stream_config.subjects.contains(&topology.binding) {
            return Err(BusError::TopologyConflict(format!(
                "stream {} exists with subjects {:?}, missing {}",
                topology.exchange, stream_config.subjects, topology.binding
            )));
        }

        let consumer: PullConsumer = stream
            .get_or_create_consumer(&topology.queue, Self::consumer_config(topology))
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        let consumer_config = &consumer.cached_info().config;
        if consumer_config.filter_subject != topology.binding
            || consumer_config.ack_policy != AckPolicy::Explicit
        {
            return Err(BusError::TopologyConflict(format!(
                "consumer {} exists with filter {} and ack policy {:?}",
                topology.queue, consumer_config.filter_subject, consumer_config.ack_policy
            )));
        }

        tracing::info!(
            stream = %topology.exchange,
            consumer = %topology.queue,
            binding = %topology.binding,
            "JetStream topology declared"
        );

        Ok(())
    }

    async fn consume(&self, topology: &Topology) -> BusResult<DeliveryStream> {
        let stream = self
            .jetstream
            .get_stream(&topology.exchange)
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let consumer: PullConsumer = stream
            .get_consumer(&topology.queue)
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let deliveries = messages.map(|result| -> BusResult<Delivery> {
            let msg = result.map_err(|e| BusError::SubscribeError(e.to_string()))?;
            let attempt = msg
                .info()
                .map(|info| info.delivered.max(1) as u32)
                .unwrap_or(1);
            let message = BusMessage::new(msg.subject.to_string(), msg.payload.to_vec());

            Ok(Delivery::new(message, attempt, JetStreamAcker { message: msg }))
        });

        Ok(deliveries.boxed())
    }
}

struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledger for JetStreamAcker {
    async fn ack(&self) -> BusResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> BusResult<()> {
        let kind = if requeue {
            AckKind::Nak(None)
        } else {
            AckKind::Term
        };

        self.message
            .ack_with(kind)
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Note: These tests require a running NATS server with JetStream enabled
    // For CI, use InMemoryBus tests instead
    // For manual testing: docker run -p 4222:4222 nats:2.10-alpine -js

    #[test]
    fn test_consumer_config_uses_explicit_ack() {
        let topology = Topology::new("recipe-events", "mealplanner-recipe-events", "recipe.>");
        let config = NatsBus::consumer_config(&topology);

        assert_eq!(config.durable_name.as_deref(), Some("mealplanner-recipe-events"));
        assert_eq!(config.filter_subject, "recipe.>");
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_nats_bus_declare_publish_consume() {
        let client = async_nats::connect("nats://localhost:4222")
            .await
            .expect("NATS server must be running on localhost:4222");

        let bus = NatsBus::new(client);
        let topology = Topology::new("test-recipe-events", "test-planner", "testrecipe.>");

        bus.declare(&topology).await.unwrap();
        // Second declaration is a no-op
        bus.declare(&topology).await.unwrap();

        let mut deliveries = bus.consume(&topology).await.unwrap();

        let payload = b"test message".to_vec();
        bus.publish("testrecipe.upserted", payload.clone())
            .await
            .unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(2), deliveries.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended")
            .expect("delivery error");

        assert_eq!(delivery.message.subject, "testrecipe.upserted");
        assert_eq!(delivery.message.payload, payload);
        delivery.ack().await.unwrap();
    }
}
