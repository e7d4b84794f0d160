//! Recipe Events Consumer
//!
//! Keeps the recipe read model in sync with the recipe service. Consumes every
//! `recipe.>` event from a durable queue, one message at a time, with manual ack:
//!
//! - header unparseable, payload unparseable or store failure → nack + requeue
//! - upsert / delete applied (or stale upsert skipped) → ack
//! - unknown event type → ack without touching the store
//!
//! A message that keeps failing is dead-lettered once its delivery attempt reaches
//! the configured maximum.

use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{BusMessage, BusResult, Delivery, EnvelopeHeader, EventBus, Topology};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::contracts::{ContractError, RecipeEvent};
use crate::dlq::{self, DeadLetterPolicy};
use crate::metrics::Metrics;
use crate::repos::{RecipeReadStore, StoreError, UpsertOutcome};
use crate::services::recipe_projection;

/// What to do with a delivery after processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue { reason: String },
}

#[derive(Debug, Error)]
enum ProcessingError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Applies recipe events to the read model
#[derive(Clone)]
pub struct RecipeEventProcessor {
    store: Arc<dyn RecipeReadStore>,
}

impl RecipeEventProcessor {
    pub fn new(store: Arc<dyn RecipeReadStore>) -> Self {
        Self { store }
    }

    /// Process one message and decide how it should be settled. Never panics on input.
    pub async fn process(&self, msg: &BusMessage) -> Disposition {
        let header = match EnvelopeHeader::from_slice(&msg.payload) {
            Ok(header) => header,
            Err(e) => {
                let err = ContractError::Envelope(e);
                tracing::error!(subject = %msg.subject, error = %err, "Failed to parse event envelope");
                return Disposition::Requeue {
                    reason: err.to_string(),
                };
            }
        };

        let span = tracing::info_span!(
            "process_recipe_event",
            event_id = %header.id,
            event_type = %header.event_type,
            aggregate_id = %header.aggregate_id,
            aggregate_version = header.aggregate_version,
            subject = %msg.subject,
        );

        async {
            let result = match RecipeEvent::decode(header, &msg.payload) {
                Ok(event) => self.apply(event).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(()) => Disposition::Ack,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to process recipe event");
                    Disposition::Requeue {
                        reason: e.to_string(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, event: RecipeEvent) -> Result<(), ProcessingError> {
        match event {
            RecipeEvent::Upserted(envelope) => {
                let (recipe, lines) = recipe_projection::project(&envelope)?;

                match self.store.upsert(&recipe, &lines).await? {
                    UpsertOutcome::Applied => {
                        tracing::info!(
                            recipe_id = %recipe.id,
                            user_id = %recipe.user_id,
                            lines = lines.len(),
                            "Recipe read model upserted"
                        );
                    }
                    UpsertOutcome::Stale { stored_version } => {
                        tracing::info!(
                            recipe_id = %recipe.id,
                            stored_version = stored_version,
                            incoming_version = recipe.aggregate_version,
                            "Skipping stale recipe snapshot"
                        );
                    }
                }
            }
            RecipeEvent::Deleted(envelope) => {
                let recipe_id = envelope.header.aggregate_id;
                let existed = self.store.delete(recipe_id).await?;
                tracing::info!(
                    recipe_id = %recipe_id,
                    user_id = %envelope.payload.user_id,
                    existed = existed,
                    "Recipe removed from read model"
                );
            }
            RecipeEvent::Ignored(header) => {
                tracing::debug!(event_type = %header.event_type, "Ignoring unhandled recipe event type");
            }
        }

        Ok(())
    }
}

/// Pause after a failed receive, doubled per consecutive failure up to the max
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const RECEIVE_ERROR_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Topology and dead-letter settings for the consumer
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub topology: Topology,
    pub dead_letter: DeadLetterPolicy,
    /// Backoff for declaring topology while the broker is starting
    pub setup_retry: RetryConfig,
    pub metrics: Metrics,
}

/// Declare topology, open the delivery stream and spawn the consumer loop.
///
/// Setup errors are returned to the caller (the service keeps running without
/// sync). A topology conflict is returned on the first attempt.
pub async fn start_recipe_events_consumer(
    bus: Arc<dyn EventBus>,
    store: Arc<dyn RecipeReadStore>,
    settings: ConsumerSettings,
    shutdown: CancellationToken,
) -> BusResult<JoinHandle<()>> {
    let mut topologies = vec![settings.topology.clone()];
    if settings.dead_letter.is_enabled() {
        topologies.push(settings.dead_letter.topology.clone());
    }

    for topology in &topologies {
        retry_with_backoff(
            || bus.declare(topology),
            &settings.setup_retry,
            "declare_recipe_topology",
            event_bus::BusError::is_retriable,
        )
        .await?;
    }

    let deliveries = bus.consume(&settings.topology).await?;

    tracing::info!(
        exchange = %settings.topology.exchange,
        queue = %settings.topology.queue,
        binding = %settings.topology.binding,
        max_deliveries = settings.dead_letter.max_deliveries,
        "Starting recipe events consumer"
    );

    let processor = RecipeEventProcessor::new(store);
    Ok(tokio::spawn(run_consumer_loop(
        bus,
        processor,
        settings.dead_letter,
        settings.metrics,
        deliveries,
        shutdown,
    )))
}

async fn run_consumer_loop(
    bus: Arc<dyn EventBus>,
    processor: RecipeEventProcessor,
    dead_letter: DeadLetterPolicy,
    metrics: Metrics,
    mut deliveries: event_bus::DeliveryStream,
    shutdown: CancellationToken,
) {
    let mut receive_backoff = RECEIVE_ERROR_BACKOFF;

    loop {
        // Cancellation only interrupts the wait; a received message is always settled
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::info!("Recipe events consumer shutting down");
                break;
            }
            next = deliveries.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => {
                tracing::error!(
                    error = %e,
                    backoff_ms = receive_backoff.as_millis() as u64,
                    "Failed to receive recipe event"
                );

                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        tracing::info!("Recipe events consumer shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(receive_backoff) => {}
                }

                receive_backoff = (receive_backoff * 2).min(RECEIVE_ERROR_BACKOFF_MAX);
                continue;
            }
            None => {
                tracing::warn!("Recipe event stream ended");
                break;
            }
        };

        receive_backoff = RECEIVE_ERROR_BACKOFF;

        let span = tracing::info_span!(
            "recipe_delivery",
            subject = %delivery.message.subject,
            attempt = delivery.attempt,
        );

        async {
            let started = Instant::now();
            let disposition = processor.process(&delivery.message).await;

            let outcome = match settle(bus.as_ref(), &dead_letter, delivery, disposition).await {
                Ok(outcome) => outcome.as_str(),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to settle recipe event");
                    "settle_failed"
                }
            };

            metrics.recipe_events_total.with_label_values(&[outcome]).inc();
            metrics
                .recipe_event_duration_seconds
                .with_label_values(&[outcome])
                .observe(started.elapsed().as_secs_f64());
        }
        .instrument(span)
        .await;
    }

    tracing::warn!("Recipe events consumer stopped");
}

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Acked,
    Requeued,
    DeadLettered,
}

impl Settlement {
    fn as_str(self) -> &'static str {
        match self {
            Settlement::Acked => "acked",
            Settlement::Requeued => "requeued",
            Settlement::DeadLettered => "dead_lettered",
        }
    }
}

async fn settle(
    bus: &dyn EventBus,
    dead_letter: &DeadLetterPolicy,
    delivery: Delivery,
    disposition: Disposition,
) -> BusResult<Settlement> {
    match disposition {
        Disposition::Ack => {
            delivery.ack().await?;
            Ok(Settlement::Acked)
        }
        Disposition::Requeue { reason } if dead_letter.should_dead_letter(delivery.attempt) => {
            match dlq::publish_dead_letter(bus, dead_letter, &delivery.message, &reason, delivery.attempt)
                .await
            {
                Ok(()) => {
                    delivery.ack().await?;
                    Ok(Settlement::DeadLettered)
                }
                Err(e) => {
                    tracing::error!(
                        subject = %delivery.message.subject,
                        error = %e,
                        "Failed to publish to DLQ, requeueing instead"
                    );
                    delivery.nack(true).await?;
                    Ok(Settlement::Requeued)
                }
            }
        }
        Disposition::Requeue { reason } => {
            tracing::warn!(
                subject = %delivery.message.subject,
                attempt = delivery.attempt,
                reason = %reason,
                "Requeueing recipe event"
            );
            delivery.nack(true).await?;
            Ok(Settlement::Requeued)
        }
    }
}
