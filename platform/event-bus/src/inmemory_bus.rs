//! In-memory implementation of the EventBus trait for testing and development

use crate::{
    Acknowledger, BusError, BusMessage, BusResult, Delivery, DeliveryStream, EventBus, Topology,
};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// EventBus implementation using in-process queues
///
/// Mirrors the broker semantics the consumer relies on:
/// - queues are declared once and survive for the lifetime of the bus
/// - a published message is copied into every queue whose binding matches
/// - deliveries stay in flight until acked or nacked
/// - a requeued message goes back to the head of its queue with a higher attempt
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus, Topology};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
/// let topology = Topology::new("test-events", "test-queue", "test.events.>");
/// bus.declare(&topology).await?;
///
/// bus.publish("test.events.created", b"hello".to_vec()).await?;
///
/// let mut deliveries = bus.consume(&topology).await?;
/// let delivery = deliveries.next().await.unwrap()?;
/// assert_eq!(delivery.message.payload, b"hello");
/// delivery.ack().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    exchanges: HashMap<String, Vec<String>>,
    queues: HashMap<String, QueueState>,
}

struct QueueState {
    exchange: String,
    binding: String,
    ready: VecDeque<Pending>,
    in_flight: usize,
    notify: Arc<Notify>,
}

struct Pending {
    message: BusMessage,
    deliveries: u32,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting in a queue plus those delivered but not yet settled
    pub async fn queue_depth(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.ready.len() + q.in_flight)
            .unwrap_or(0)
    }

    /// Snapshot of the messages waiting in a queue, head first
    pub async fn ready_messages(&self, queue: &str) -> Vec<BusMessage> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|p| p.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Check if a subject matches a binding pattern
    ///
    /// Supports token wildcards:
    /// - `*` matches exactly one token
    /// - `>` matches one or more tokens
    ///
    /// # Examples
    /// - `recipe.>` matches `recipe.upserted`
    /// - `recipe.*.v1` matches `recipe.deleted.v1`
    /// - `recipe.*` does NOT match `recipe.upserted.v2` (too many tokens)
    fn matches_pattern(subject: &str, pattern: &str) -> bool {
        let subject_tokens: Vec<&str> = subject.split('.').collect();
        let pattern_tokens: Vec<&str> = pattern.split('.').collect();

        let mut s_idx = 0;
        let mut p_idx = 0;

        while s_idx < subject_tokens.len() && p_idx < pattern_tokens.len() {
            let pattern_token = pattern_tokens[p_idx];

            if pattern_token == ">" {
                return true;
            } else if pattern_token == "*" || subject_tokens[s_idx] == pattern_token {
                s_idx += 1;
                p_idx += 1;
            } else {
                return false;
            }
        }

        s_idx == subject_tokens.len() && p_idx == pattern_tokens.len()
    }

    async fn take_next(state: &Mutex<BusState>, queue: &str) -> BusResult<Option<(BusMessage, u32)>> {
        let mut state = state.lock().await;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::SubscribeError(format!("queue {} was deleted", queue)))?;

        Ok(q.ready.pop_front().map(|mut pending| {
            pending.deliveries += 1;
            q.in_flight += 1;
            (pending.message, pending.deliveries)
        }))
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let mut state = self.state.lock().await;

        // Unrouted messages are dropped, as on a real exchange without bindings
        for queue in state.queues.values_mut() {
            if Self::matches_pattern(subject, &queue.binding) {
                queue.ready.push_back(Pending {
                    message: BusMessage::new(subject.to_string(), payload.clone()),
                    deliveries: 0,
                });
                queue.notify.notify_one();
            }
        }

        Ok(())
    }

    async fn declare(&self, topology: &Topology) -> BusResult<()> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.queues.get(&topology.queue) {
            if existing.exchange != topology.exchange || existing.binding != topology.binding {
                return Err(BusError::TopologyConflict(format!(
                    "queue {} is already bound to {} with {}, cannot rebind to {} with {}",
                    topology.queue,
                    existing.exchange,
                    existing.binding,
                    topology.exchange,
                    topology.binding
                )));
            }
            return Ok(());
        }

        let bindings = state.exchanges.entry(topology.exchange.clone()).or_default();
        if !bindings.contains(&topology.binding) {
            bindings.push(topology.binding.clone());
        }

        state.queues.insert(
            topology.queue.clone(),
            QueueState {
                exchange: topology.exchange.clone(),
                binding: topology.binding.clone(),
                ready: VecDeque::new(),
                in_flight: 0,
                notify: Arc::new(Notify::new()),
            },
        );

        tracing::debug!(
            exchange = %topology.exchange,
            queue = %topology.queue,
            binding = %topology.binding,
            "Declared in-memory topology"
        );

        Ok(())
    }

    async fn consume(&self, topology: &Topology) -> BusResult<DeliveryStream> {
        let notify = {
            let state = self.state.lock().await;
            let queue = state.queues.get(&topology.queue).ok_or_else(|| {
                BusError::SubscribeError(format!("queue {} is not declared", topology.queue))
            })?;
            queue.notify.clone()
        };

        let state = self.state.clone();
        let queue = topology.queue.clone();

        let stream = async_stream::stream! {
            loop {
                match Self::take_next(&state, &queue).await {
                    Ok(Some((message, attempt))) => {
                        let acker = InMemoryAcker {
                            state: state.clone(),
                            queue: queue.clone(),
                            message: message.clone(),
                            attempt,
                        };
                        yield Ok(Delivery::new(message, attempt, acker));
                    }
                    // notify_one stores a permit, so a publish between the check and
                    // this await is not lost
                    Ok(None) => notify.notified().await,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

struct InMemoryAcker {
    state: Arc<Mutex<BusState>>,
    queue: String,
    message: BusMessage,
    attempt: u32,
}

#[async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(&self) -> BusResult<()> {
        let mut state = self.state.lock().await;
        if let Some(q) = state.queues.get_mut(&self.queue) {
            q.in_flight = q.in_flight.saturating_sub(1);
        }
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> BusResult<()> {
        let mut state = self.state.lock().await;
        let q = state
            .queues
            .get_mut(&self.queue)
            .ok_or_else(|| BusError::AckError(format!("queue {} was deleted", self.queue)))?;

        q.in_flight = q.in_flight.saturating_sub(1);
        if requeue {
            q.ready.push_front(Pending {
                message: self.message.clone(),
                deliveries: self.attempt,
            });
            q.notify.notify_one();
        }

        Ok(())
    }
}
