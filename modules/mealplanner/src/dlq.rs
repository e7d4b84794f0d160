//! Dead Letter Queue (DLQ) handling
//!
//! A recipe event that keeps failing is published to the dead-letter subject with
//! the failure details, then acked on the main queue so it stops blocking the
//! consumer. The dead-letter stream is declared next to the main topology.

use chrono::{DateTime, Utc};
use event_bus::{validate_envelope_fields, BusError, BusMessage, BusResult, EventBus, Topology};
use serde::{Deserialize, Serialize};

/// Where and when to dead-letter failing messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterPolicy {
    pub topology: Topology,
    /// Deliveries allowed before a failing message is dead-lettered; 0 disables
    pub max_deliveries: u32,
}

impl DeadLetterPolicy {
    /// Dead-letter topology derived from the main one: `<exchange>-dlq`, `<queue>-dlq`
    pub fn for_topology(main: &Topology, subject: impl Into<String>, max_deliveries: u32) -> Self {
        Self {
            topology: Topology::new(
                format!("{}-dlq", main.exchange),
                format!("{}-dlq", main.queue),
                subject,
            ),
            max_deliveries,
        }
    }

    pub fn subject(&self) -> &str {
        &self.topology.binding
    }

    pub fn is_enabled(&self) -> bool {
        self.max_deliveries > 0
    }

    pub fn should_dead_letter(&self, attempt: u32) -> bool {
        self.is_enabled() && attempt >= self.max_deliveries
    }
}

/// Body published to the dead-letter subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub original_subject: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
    /// Header validation problem, when the payload is JSON but not a valid envelope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_problem: Option<String>,
    /// Original payload (lossy UTF-8)
    pub payload: String,
}

impl DeadLetterRecord {
    pub fn new(msg: &BusMessage, error: &str, attempts: u32) -> Self {
        let envelope_problem = match serde_json::from_slice::<serde_json::Value>(&msg.payload) {
            Ok(value) => validate_envelope_fields(&value).err(),
            Err(e) => Some(format!("payload is not JSON: {}", e)),
        };

        Self {
            original_subject: msg.subject.clone(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
            envelope_problem,
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
        }
    }
}

/// Publish a failed message to the dead-letter subject
pub async fn publish_dead_letter(
    bus: &dyn EventBus,
    policy: &DeadLetterPolicy,
    msg: &BusMessage,
    error: &str,
    attempts: u32,
) -> BusResult<()> {
    let record = DeadLetterRecord::new(msg, error, attempts);
    let body =
        serde_json::to_vec(&record).map_err(|e| BusError::SerializationError(e.to_string()))?;

    bus.publish(policy.subject(), body).await?;

    tracing::warn!(
        subject = %msg.subject,
        dlq_subject = %policy.subject(),
        attempts = attempts,
        error = %error,
        envelope_problem = %record.envelope_problem.as_deref().unwrap_or("none"),
        "Recipe event sent to DLQ"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryBus;
    use futures::StreamExt;

    fn policy(max_deliveries: u32) -> DeadLetterPolicy {
        let main = Topology::new("recipe-events", "mealplanner-recipe-events", "recipe.>");
        DeadLetterPolicy::for_topology(&main, "dlq.mealplanner.recipe-events", max_deliveries)
    }

    #[test]
    fn test_policy_derives_topology() {
        let p = policy(5);
        assert_eq!(p.topology.exchange, "recipe-events-dlq");
        assert_eq!(p.topology.queue, "mealplanner-recipe-events-dlq");
        assert_eq!(p.subject(), "dlq.mealplanner.recipe-events");
    }

    #[test]
    fn test_should_dead_letter_at_max_deliveries() {
        let p = policy(3);
        assert!(!p.should_dead_letter(1));
        assert!(!p.should_dead_letter(2));
        assert!(p.should_dead_letter(3));
        assert!(p.should_dead_letter(4));
    }

    #[test]
    fn test_zero_max_deliveries_disables_dead_lettering() {
        let p = policy(0);
        assert!(!p.is_enabled());
        assert!(!p.should_dead_letter(u32::MAX));
    }

    #[test]
    fn test_record_flags_non_json_payload() {
        let msg = BusMessage::new("recipe.upserted".into(), b"\xffgarbage".to_vec());
        let record = DeadLetterRecord::new(&msg, "malformed envelope", 5);

        assert_eq!(record.original_subject, "recipe.upserted");
        assert_eq!(record.attempts, 5);
        assert!(record.envelope_problem.unwrap().starts_with("payload is not JSON"));
        assert!(record.payload.ends_with("garbage"));
    }

    #[test]
    fn test_record_flags_missing_header_fields() {
        let msg = BusMessage::new("recipe.upserted".into(), br#"{"type":"recipe.upserted"}"#.to_vec());
        let record = DeadLetterRecord::new(&msg, "malformed envelope", 1);
        assert!(record.envelope_problem.is_some());
    }

    #[tokio::test]
    async fn test_publish_dead_letter_reaches_dlq_queue() {
        let bus = InMemoryBus::new();
        let p = policy(5);
        bus.declare(&p.topology).await.unwrap();

        let msg = BusMessage::new("recipe.deleted".into(), b"{}".to_vec());
        publish_dead_letter(&bus, &p, &msg, "store unavailable", 5)
            .await
            .unwrap();

        let mut deliveries = bus.consume(&p.topology).await.unwrap();
        let delivery = deliveries.next().await.unwrap().unwrap();
        let record: DeadLetterRecord = serde_json::from_slice(&delivery.message.payload).unwrap();
        assert_eq!(record.original_subject, "recipe.deleted");
        assert_eq!(record.error, "store unavailable");
        delivery.ack().await.unwrap();
    }
}
