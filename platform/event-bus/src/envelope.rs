//! # Event Envelope
//!
//! Common header carried by every event on the bus.
//!
//! ## Wire format
//!
//! The header fields sit at the top level of the JSON object, next to the
//! type-specific payload fields:
//!
//! ```json
//! {
//!   "id": "…", "type": "recipe.upserted", "occurredOn": "2024-01-01T00:00:00Z",
//!   "aggregateId": "…", "schemaVersion": 1, "aggregateVersion": 3,
//!   "recipe": { … }
//! }
//! ```
//!
//! ## Envelope Fields
//!
//! - `id`: Unique event identifier
//! - `type`: Discriminator used for routing before the payload is parsed
//! - `occurredOn`: When the event was produced
//! - `aggregateId`: The entity the event concerns
//! - `schemaVersion`: Payload schema revision
//! - `aggregateVersion`: Monotonic version of the aggregate at the time of the event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing header, decodable on its own from any full event body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeader {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub event_type: String,

    pub occurred_on: DateTime<Utc>,

    pub aggregate_id: Uuid,

    #[serde(default)]
    pub schema_version: i32,

    #[serde(default)]
    pub aggregate_version: i64,
}

impl EnvelopeHeader {
    /// Decode only the header; payload fields are ignored.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Header plus a typed payload, flattened into one JSON object.
///
/// # Examples
///
/// ```rust
/// use event_bus::EventEnvelope;
/// use serde::{Deserialize, Serialize};
/// use uuid::Uuid;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct RecipeDeleted {
///     user_id: Uuid,
/// }
///
/// let envelope = EventEnvelope::new(
///     "recipe.deleted",
///     Uuid::new_v4(),
///     RecipeDeleted { user_id: Uuid::new_v4() },
/// )
/// .with_aggregate_version(4);
///
/// let json = serde_json::to_value(&envelope).unwrap();
/// assert_eq!(json["type"], "recipe.deleted");
/// assert_eq!(json["aggregateVersion"], 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    #[serde(flatten)]
    pub header: EnvelopeHeader,

    #[serde(flatten)]
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    /// Create a new envelope with a fresh event id and the current time
    pub fn new(event_type: impl Into<String>, aggregate_id: Uuid, payload: T) -> Self {
        Self {
            header: EnvelopeHeader {
                id: Uuid::new_v4(),
                event_type: event_type.into(),
                occurred_on: Utc::now(),
                aggregate_id,
                schema_version: 1,
                aggregate_version: 0,
            },
            payload,
        }
    }

    /// Override the event id (useful for redelivery tests)
    pub fn with_event_id(mut self, id: Uuid) -> Self {
        self.header.id = id;
        self
    }

    pub fn with_occurred_on(mut self, occurred_on: DateTime<Utc>) -> Self {
        self.header.occurred_on = occurred_on;
        self
    }

    pub fn with_schema_version(mut self, version: i32) -> Self {
        self.header.schema_version = version;
        self
    }

    pub fn with_aggregate_version(mut self, version: i64) -> Self {
        self.header.aggregate_version = version;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.header.event_type
    }
}

/// Validate envelope header fields on an untyped JSON value
///
/// # Validation Rules
///
/// - `id`, `aggregateId`: Must be UUID strings
/// - `type`: Must be a non-empty string
/// - `occurredOn`: Must be an RFC 3339 timestamp
/// - `schemaVersion`, `aggregateVersion`: Optional, integers when present
///
/// # Errors
///
/// Returns a descriptive error string if validation fails
pub fn validate_envelope_fields(envelope: &serde_json::Value) -> Result<(), String> {
    for field in ["id", "aggregateId"] {
        let value = envelope
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("Missing or invalid {}", field))?;
        Uuid::parse_str(value).map_err(|e| format!("{} is not a UUID: {}", field, e))?;
    }

    let event_type = envelope
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid type")?;

    if event_type.is_empty() {
        return Err("type cannot be empty".to_string());
    }

    let occurred_on = envelope
        .get("occurredOn")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid occurredOn")?;
    DateTime::parse_from_rfc3339(occurred_on)
        .map_err(|e| format!("occurredOn is not RFC 3339: {}", e))?;

    for field in ["schemaVersion", "aggregateVersion"] {
        if let Some(value) = envelope.get(field) {
            if !value.is_i64() {
                return Err(format!("{} must be an integer", field));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Deleted {
        user_id: Uuid,
    }

    #[test]
    fn test_envelope_creation() {
        let aggregate_id = Uuid::new_v4();
        let envelope = EventEnvelope::new(
            "recipe.deleted",
            aggregate_id,
            Deleted {
                user_id: Uuid::nil(),
            },
        );

        assert_eq!(envelope.event_type(), "recipe.deleted");
        assert_eq!(envelope.header.aggregate_id, aggregate_id);
        assert_eq!(envelope.header.schema_version, 1);
        assert_eq!(envelope.header.aggregate_version, 0);
    }

    #[test]
    fn test_envelope_flattens_header_and_payload() {
        let envelope = EventEnvelope::new(
            "recipe.deleted",
            Uuid::new_v4(),
            Deleted {
                user_id: Uuid::nil(),
            },
        )
        .with_aggregate_version(7);

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "recipe.deleted");
        assert_eq!(json["aggregateVersion"], 7);
        assert_eq!(json["userId"], Uuid::nil().to_string());
        assert!(json.get("header").is_none());
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_header_parses_without_payload_knowledge() {
        let body = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "recipe.something.new",
            "occurredOn": "2024-01-01T00:00:00Z",
            "aggregateId": "650e8400-e29b-41d4-a716-446655440000",
            "someFutureField": {"nested": true}
        });

        let header = EnvelopeHeader::from_slice(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(header.event_type, "recipe.something.new");
        assert_eq!(header.schema_version, 0);
        assert_eq!(header.aggregate_version, 0);
    }

    #[test]
    fn test_header_rejects_missing_type() {
        let body = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "occurredOn": "2024-01-01T00:00:00Z",
            "aggregateId": "650e8400-e29b-41d4-a716-446655440000"
        });

        assert!(EnvelopeHeader::from_slice(&serde_json::to_vec(&body).unwrap()).is_err());
    }

    #[test]
    fn test_validate_envelope_fields_valid() {
        let envelope = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "recipe.upserted",
            "occurredOn": "2024-01-01T00:00:00Z",
            "aggregateId": "650e8400-e29b-41d4-a716-446655440000",
            "schemaVersion": 1,
            "aggregateVersion": 2
        });

        assert!(validate_envelope_fields(&envelope).is_ok());
    }

    #[test]
    fn test_validate_envelope_fields_bad_aggregate_id() {
        let envelope = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "recipe.upserted",
            "occurredOn": "2024-01-01T00:00:00Z",
            "aggregateId": "recipe-42"
        });

        let err = validate_envelope_fields(&envelope).unwrap_err();
        assert!(err.contains("aggregateId"));
    }

    #[test]
    fn test_validate_envelope_fields_empty_type() {
        let envelope = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "",
            "occurredOn": "2024-01-01T00:00:00Z",
            "aggregateId": "650e8400-e29b-41d4-a716-446655440000"
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }
}
