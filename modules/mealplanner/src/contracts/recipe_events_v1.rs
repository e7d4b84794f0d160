//! Recipe event contracts (v1)
//!
//! Produced by the recipe service whenever a recipe is created, updated or deleted.
//! Field names follow the camelCase wire format of the producer.

use chrono::{DateTime, Utc};
use event_bus::{EnvelopeHeader, EventEnvelope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator for full-snapshot recipe events (create and update)
pub const RECIPE_UPSERTED: &str = "recipe.upserted";

/// Discriminator for recipe deletion events
pub const RECIPE_DELETED: &str = "recipe.deleted";

/// Payload of a `recipe.upserted` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeUpsertedV1 {
    pub recipe: RecipeSnapshot,
}

/// Payload of a `recipe.deleted` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDeletedV1 {
    pub user_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

/// Full recipe state at the time of the mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prep_time_minutes: i32,
    pub cook_time_minutes: i32,
    pub total_time_minutes: i32,
    pub servings: i32,
    #[serde(default)]
    pub yield_quantity: Option<f64>,
    #[serde(default)]
    pub yield_unit: String,
    pub main_ingredient: NamedRef,
    pub cuisine: NamedRef,
    #[serde(default)]
    pub ingredient_lines: Vec<IngredientLineSnapshot>,
    #[serde(default)]
    pub allergies: Vec<NamedRef>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub nutrition: NutritionSnapshot,
    #[serde(default)]
    pub search_vector: Vec<f32>,
}

/// Reference to another aggregate by id, with its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientLineSnapshot {
    pub ingredient: NamedRef,
    #[serde(default)]
    pub quantity_value: Option<f64>,
    #[serde(default)]
    pub quantity_text: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// Aggregated nutrition for the whole recipe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NutritionSnapshot {
    pub calories_total: f64,
    pub calories_per_serving: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub sugar_g: f64,
    pub sodium_mg: f64,
}

/// Decode failures for recipe events
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {event_type} payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("aggregateId {aggregate_id} does not match recipe id {recipe_id}")]
    AggregateMismatch { aggregate_id: Uuid, recipe_id: Uuid },
}

/// Closed set of recipe events this service understands
///
/// Anything with an unrecognized discriminator decodes to [`RecipeEvent::Ignored`]
/// so dropping it is an explicit, testable outcome.
#[derive(Debug, Clone)]
pub enum RecipeEvent {
    Upserted(Box<EventEnvelope<RecipeUpsertedV1>>),
    Deleted(EventEnvelope<RecipeDeletedV1>),
    Ignored(EnvelopeHeader),
}

impl RecipeEvent {
    /// Route on an already-parsed header, then decode the matching payload.
    pub fn decode(header: EnvelopeHeader, body: &[u8]) -> Result<Self, ContractError> {
        let payload_error = |source| ContractError::Payload {
            event_type: header.event_type.clone(),
            source,
        };

        match header.event_type.as_str() {
            RECIPE_UPSERTED => {
                let envelope: EventEnvelope<RecipeUpsertedV1> =
                    serde_json::from_slice(body).map_err(payload_error)?;
                Ok(RecipeEvent::Upserted(Box::new(envelope)))
            }
            RECIPE_DELETED => {
                let envelope: EventEnvelope<RecipeDeletedV1> =
                    serde_json::from_slice(body).map_err(payload_error)?;
                Ok(RecipeEvent::Deleted(envelope))
            }
            _ => Ok(RecipeEvent::Ignored(header)),
        }
    }

    /// Parse the header and decode in one step
    pub fn from_slice(body: &[u8]) -> Result<Self, ContractError> {
        let header = EnvelopeHeader::from_slice(body).map_err(ContractError::Envelope)?;
        Self::decode(header, body)
    }

    pub fn header(&self) -> &EnvelopeHeader {
        match self {
            RecipeEvent::Upserted(envelope) => &envelope.header,
            RecipeEvent::Deleted(envelope) => &envelope.header,
            RecipeEvent::Ignored(header) => header,
        }
    }
}
