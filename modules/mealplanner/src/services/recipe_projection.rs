//! Recipe snapshot → read-model projection
//!
//! Pure translation from the producer's snapshot to the denormalized rows the
//! recommendation reads use. No I/O.

use event_bus::EventEnvelope;

use crate::contracts::{ContractError, RecipeUpsertedV1};
use crate::repos::{ReadModelIngredientLine, ReadModelRecipe};

/// Project an upsert event into a recipe row and its ingredient lines.
///
/// The aggregate version comes from the envelope; `created_at` and `updated_at`
/// are the event's `occurredOn` (the store keeps the original `created_at` on update).
pub fn project(
    envelope: &EventEnvelope<RecipeUpsertedV1>,
) -> Result<(ReadModelRecipe, Vec<ReadModelIngredientLine>), ContractError> {
    let header = &envelope.header;
    let snapshot = &envelope.payload.recipe;

    if header.aggregate_id != snapshot.id {
        return Err(ContractError::AggregateMismatch {
            aggregate_id: header.aggregate_id,
            recipe_id: snapshot.id,
        });
    }

    let nutrition = &snapshot.nutrition;
    let recipe = ReadModelRecipe {
        id: snapshot.id,
        user_id: snapshot.user_id,
        name: snapshot.name.clone(),
        description: snapshot.description.clone(),
        prep_time_minutes: snapshot.prep_time_minutes,
        cook_time_minutes: snapshot.cook_time_minutes,
        total_time_minutes: snapshot.total_time_minutes,
        servings: snapshot.servings,
        yield_quantity: snapshot.yield_quantity,
        yield_unit: snapshot.yield_unit.clone(),
        main_ingredient_id: snapshot.main_ingredient.id,
        main_ingredient_name: snapshot.main_ingredient.name.clone(),
        cuisine_id: snapshot.cuisine.id,
        cuisine_name: snapshot.cuisine.name.clone(),
        allergy_ids: snapshot.allergies.iter().map(|a| a.id).collect(),
        allergy_names: snapshot.allergies.iter().map(|a| a.name.clone()).collect(),
        tags: snapshot.tags.clone(),
        image_url: snapshot.image_url.clone(),
        calories_total: nutrition.calories_total,
        calories_per_serving: nutrition.calories_per_serving,
        protein_g: nutrition.protein_g,
        carbs_g: nutrition.carbs_g,
        fat_g: nutrition.fat_g,
        fiber_g: nutrition.fiber_g,
        sugar_g: nutrition.sugar_g,
        sodium_mg: nutrition.sodium_mg,
        embedding: snapshot.search_vector.clone(),
        aggregate_version: header.aggregate_version,
        created_at: header.occurred_on,
        updated_at: header.occurred_on,
    };

    let lines = snapshot
        .ingredient_lines
        .iter()
        .map(|line| ReadModelIngredientLine {
            recipe_id: snapshot.id,
            ingredient_id: line.ingredient.id,
            ingredient_name: line.ingredient.name.clone(),
            quantity_value: line.quantity_value,
            quantity_text: line.quantity_text.clone(),
            unit: line.unit.clone(),
            is_optional: line.is_optional,
            note: line.note.clone(),
            sort_order: line.sort_order,
        })
        .collect();

    Ok((recipe, lines))
}
