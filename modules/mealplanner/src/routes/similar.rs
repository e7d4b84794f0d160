//! Similar-recipe API Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, AppState};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarRecipeResponse {
    pub id: Uuid,
    pub name: String,
    pub cuisine_name: String,
    pub main_ingredient_name: String,
    pub similarity: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarRecipesResponse {
    pub recipe_id: Uuid,
    pub similar: Vec<SimilarRecipeResponse>,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

/// Handler for GET /api/mealplanner/recipes/{recipe_id}/similar
pub async fn get_similar_recipes(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<SimilarRecipesResponse>, ApiError> {
    let exists = state
        .store
        .get_by_id(recipe_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load recipe: {}", e)))?
        .is_some();

    if !exists {
        return Err(ApiError::not_found(format!("Recipe {} not found", recipe_id)));
    }

    let similar = state
        .store
        .get_similar(recipe_id, clamp_limit(params.limit))
        .await
        .map_err(|e| ApiError::internal(format!("Failed to fetch similar recipes: {}", e)))?;

    Ok(Json(SimilarRecipesResponse {
        recipe_id,
        similar: similar
            .into_iter()
            .map(|s| SimilarRecipeResponse {
                id: s.recipe.id,
                name: s.recipe.name,
                cuisine_name: s.recipe.cuisine_name,
                main_ingredient_name: s.recipe.main_ingredient_name,
                similarity: s.similarity,
            })
            .collect(),
    }))
}
