//! Suggestion API Routes

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::services::planner::{self, SuggestionRequest, SuggestionResponse};

/// Handler for POST /api/mealplanner/users/{user_id}/suggestions
///
/// Returns recipe ids ranked by diversity against the already-selected recipes.
pub async fn post_suggestions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SuggestionRequest>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let result = planner::suggest(state.store.as_ref(), user_id, &request).await;

    let label = if result.is_ok() { "ok" } else { "error" };
    state
        .metrics
        .suggestion_requests_total
        .with_label_values(&[label])
        .inc();

    let recipe_ids = result.map_err(|e| {
        tracing::error!(user_id = %user_id, error = %e, "Suggestion request failed");
        ApiError::internal(format!("Failed to compute suggestions: {}", e))
    })?;

    Ok(Json(SuggestionResponse { recipe_ids }))
}
