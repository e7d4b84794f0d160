//! Diversity-aware recipe planner
//!
//! Filters the owner's read-model recipes against per-day constraints, drops recipes
//! already picked, and ranks the rest by how different they are from the picks:
//!
//! ```text
//! diversity(c) = 1 - mean(cosine(c.embedding, s.embedding) for s in selected)
//! ```
//!
//! With nothing selected every candidate scores 1.0. Ties are broken by recipe id
//! ascending so identical requests always produce identical responses.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::repos::{RecipeProjection, RecipeReadStore, StoreError};
use crate::services::similarity::cosine_similarity;

/// Returned when the request leaves `amount` unset or non-positive
pub const DEFAULT_AMOUNT: usize = 5;

/// Upper bound for `amount`; larger values are clamped, not rejected
pub const MAX_AMOUNT: usize = 50;

/// Maximum number of recipes loaded from the read model per request
pub const CANDIDATE_POOL_CAP: i64 = 1000;

/// Constraints for a single day; empty lists do not restrict
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyConstraints {
    #[serde(default)]
    pub ingredient_constraints: Vec<Uuid>,
    #[serde(default)]
    pub cuisine_constraints: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    #[serde(default)]
    pub daily_constraints: Vec<DailyConstraints>,
    #[serde(default)]
    pub already_selected_recipe_ids: Vec<Uuid>,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResponse {
    pub recipe_ids: Vec<Uuid>,
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Failed to load candidate recipes: {0}")]
    Store(#[from] StoreError),
}

/// Clamp the requested amount into `1..=MAX_AMOUNT`
pub fn clamp_amount(amount: Option<i64>) -> usize {
    match amount {
        None => DEFAULT_AMOUNT,
        Some(n) if n <= 0 => DEFAULT_AMOUNT,
        Some(n) => usize::try_from(n).map_or(MAX_AMOUNT, |n| n.min(MAX_AMOUNT)),
    }
}

/// Whether a recipe satisfies at least one day's constraints.
///
/// Days are OR-ed. Within a day, the cuisine list (if non-empty) must contain the
/// recipe's cuisine and the ingredient list (if non-empty) must contain the main
/// ingredient or any line ingredient.
pub fn matches_constraints(candidate: &RecipeProjection, days: &[DailyConstraints]) -> bool {
    if days.is_empty() {
        return true;
    }

    days.iter().any(|day| {
        let cuisine_ok = day.cuisine_constraints.is_empty()
            || day.cuisine_constraints.contains(&candidate.recipe.cuisine_id);
        let ingredient_ok = day.ingredient_constraints.is_empty()
            || candidate
                .ingredient_ids()
                .any(|id| day.ingredient_constraints.contains(&id));
        cuisine_ok && ingredient_ok
    })
}

/// `1 - mean cosine similarity` against the selected embeddings; 1.0 when none.
pub fn diversity_score(candidate: &[f32], selected: &[&[f32]]) -> f64 {
    if selected.is_empty() {
        return 1.0;
    }

    let total: f64 = selected
        .iter()
        .map(|embedding| cosine_similarity(candidate, embedding))
        .sum();

    1.0 - total / selected.len() as f64
}

/// A candidate with its diversity score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub recipe_id: Uuid,
    pub score: f64,
}

/// Filter, exclude, score and rank the pool against the selected embeddings.
/// Pure and synchronous.
pub fn rank_candidates(
    pool: &[RecipeProjection],
    selected_embeddings: &[&[f32]],
    request: &SuggestionRequest,
) -> Vec<ScoredCandidate> {
    let selected_ids: HashSet<Uuid> = request.already_selected_recipe_ids.iter().copied().collect();

    let mut scored: Vec<ScoredCandidate> = pool
        .iter()
        .filter(|p| matches_constraints(p, &request.daily_constraints))
        .filter(|p| !selected_ids.contains(&p.recipe.id))
        .map(|p| ScoredCandidate {
            recipe_id: p.recipe.id,
            score: diversity_score(&p.recipe.embedding, selected_embeddings),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.recipe_id.cmp(&b.recipe_id))
    });

    scored.truncate(clamp_amount(request.amount));
    scored
}

/// Suggest recipes for `owner_id`, most diverse first.
pub async fn suggest(
    store: &dyn RecipeReadStore,
    owner_id: Uuid,
    request: &SuggestionRequest,
) -> Result<Vec<Uuid>, PlannerError> {
    let pool = store.get_all(owner_id, CANDIDATE_POOL_CAP, 0).await?;

    if pool.len() as i64 == CANDIDATE_POOL_CAP {
        tracing::warn!(
            owner_id = %owner_id,
            cap = CANDIDATE_POOL_CAP,
            "Candidate pool hit the cap; older recipes are not considered"
        );
    }

    let selected = selected_embeddings(store, &pool, &request.already_selected_recipe_ids).await?;
    let selected: Vec<&[f32]> = selected.iter().map(Vec::as_slice).collect();

    let ranked = rank_candidates(&pool, &selected, request);

    tracing::debug!(
        owner_id = %owner_id,
        pool_size = pool.len(),
        returned = ranked.len(),
        "Suggestions computed"
    );

    Ok(ranked.into_iter().map(|c| c.recipe_id).collect())
}

/// Embeddings of the already-selected recipes.
///
/// Taken from the unfiltered pool when present, otherwise loaded by id so that
/// selections outside the capped pool still count. Ids unknown to the store are
/// skipped.
async fn selected_embeddings(
    store: &dyn RecipeReadStore,
    pool: &[RecipeProjection],
    selected_ids: &[Uuid],
) -> Result<Vec<Vec<f32>>, PlannerError> {
    let by_id: HashMap<Uuid, &RecipeProjection> = pool.iter().map(|p| (p.recipe.id, p)).collect();

    let mut seen = HashSet::new();
    let mut embeddings = Vec::new();
    let mut missing = 0usize;

    for id in selected_ids {
        if !seen.insert(*id) {
            continue;
        }

        if let Some(projection) = by_id.get(id) {
            embeddings.push(projection.recipe.embedding.clone());
            continue;
        }

        match store.get_by_id(*id).await? {
            Some(projection) => embeddings.push(projection.recipe.embedding),
            None => missing += 1,
        }
    }

    if missing > 0 {
        tracing::debug!(
            requested = seen.len(),
            missing = missing,
            "Some already-selected recipes are not in the read model"
        );
    }

    Ok(embeddings)
}
