//! In-memory read model for tests and local development

use super::recipe_read_repo::{
    check_page, ReadModelIngredientLine, ReadModelRecipe, RecipeProjection, RecipeReadStore,
    SimilarRecipe, StoreResult, UpsertOutcome,
};
use crate::services::similarity::cosine_similarity;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
pub struct InMemoryRecipeReadStore {
    recipes: Arc<RwLock<HashMap<Uuid, RecipeProjection>>>,
}

impl InMemoryRecipeReadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.recipes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.recipes.read().await.is_empty()
    }
}

fn newest_first(a: &ReadModelRecipe, b: &ReadModelRecipe) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl RecipeReadStore for InMemoryRecipeReadStore {
    async fn upsert(
        &self,
        recipe: &ReadModelRecipe,
        lines: &[ReadModelIngredientLine],
    ) -> StoreResult<UpsertOutcome> {
        let mut recipes = self.recipes.write().await;

        let mut recipe = recipe.clone();
        if let Some(existing) = recipes.get(&recipe.id) {
            if existing.recipe.aggregate_version > recipe.aggregate_version {
                return Ok(UpsertOutcome::Stale {
                    stored_version: existing.recipe.aggregate_version,
                });
            }
            recipe.created_at = existing.recipe.created_at;
        }

        let mut lines: Vec<ReadModelIngredientLine> = lines
            .iter()
            .cloned()
            .map(|mut line| {
                line.recipe_id = recipe.id;
                line
            })
            .collect();
        lines.sort_by_key(|line| line.sort_order);

        recipes.insert(recipe.id, RecipeProjection { recipe, lines });
        Ok(UpsertOutcome::Applied)
    }

    async fn delete(&self, recipe_id: Uuid) -> StoreResult<bool> {
        Ok(self.recipes.write().await.remove(&recipe_id).is_some())
    }

    async fn get_all(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<RecipeProjection>> {
        check_page(limit, offset)?;

        let recipes = self.recipes.read().await;
        let mut owned: Vec<&RecipeProjection> = recipes
            .values()
            .filter(|projection| projection.recipe.user_id == owner_id)
            .collect();
        owned.sort_by(|a, b| newest_first(&a.recipe, &b.recipe));

        Ok(owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, recipe_id: Uuid) -> StoreResult<Option<RecipeProjection>> {
        Ok(self.recipes.read().await.get(&recipe_id).cloned())
    }

    async fn get_similar(&self, recipe_id: Uuid, limit: i64) -> StoreResult<Vec<SimilarRecipe>> {
        check_page(limit, 0)?;

        let recipes = self.recipes.read().await;
        let Some(target) = recipes.get(&recipe_id).map(|p| &p.recipe) else {
            return Ok(Vec::new());
        };
        if target.embedding.is_empty() {
            return Ok(Vec::new());
        }

        let mut similar: Vec<SimilarRecipe> = recipes
            .values()
            .map(|p| &p.recipe)
            .filter(|r| {
                r.user_id == target.user_id
                    && r.id != target.id
                    && r.embedding.len() == target.embedding.len()
            })
            .map(|r| SimilarRecipe {
                recipe: r.clone(),
                similarity: cosine_similarity(&target.embedding, &r.embedding),
            })
            .collect();

        similar.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.recipe.id.cmp(&b.recipe.id))
        });
        similar.truncate(limit as usize);

        Ok(similar)
    }
}
