//! Recipe read-model store
//!
//! Denormalized projection of recipes used only by recommendation reads. Rows are
//! written exclusively by the recipe event consumer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Projection row for one recipe
#[derive(Debug, Clone, PartialEq)]
pub struct ReadModelRecipe {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub prep_time_minutes: i32,
    pub cook_time_minutes: i32,
    pub total_time_minutes: i32,
    pub servings: i32,
    pub yield_quantity: Option<f64>,
    pub yield_unit: String,
    pub main_ingredient_id: Uuid,
    pub main_ingredient_name: String,
    pub cuisine_id: Uuid,
    pub cuisine_name: String,
    pub allergy_ids: Vec<Uuid>,
    pub allergy_names: Vec<String>,
    pub tags: Vec<String>,
    pub image_url: String,
    pub calories_total: f64,
    pub calories_per_serving: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub sugar_g: f64,
    pub sodium_mg: f64,
    /// Semantic embedding; empty when the producer sent none
    pub embedding: Vec<f32>,
    pub aggregate_version: i64,
    /// Kept from the first write; later upserts do not move it
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ingredient line of a projected recipe
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ReadModelIngredientLine {
    pub recipe_id: Uuid,
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub quantity_value: Option<f64>,
    pub quantity_text: String,
    pub unit: String,
    pub is_optional: bool,
    pub note: String,
    pub sort_order: i32,
}

/// A recipe together with its ingredient lines (ordered by `sort_order`)
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeProjection {
    pub recipe: ReadModelRecipe,
    pub lines: Vec<ReadModelIngredientLine>,
}

impl RecipeProjection {
    /// Main ingredient followed by every line ingredient
    pub fn ingredient_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        std::iter::once(self.recipe.main_ingredient_id)
            .chain(self.lines.iter().map(|line| line.ingredient_id))
    }
}

/// Nearest-neighbour result for similarity reads
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarRecipe {
    pub recipe: ReadModelRecipe,
    /// Cosine similarity in [-1, 1], higher is closer
    pub similarity: f64,
}

/// Result of an upsert under the aggregate-version guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Row inserted or replaced
    Applied,
    /// Stored row carries a newer aggregate version; nothing changed
    Stale { stored_version: i64 },
}

/// Errors that can occur during read-model operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid page: limit={limit}, offset={offset}")]
    InvalidPage { limit: i64, offset: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-model store contract
///
/// Implementations are safe for concurrent callers. Any transactional discipline
/// (upsert plus line replacement as one unit) is internal. Errors are returned
/// unchanged; there are no internal retries.
#[async_trait]
pub trait RecipeReadStore: Send + Sync {
    /// Insert or replace the recipe and all of its ingredient lines atomically.
    async fn upsert(
        &self,
        recipe: &ReadModelRecipe,
        lines: &[ReadModelIngredientLine],
    ) -> StoreResult<UpsertOutcome>;

    /// Remove a recipe and its lines. Returns whether a row existed.
    async fn delete(&self, recipe_id: Uuid) -> StoreResult<bool>;

    /// Owner's recipes, newest first, ties broken by id descending.
    async fn get_all(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<RecipeProjection>>;

    async fn get_by_id(&self, recipe_id: Uuid) -> StoreResult<Option<RecipeProjection>>;

    /// Same-owner recipes closest to `recipe_id` by cosine distance, itself excluded.
    async fn get_similar(&self, recipe_id: Uuid, limit: i64) -> StoreResult<Vec<SimilarRecipe>>;
}

pub(crate) fn check_page(limit: i64, offset: i64) -> StoreResult<()> {
    if limit < 0 || offset < 0 {
        return Err(StoreError::InvalidPage { limit, offset });
    }
    Ok(())
}

// ============================================================================
// Postgres implementation
// ============================================================================

const RECIPE_COLUMNS: &str = r#"
    r.id, r.user_id, r.name, r.description,
    r.prep_time_minutes, r.cook_time_minutes, r.total_time_minutes, r.servings,
    r.yield_quantity, r.yield_unit,
    r.main_ingredient_id, r.main_ingredient_name, r.cuisine_id, r.cuisine_name,
    r.allergy_ids, r.allergy_names, r.tags, r.image_url,
    r.calories_total, r.calories_per_serving, r.protein_g, r.carbs_g,
    r.fat_g, r.fiber_g, r.sugar_g, r.sodium_mg,
    r.embedding, r.aggregate_version, r.created_at, r.updated_at
"#;

const LINE_COLUMNS: &str = r#"
    recipe_id, ingredient_id, ingredient_name, quantity_value, quantity_text,
    unit, is_optional, note, sort_order
"#;

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: String,
    prep_time_minutes: i32,
    cook_time_minutes: i32,
    total_time_minutes: i32,
    servings: i32,
    yield_quantity: Option<f64>,
    yield_unit: String,
    main_ingredient_id: Uuid,
    main_ingredient_name: String,
    cuisine_id: Uuid,
    cuisine_name: String,
    allergy_ids: Vec<Uuid>,
    allergy_names: Vec<String>,
    tags: Vec<String>,
    image_url: String,
    calories_total: f64,
    calories_per_serving: f64,
    protein_g: f64,
    carbs_g: f64,
    fat_g: f64,
    fiber_g: f64,
    sugar_g: f64,
    sodium_mg: f64,
    embedding: Option<Vector>,
    aggregate_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecipeRow> for ReadModelRecipe {
    fn from(row: RecipeRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            prep_time_minutes: row.prep_time_minutes,
            cook_time_minutes: row.cook_time_minutes,
            total_time_minutes: row.total_time_minutes,
            servings: row.servings,
            yield_quantity: row.yield_quantity,
            yield_unit: row.yield_unit,
            main_ingredient_id: row.main_ingredient_id,
            main_ingredient_name: row.main_ingredient_name,
            cuisine_id: row.cuisine_id,
            cuisine_name: row.cuisine_name,
            allergy_ids: row.allergy_ids,
            allergy_names: row.allergy_names,
            tags: row.tags,
            image_url: row.image_url,
            calories_total: row.calories_total,
            calories_per_serving: row.calories_per_serving,
            protein_g: row.protein_g,
            carbs_g: row.carbs_g,
            fat_g: row.fat_g,
            fiber_g: row.fiber_g,
            sugar_g: row.sugar_g,
            sodium_mg: row.sodium_mg,
            embedding: row.embedding.map(|v| v.to_vec()).unwrap_or_default(),
            aggregate_version: row.aggregate_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SimilarRow {
    #[sqlx(flatten)]
    recipe: RecipeRow,
    distance: f64,
}

/// Postgres-backed read model (embeddings stored as pgvector `vector`)
#[derive(Clone)]
pub struct PgRecipeReadStore {
    pool: PgPool,
}

impl PgRecipeReadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_recipe_row(
        tx: &mut Transaction<'_, Postgres>,
        recipe: &ReadModelRecipe,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        // pgvector rejects zero-dimension vectors
        let embedding = (!recipe.embedding.is_empty()).then(|| Vector::from(recipe.embedding.clone()));

        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO recipe_read_models (
                id, user_id, name, description,
                prep_time_minutes, cook_time_minutes, total_time_minutes, servings,
                yield_quantity, yield_unit,
                main_ingredient_id, main_ingredient_name, cuisine_id, cuisine_name,
                allergy_ids, allergy_names, tags, image_url,
                calories_total, calories_per_serving, protein_g, carbs_g,
                fat_g, fiber_g, sugar_g, sodium_mg,
                embedding, aggregate_version, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27, $28, $29, $30
            )
            ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                prep_time_minutes = EXCLUDED.prep_time_minutes,
                cook_time_minutes = EXCLUDED.cook_time_minutes,
                total_time_minutes = EXCLUDED.total_time_minutes,
                servings = EXCLUDED.servings,
                yield_quantity = EXCLUDED.yield_quantity,
                yield_unit = EXCLUDED.yield_unit,
                main_ingredient_id = EXCLUDED.main_ingredient_id,
                main_ingredient_name = EXCLUDED.main_ingredient_name,
                cuisine_id = EXCLUDED.cuisine_id,
                cuisine_name = EXCLUDED.cuisine_name,
                allergy_ids = EXCLUDED.allergy_ids,
                allergy_names = EXCLUDED.allergy_names,
                tags = EXCLUDED.tags,
                image_url = EXCLUDED.image_url,
                calories_total = EXCLUDED.calories_total,
                calories_per_serving = EXCLUDED.calories_per_serving,
                protein_g = EXCLUDED.protein_g,
                carbs_g = EXCLUDED.carbs_g,
                fat_g = EXCLUDED.fat_g,
                fiber_g = EXCLUDED.fiber_g,
                sugar_g = EXCLUDED.sugar_g,
                sodium_mg = EXCLUDED.sodium_mg,
                embedding = EXCLUDED.embedding,
                aggregate_version = EXCLUDED.aggregate_version,
                updated_at = EXCLUDED.updated_at
            WHERE recipe_read_models.aggregate_version <= EXCLUDED.aggregate_version
            RETURNING id
            "#,
        )
        .bind(recipe.id)
        .bind(recipe.user_id)
        .bind(&recipe.name)
        .bind(&recipe.description)
        .bind(recipe.prep_time_minutes)
        .bind(recipe.cook_time_minutes)
        .bind(recipe.total_time_minutes)
        .bind(recipe.servings)
        .bind(recipe.yield_quantity)
        .bind(&recipe.yield_unit)
        .bind(recipe.main_ingredient_id)
        .bind(&recipe.main_ingredient_name)
        .bind(recipe.cuisine_id)
        .bind(&recipe.cuisine_name)
        .bind(&recipe.allergy_ids)
        .bind(&recipe.allergy_names)
        .bind(&recipe.tags)
        .bind(&recipe.image_url)
        .bind(recipe.calories_total)
        .bind(recipe.calories_per_serving)
        .bind(recipe.protein_g)
        .bind(recipe.carbs_g)
        .bind(recipe.fat_g)
        .bind(recipe.fiber_g)
        .bind(recipe.sugar_g)
        .bind(recipe.sodium_mg)
        .bind(embedding)
        .bind(recipe.aggregate_version)
        .bind(recipe.created_at)
        .bind(recipe.updated_at)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn replace_lines(
        tx: &mut Transaction<'_, Postgres>,
        recipe_id: Uuid,
        lines: &[ReadModelIngredientLine],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM recipe_read_model_ingredients WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut **tx)
            .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO recipe_read_model_ingredients (
                    recipe_id, ingredient_id, ingredient_name, quantity_value,
                    quantity_text, unit, is_optional, note, sort_order
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(recipe_id)
            .bind(line.ingredient_id)
            .bind(&line.ingredient_name)
            .bind(line.quantity_value)
            .bind(&line.quantity_text)
            .bind(&line.unit)
            .bind(line.is_optional)
            .bind(&line.note)
            .bind(line.sort_order)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn fetch_lines(
        &self,
        recipe_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ReadModelIngredientLine>>, sqlx::Error> {
        if recipe_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let lines = sqlx::query_as::<_, ReadModelIngredientLine>(&format!(
            "SELECT {} FROM recipe_read_model_ingredients WHERE recipe_id = ANY($1) ORDER BY recipe_id, sort_order, id",
            LINE_COLUMNS
        ))
        .bind(recipe_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_recipe: HashMap<Uuid, Vec<ReadModelIngredientLine>> = HashMap::new();
        for line in lines {
            by_recipe.entry(line.recipe_id).or_default().push(line);
        }
        Ok(by_recipe)
    }
}

#[async_trait]
impl RecipeReadStore for PgRecipeReadStore {
    async fn upsert(
        &self,
        recipe: &ReadModelRecipe,
        lines: &[ReadModelIngredientLine],
    ) -> StoreResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        if Self::upsert_recipe_row(&mut tx, recipe).await?.is_none() {
            let stored_version: i64 = sqlx::query_scalar(
                "SELECT aggregate_version FROM recipe_read_models WHERE id = $1",
            )
            .bind(recipe.id)
            .fetch_one(&mut *tx)
            .await?;

            tx.rollback().await?;
            return Ok(UpsertOutcome::Stale { stored_version });
        }

        Self::replace_lines(&mut tx, recipe.id, lines).await?;
        tx.commit().await?;

        Ok(UpsertOutcome::Applied)
    }

    async fn delete(&self, recipe_id: Uuid) -> StoreResult<bool> {
        // Lines go with the row (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM recipe_read_models WHERE id = $1")
            .bind(recipe_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_all(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<RecipeProjection>> {
        check_page(limit, offset)?;

        let rows = sqlx::query_as::<_, RecipeRow>(&format!(
            r#"
            SELECT {}
            FROM recipe_read_models r
            WHERE r.user_id = $1
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT $2 OFFSET $3
            "#,
            RECIPE_COLUMNS
        ))
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut lines = self.fetch_lines(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let lines = lines.remove(&row.id).unwrap_or_default();
                RecipeProjection {
                    recipe: row.into(),
                    lines,
                }
            })
            .collect())
    }

    async fn get_by_id(&self, recipe_id: Uuid) -> StoreResult<Option<RecipeProjection>> {
        let row = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {} FROM recipe_read_models r WHERE r.id = $1",
            RECIPE_COLUMNS
        ))
        .bind(recipe_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = self
            .fetch_lines(&[row.id])
            .await?
            .remove(&row.id)
            .unwrap_or_default();

        Ok(Some(RecipeProjection {
            recipe: row.into(),
            lines,
        }))
    }

    async fn get_similar(&self, recipe_id: Uuid, limit: i64) -> StoreResult<Vec<SimilarRecipe>> {
        check_page(limit, 0)?;

        let rows = sqlx::query_as::<_, SimilarRow>(&format!(
            r#"
            SELECT {}, (r.embedding <=> t.embedding)::float8 AS distance
            FROM recipe_read_models r
            JOIN recipe_read_models t ON t.id = $1
            WHERE r.user_id = t.user_id
              AND r.id <> t.id
              AND r.embedding IS NOT NULL
              AND t.embedding IS NOT NULL
              AND vector_dims(r.embedding) = vector_dims(t.embedding)
            ORDER BY distance ASC, r.id ASC
            LIMIT $2
            "#,
            RECIPE_COLUMNS
        ))
        .bind(recipe_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SimilarRecipe {
                recipe: row.recipe.into(),
                similarity: 1.0 - row.distance,
            })
            .collect())
    }
}
