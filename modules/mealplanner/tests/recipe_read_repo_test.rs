//! PgRecipeReadStore integration tests
//!
//! Require Postgres with the pgvector extension available:
//! `DATABASE_URL=postgres://... cargo test -p mealplanner-rs -- --ignored`

mod common;

use chrono::{Duration, Utc};
use common::{cleanup_owner, get_test_pool};
use mealplanner_rs::repos::{
    PgRecipeReadStore, ReadModelIngredientLine, ReadModelRecipe, RecipeReadStore, StoreError,
    UpsertOutcome,
};
use serial_test::serial;
use uuid::Uuid;

fn recipe(owner: Uuid, name: &str, embedding: Vec<f32>) -> ReadModelRecipe {
    let now = Utc::now();
    ReadModelRecipe {
        id: Uuid::new_v4(),
        user_id: owner,
        name: name.to_string(),
        description: String::new(),
        prep_time_minutes: 5,
        cook_time_minutes: 25,
        total_time_minutes: 30,
        servings: 2,
        yield_quantity: Some(1.5),
        yield_unit: "l".into(),
        main_ingredient_id: Uuid::new_v4(),
        main_ingredient_name: "Rice".into(),
        cuisine_id: Uuid::new_v4(),
        cuisine_name: "Spanish".into(),
        allergy_ids: vec![Uuid::new_v4()],
        allergy_names: vec!["Shellfish".into()],
        tags: vec!["dinner".into(), "rice".into()],
        image_url: "https://img.example/paella.jpg".into(),
        calories_total: 900.0,
        calories_per_serving: 450.0,
        protein_g: 30.0,
        carbs_g: 110.0,
        fat_g: 20.0,
        fiber_g: 4.0,
        sugar_g: 3.0,
        sodium_mg: 1200.0,
        embedding,
        aggregate_version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn line(recipe_id: Uuid, sort_order: i32) -> ReadModelIngredientLine {
    ReadModelIngredientLine {
        recipe_id,
        ingredient_id: Uuid::new_v4(),
        ingredient_name: format!("ingredient {}", sort_order),
        quantity_value: Some(2.0),
        quantity_text: "2".into(),
        unit: "cup".into(),
        is_optional: sort_order % 2 == 0,
        note: String::new(),
        sort_order,
    }
}

#[tokio::test]
#[ignore] // Requires Postgres with pgvector
#[serial]
async fn test_upsert_round_trips_all_fields() {
    let pool = get_test_pool().await;
    let store = PgRecipeReadStore::new(pool.clone());
    let owner = Uuid::new_v4();

    let r = recipe(owner, "Paella", vec![0.1, 0.2, 0.3]);
    let lines = vec![line(r.id, 2), line(r.id, 1)];

    assert_eq!(store.upsert(&r, &lines).await.unwrap(), UpsertOutcome::Applied);

    let stored = store.get_by_id(r.id).await.unwrap().expect("recipe should exist");
    assert_eq!(stored.recipe.name, "Paella");
    assert_eq!(stored.recipe.tags, r.tags);
    assert_eq!(stored.recipe.allergy_ids, r.allergy_ids);
    assert_eq!(stored.recipe.yield_quantity, Some(1.5));
    assert_eq!(stored.recipe.embedding, vec![0.1, 0.2, 0.3]);
    assert_eq!(stored.lines.len(), 2);
    assert_eq!(stored.lines[0].sort_order, 1);

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires Postgres with pgvector
#[serial]
async fn test_repeated_upsert_replaces_lines() {
    let pool = get_test_pool().await;
    let store = PgRecipeReadStore::new(pool.clone());
    let owner = Uuid::new_v4();

    let r = recipe(owner, "Risotto", vec![]);
    store
        .upsert(&r, &[line(r.id, 1), line(r.id, 2), line(r.id, 3)])
        .await
        .unwrap();
    store.upsert(&r, &[line(r.id, 1)]).await.unwrap();

    let all = store.get_all(owner, 10, 0).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].lines.len(), 1);
    assert!(all[0].recipe.embedding.is_empty());

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires Postgres with pgvector
#[serial]
async fn test_stale_upsert_leaves_row_untouched() {
    let pool = get_test_pool().await;
    let store = PgRecipeReadStore::new(pool.clone());
    let owner = Uuid::new_v4();

    let mut current = recipe(owner, "Current", vec![]);
    current.aggregate_version = 5;
    store.upsert(&current, &[line(current.id, 1)]).await.unwrap();

    let mut stale = current.clone();
    stale.name = "Stale".into();
    stale.aggregate_version = 3;
    let outcome = store.upsert(&stale, &[]).await.unwrap();

    assert_eq!(outcome, UpsertOutcome::Stale { stored_version: 5 });
    let stored = store.get_by_id(current.id).await.unwrap().unwrap();
    assert_eq!(stored.recipe.name, "Current");
    assert_eq!(stored.lines.len(), 1);

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires Postgres with pgvector
#[serial]
async fn test_update_keeps_created_at() {
    let pool = get_test_pool().await;
    let store = PgRecipeReadStore::new(pool.clone());
    let owner = Uuid::new_v4();

    let r = recipe(owner, "Gazpacho", vec![]);
    store.upsert(&r, &[]).await.unwrap();

    let mut updated = r.clone();
    updated.aggregate_version = 2;
    updated.created_at = r.created_at + Duration::hours(2);
    updated.updated_at = r.updated_at + Duration::hours(2);
    store.upsert(&updated, &[]).await.unwrap();

    let stored = store.get_by_id(r.id).await.unwrap().unwrap();
    assert_eq!(
        stored.recipe.created_at.timestamp_micros(),
        r.created_at.timestamp_micros()
    );
    assert_eq!(
        stored.recipe.updated_at.timestamp_micros(),
        updated.updated_at.timestamp_micros()
    );

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires Postgres with pgvector
#[serial]
async fn test_delete_removes_lines_and_is_idempotent() {
    let pool = get_test_pool().await;
    let store = PgRecipeReadStore::new(pool.clone());
    let owner = Uuid::new_v4();

    let r = recipe(owner, "Tortilla", vec![]);
    store.upsert(&r, &[line(r.id, 1)]).await.unwrap();

    assert!(store.delete(r.id).await.unwrap());
    assert!(!store.delete(r.id).await.unwrap());

    let orphan_lines: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM recipe_read_model_ingredients WHERE recipe_id = $1",
    )
    .bind(r.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(orphan_lines, 0);
}

#[tokio::test]
#[ignore] // Requires Postgres with pgvector
#[serial]
async fn test_get_all_pages_newest_first() {
    let pool = get_test_pool().await;
    let store = PgRecipeReadStore::new(pool.clone());
    let owner = Uuid::new_v4();
    let base = Utc::now();

    let mut ids = Vec::new();
    for i in 0..3 {
        let mut r = recipe(owner, &format!("Recipe {}", i), vec![]);
        r.created_at = base + Duration::minutes(i);
        ids.push(r.id);
        store.upsert(&r, &[]).await.unwrap();
    }

    let first: Vec<Uuid> = store
        .get_all(owner, 2, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.recipe.id)
        .collect();
    let second: Vec<Uuid> = store
        .get_all(owner, 2, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.recipe.id)
        .collect();

    assert_eq!(first, vec![ids[2], ids[1]]);
    assert_eq!(second, vec![ids[0]]);

    assert!(matches!(
        store.get_all(owner, -1, 0).await,
        Err(StoreError::InvalidPage { .. })
    ));

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires Postgres with pgvector
#[serial]
async fn test_get_similar_uses_cosine_distance() {
    let pool = get_test_pool().await;
    let store = PgRecipeReadStore::new(pool.clone());
    let owner = Uuid::new_v4();
    let other_owner = Uuid::new_v4();

    let target = recipe(owner, "Target", vec![1.0, 0.0, 0.0]);
    let close = recipe(owner, "Close", vec![0.9, 0.1, 0.0]);
    let far = recipe(owner, "Far", vec![0.0, 0.0, 1.0]);
    let unembedded = recipe(owner, "No vector", vec![]);
    let foreign = recipe(other_owner, "Foreign", vec![1.0, 0.0, 0.0]);
    for r in [&target, &close, &far, &unembedded, &foreign] {
        store.upsert(r, &[]).await.unwrap();
    }

    let similar = store.get_similar(target.id, 10).await.unwrap();
    let ids: Vec<Uuid> = similar.iter().map(|s| s.recipe.id).collect();
    assert_eq!(ids, vec![close.id, far.id]);
    assert!(similar[0].similarity > 0.9);
    assert!(similar[1].similarity.abs() < 1e-6);

    assert!(store.get_similar(unembedded.id, 10).await.unwrap().is_empty());

    cleanup_owner(&pool, owner).await;
    cleanup_owner(&pool, other_owner).await;
}
