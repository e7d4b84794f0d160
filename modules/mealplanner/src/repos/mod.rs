pub mod inmemory_recipe_repo;
pub mod recipe_read_repo;

pub use inmemory_recipe_repo::InMemoryRecipeReadStore;
pub use recipe_read_repo::{
    PgRecipeReadStore, ReadModelIngredientLine, ReadModelRecipe, RecipeProjection,
    RecipeReadStore, SimilarRecipe, StoreError, StoreResult, UpsertOutcome,
};
