pub mod recipe_events_v1;

pub use recipe_events_v1::{
    ContractError, IngredientLineSnapshot, NamedRef, NutritionSnapshot, RecipeDeletedV1,
    RecipeEvent, RecipeSnapshot, RecipeUpsertedV1, RECIPE_DELETED, RECIPE_UPSERTED,
};
