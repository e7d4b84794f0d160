pub mod recipe_events_consumer;

pub use recipe_events_consumer::{
    start_recipe_events_consumer, ConsumerSettings, Disposition, RecipeEventProcessor,
};
