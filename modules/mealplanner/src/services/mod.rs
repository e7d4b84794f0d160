pub mod planner;
pub mod recipe_projection;
pub mod similarity;
