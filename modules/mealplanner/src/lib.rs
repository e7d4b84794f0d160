pub mod config;
pub mod consumer;
pub mod contracts;
pub mod db;
pub mod dlq;
pub mod health;
pub mod metrics;
pub mod repos;
pub mod routes;
pub mod services;

pub use consumer::start_recipe_events_consumer;
