use std::env;

/// Read-model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Postgres,
    InMemory,
}

impl StoreType {
    pub fn from_str(value: &str) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "postgres" => Ok(StoreType::Postgres),
            "inmemory" => Ok(StoreType::InMemory),
            other => Err(format!(
                "Invalid STORE_TYPE: {}. Must be 'postgres' or 'inmemory'",
                other
            )),
        }
    }
}

/// Broker backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Nats,
    InMemory,
}

impl BusType {
    pub fn from_str(value: &str) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "nats" => Ok(BusType::Nats),
            "inmemory" => Ok(BusType::InMemory),
            other => Err(format!(
                "Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'",
                other
            )),
        }
    }
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub store_type: StoreType,
    pub bus_type: BusType,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    pub recipe_events_exchange: String,
    pub recipe_events_queue: String,
    pub recipe_events_binding: String,
    pub recipe_events_dlq_subject: String,
    /// 0 disables dead-lettering (failed events are requeued forever)
    pub max_deliveries: u32,
    pub recipe_sync_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let store_type = StoreType::from_str(&var_or("STORE_TYPE", "postgres"))?;

        let database_url = lookup("DATABASE_URL");
        if store_type == StoreType::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set".to_string());
        }

        let bus_type = BusType::from_str(&var_or("BUS_TYPE", "inmemory"))?;

        let port: u16 = var_or("PORT", "8095")
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let max_deliveries: u32 = var_or("MEALPLANNER_MAX_DELIVERIES", "5")
            .parse()
            .map_err(|_| "MEALPLANNER_MAX_DELIVERIES must be a non-negative integer".to_string())?;

        let recipe_sync_enabled = match var_or("RECIPE_SYNC_ENABLED", "true").to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => return Err(format!("RECIPE_SYNC_ENABLED must be a boolean, got {}", other)),
        };

        Ok(Config {
            database_url,
            store_type,
            bus_type,
            nats_url: var_or("NATS_URL", "nats://localhost:4222"),
            host: var_or("HOST", "0.0.0.0"),
            port,
            recipe_events_exchange: var_or("RECIPE_EVENTS_EXCHANGE", "recipe-events"),
            recipe_events_queue: var_or("RECIPE_EVENTS_QUEUE", "mealplanner-recipe-events"),
            recipe_events_binding: var_or("RECIPE_EVENTS_BINDING", "recipe.>"),
            recipe_events_dlq_subject: var_or(
                "RECIPE_EVENTS_DLQ_SUBJECT",
                "dlq.mealplanner.recipe-events",
            ),
            max_deliveries,
            recipe_sync_enabled,
        })
    }
}
