//! HTTP surface of the planner

pub mod similar;
pub mod suggestions;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::health::health;
use crate::metrics::Metrics;
use crate::repos::RecipeReadStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecipeReadStore>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(store: Arc<dyn RecipeReadStore>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/mealplanner/users/{user_id}/suggestions",
            post(suggestions::post_suggestions),
        )
        .route(
            "/api/mealplanner/recipes/{recipe_id}/similar",
            get(similar::get_similar_recipes),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    state.metrics.render().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        ApiError::internal(format!("Failed to encode metrics: {}", e))
    })
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response wrapper for proper HTTP error handling
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
