use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::*;
use super::openapi::ApiDoc;

/// Create the API router with Swagger UI
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/v1/health", get(health_check))
        .route("/api/v1/sync/report", get(get_last_report))
        .route("/api/v1/sync/watermarks", get(get_watermarks))
        .route("/api/v1/sync/run", post(trigger_run))
        .route("/api/v1/sync/stop", post(stop_run))
        .with_state(state)
}
