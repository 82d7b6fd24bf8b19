//construction du routeur HTTP du plan Aid
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::state::AppState;
use tower_http::cors::CorsLayer;

pub mod auth;
mod routes;

//exposition du routeur: tout sauf la santé passe par l'identité encodeur
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/aid/v1/list-jobs", post(routes::list_jobs))
        .route("/aid/v1/claim-job", post(routes::claim_job))
        .route("/aid/v1/update-job", post(routes::update_job))
        .route("/aid/v1/complete-job", post(routes::complete_job))
        .route("/aid/v1/job/:job_id", get(routes::get_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::identity,
        ))
        .route("/aid/v1/health", get(routes::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
}
