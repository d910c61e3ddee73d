mod activate;
mod checkout;
mod download;
mod licenses;
mod verify;

pub use activate::*;
pub use checkout::*;
pub use download::*;
pub use licenses::*;
pub use verify::*;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::util::{iso8601, now};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    timestamp: String,
    version: String,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "RescuePC Licensing API",
        timestamp: iso8601(now()),
        version: state.version.clone(),
        environment: state.environment.clone(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/verify-license", post(verify_license))
        .route("/api/activate", post(activate_license))
        .route("/api/checkout", post(create_checkout))
        .route("/api/licenses/validate", post(validate_license))
        .route("/api/download/secure", get(secure_download))
}
