pub mod public;
pub mod webhooks;

use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::db::AppState;
use crate::middleware::{cors_layer, https_redirect, preflight_no_content, with_security_headers};

/// Full HTTP surface with every cross-cutting layer applied.
pub fn app(state: AppState, cors: &CorsConfig, csp_report_uri: Option<&str>) -> Router {
    let routes = Router::new()
        .merge(public::router())
        .merge(webhooks::router())
        .layer(middleware::from_fn(https_redirect))
        .layer(cors_layer(cors))
        .layer(middleware::from_fn(preflight_no_content));

    with_security_headers(routes, csp_report_uri)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
