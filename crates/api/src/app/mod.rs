//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, token codec, mailer and checkout wiring
//! - `factory.rs`: the generic list/get/create/update/delete handlers
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `extract.rs`: body and query extractors
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    middleware::map_response_with_state,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::AppConfig;

pub mod errors;
pub mod extract;
pub mod factory;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

/// Largest accepted request body.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> Result<Router, StartupError> {
    let services = services::build_services(config).await?;
    Ok(build_app_with(services))
}

/// Build the router around already-wired services.
pub fn build_app_with(services: AppServices) -> Router {
    let auth = services.auth_state();
    let environment = services.config.environment;
    let services = Arc::new(services);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/webhook-checkout", post(routes::bookings::webhook_checkout))
        .nest("/api/v1", routes::router(&auth))
        .fallback(routes::system::not_found)
        .layer(Extension(services))
        .layer(map_response_with_state(environment, errors::expose_error_detail))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES)),
        )
}
