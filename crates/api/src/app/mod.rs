//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, QuickBooks clients and the response cache
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: query parsing and response shapes
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use amy_infra::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> anyhow::Result<Router> {
    let services = services::build_services(&config).await?;
    Ok(build_app_with_services(Arc::new(services)))
}

/// Router over already wired services (tests inject in-memory stores here).
pub fn build_app_with_services(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

pub use services::{AppServices, ServiceDeps};
