use axum::{routing::get, Router};

pub mod marketer;
pub mod quickbooks;
pub mod system;

/// Router for the reporting API.
pub fn router() -> Router {
    Router::new()
        .nest("/api/quickbooks", quickbooks::router())
        .route("/api/marketer-profitability", get(marketer::marketer_profitability))
}
