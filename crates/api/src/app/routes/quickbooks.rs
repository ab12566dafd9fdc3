use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use amy_core::LocationTag;

use crate::app::dto::{
    self, CallbackQuery, LocationQuery, ReportParams, RevenueQuery, RevenueResponse,
};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/revenue", get(get_revenue))
        .route("/status", get(get_status))
        .route("/connect", get(connect))
        .route("/callback", get(callback))
        .route("/disconnect", post(disconnect))
}

pub async fn get_revenue(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<RevenueQuery>,
) -> axum::response::Response {
    let params = match ReportParams::parse(
        q.location.as_deref(),
        q.start_date.as_deref(),
        q.end_date.as_deref(),
        q.granularity.as_deref(),
    ) {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let method = match dto::parse_accounting_method(q.accounting_method.as_deref()) {
        Ok(m) => m,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.revenue(&params, method).await {
        Ok(lookup) => (
            StatusCode::OK,
            Json(RevenueResponse::new(&params, method, lookup.report, lookup.source)),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_status(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.tokens().status(services.locations()).await {
        Ok(locations) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "configured": !services.oauth().config().client_id.is_empty(),
                "locations": locations,
            })),
        )
            .into_response(),
        Err(e) => errors::quickbooks_error_to_response(e),
    }
}

/// Start OAuth: redirect the browser to the QuickBooks consent screen.
pub async fn connect(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<LocationQuery>,
) -> axum::response::Response {
    let location = match services.configured_location(q.location.as_deref()) {
        Ok(l) => l,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.oauth().authorize_url(&location) {
        Ok(url) => redirect(url.as_str()),
        Err(e) => errors::quickbooks_error_to_response(e),
    }
}

/// OAuth redirect target: exchange the code and store the credential.
pub async fn callback(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<CallbackQuery>,
) -> axum::response::Response {
    if let Some(err) = q.error {
        warn!(error = %err, "QuickBooks authorization was declined");
        return errors::json_error(StatusCode::BAD_REQUEST, "authorization_failed", err);
    }

    let (Some(code), Some(state), Some(realm_id)) = (q.code, q.state, q.realm_id) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "code, state and realmId are required",
        );
    };
    let location = match services.configured_location(Some(&state)) {
        Ok(l) => l,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let grant = match services.oauth().exchange_code(&code).await {
        Ok(g) => g,
        Err(e) => return errors::quickbooks_error_to_response(e),
    };
    let realm_id = grant.realm_id.clone().unwrap_or(realm_id);
    if let Err(e) = services.tokens().connect(location.clone(), realm_id, grant).await {
        return errors::quickbooks_error_to_response(e);
    }
    services.invalidate_location(&location);

    redirect(&dashboard_redirect(services.dashboard_url(), &location))
}

pub async fn disconnect(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<LocationQuery>,
) -> axum::response::Response {
    let location = match services.configured_location(q.location.as_deref()) {
        Ok(l) => l,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.tokens().disconnect(&location).await {
        Ok(removed) => {
            services.invalidate_location(&location);
            info!(location = %location, removed, "QuickBooks disconnect requested");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "location": location,
                    "disconnected": removed,
                })),
            )
                .into_response()
        }
        Err(e) => errors::quickbooks_error_to_response(e),
    }
}

fn redirect(location: &str) -> axum::response::Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn dashboard_redirect(dashboard_url: &str, location: &LocationTag) -> String {
    let sep = if dashboard_url.contains('?') { '&' } else { '?' };
    format!("{dashboard_url}{sep}quickbooks=connected&location={location}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_redirect_appends_query() {
        let austin = LocationTag::new("austin").unwrap();
        assert_eq!(
            dashboard_redirect("/", &austin),
            "/?quickbooks=connected&location=austin"
        );
        assert_eq!(
            dashboard_redirect("https://amy.example/app?tab=qb", &austin),
            "https://amy.example/app?tab=qb&quickbooks=connected&location=austin"
        );
    }
}
