use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use amy_core::DomainError;
use amy_infra::LedgerError;
use amy_quickbooks::QuickBooksError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Caller input problems are always 400.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let code = match &err {
        DomainError::Validation(_) => "validation_error",
        DomainError::InvalidRange { .. } => "invalid_range",
        DomainError::UnknownGranularity(_) => "unknown_granularity",
        DomainError::UnknownLocation(_) => "unknown_location",
    };
    json_error(StatusCode::BAD_REQUEST, code, err.to_string())
}

pub fn quickbooks_error_to_response(err: QuickBooksError) -> axum::response::Response {
    let status = match &err {
        QuickBooksError::NotConnected(_) => StatusCode::CONFLICT,
        QuickBooksError::AuthorizationFailed(_) => StatusCode::BAD_REQUEST,
        QuickBooksError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        QuickBooksError::RefreshFailed(_)
        | QuickBooksError::Unauthorized
        | QuickBooksError::ExternalApi { .. }
        | QuickBooksError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        QuickBooksError::Transport(_) => StatusCode::GATEWAY_TIMEOUT,
        QuickBooksError::Store(_) | QuickBooksError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut response = json_error(status, err.code(), err.to_string());
    if let QuickBooksError::RateLimited {
        retry_after: Some(secs),
    } = err
    {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::Unavailable(msg) => {
            json_error(StatusCode::BAD_GATEWAY, "ledger_unavailable", msg)
        }
        LedgerError::Query(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "ledger_error", msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_retry_after_header() {
        let res = quickbooks_error_to_response(QuickBooksError::RateLimited { retry_after: Some(12) });
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "12");
    }

    #[test]
    fn domain_errors_are_bad_requests() {
        let res = domain_error_to_response(DomainError::UnknownGranularity("weekly".into()));
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
