use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use amy_core::{Granularity, LocationTag, ManualClock, split_into_periods};
use amy_quickbooks::credential::{Credential, CredentialStore, InMemoryCredentialStore};
use amy_quickbooks::oauth::{ACCOUNTING_SCOPE, TokenRefresher};
use amy_quickbooks::{
    AccountingMethod, LocationState, OAuthClient, OAuthConfig, QuickBooksClient, QuickBooksError,
    ReportFetcher, ReportSource, RevenueAggregator, TokenStore,
};

const BASIC_CLIENT_SECRET: &str = "Basic Y2xpZW50OnNlY3JldA==";

#[derive(Default)]
struct Recorded {
    report_queries: Vec<std::collections::HashMap<String, String>>,
    refresh_calls: usize,
}

type Shared = Arc<Mutex<Recorded>>;

async fn token_endpoint(
    State(rec): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<std::collections::HashMap<String, String>>,
) -> Response {
    if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some(BASIC_CLIENT_SECRET) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" }))).into_response();
    }

    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            rec.lock().unwrap().refresh_calls += 1;
            match form.get("refresh_token").map(String::as_str) {
                Some("revoked") => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant", "error_description": "Token revoked" })),
                )
                    .into_response(),
                Some("throttle") => {
                    (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "7")], "slow down").into_response()
                }
                _ => Json(json!({
                    "access_token": "fresh-access",
                    "refresh_token": "rotated-refresh",
                    "token_type": "bearer",
                    "expires_in": 3600,
                    "x_refresh_token_expires_in": 8726400
                }))
                .into_response(),
            }
        }
        Some("authorization_code") if form.get("code").map(String::as_str) == Some("good-code") => Json(json!({
            "access_token": "first-access",
            "refresh_token": "first-refresh",
            "expires_in": 3600
        }))
        .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "bad code" })),
        )
            .into_response(),
    }
}

async fn profit_and_loss(
    State(rec): State<Shared>,
    Path(realm): Path<String>,
    headers: HeaderMap,
    Query(q): Query<std::collections::HashMap<String, String>>,
) -> Response {
    let bearer = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if realm == "unauth" || bearer == Some("Bearer stale-access") {
        return (StatusCode::UNAUTHORIZED, "AuthenticationFailed").into_response();
    }
    match realm.as_str() {
        "limited" => {
            return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "30")], "throttled").into_response();
        }
        "broken" => return (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(2000)).into_response(),
        "slow" => tokio::time::sleep(StdDuration::from_secs(2)).await,
        _ => {}
    }

    rec.lock().unwrap().report_queries.push(q);
    Json(json!({
        "Header": { "ReportName": "ProfitAndLoss" },
        "Rows": { "Row": [
            { "type": "Section", "group": "Income",
              "Header": { "ColData": [ { "value": "Income" } ] },
              "Summary": { "ColData": [ { "value": "Total Income" }, { "value": "1250.75" } ] } },
            { "type": "Section", "group": "COGS",
              "Summary": { "ColData": [ { "value": "Total Cost of Goods Sold" }, { "value": "250.25" } ] } }
        ] }
    }))
    .into_response()
}

struct FakeQuickBooks {
    base_url: String,
    recorded: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeQuickBooks {
    async fn spawn() -> Self {
        let recorded: Shared = Arc::default();
        let app = Router::new()
            .route("/oauth2/v1/tokens/bearer", post(token_endpoint))
            .route("/v3/company/:realm/reports/ProfitAndLoss", get(profit_and_loss))
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            recorded,
            handle,
        }
    }

    fn oauth(&self) -> OAuthClient {
        OAuthClient::new(
            OAuthConfig {
                client_id: "client".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost:8080/api/quickbooks/callback".into(),
                auth_base: self.base_url.clone(),
                token_url: format!("{}/oauth2/v1/tokens/bearer", self.base_url),
                scope: ACCOUNTING_SCOPE.into(),
            },
            StdDuration::from_secs(5),
        )
        .unwrap()
    }

    fn reports(&self, timeout: StdDuration) -> QuickBooksClient {
        QuickBooksClient::new(format!("{}/v3", self.base_url), timeout).unwrap()
    }
}

impl Drop for FakeQuickBooks {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn credential(realm: &str, access: &str, refresh: &str, expires_in: Duration) -> Credential {
    let now = Utc::now();
    Credential {
        location: LocationTag::new("austin").unwrap(),
        realm_id: realm.into(),
        access_token: access.into(),
        refresh_token: refresh.into(),
        expires_at: now + expires_in,
        refresh_token_expires_at: None,
        updated_at: now,
    }
}

fn jan_2024() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
}

#[tokio::test]
async fn report_request_carries_dates_method_and_parses() {
    let qb = FakeQuickBooks::spawn().await;
    let (start, end) = jan_2024();

    let tree = qb
        .reports(StdDuration::from_secs(5))
        .profit_and_loss(&credential("123", "good", "r", Duration::hours(1)), start, end, AccountingMethod::Cash)
        .await
        .unwrap();

    assert_eq!(amy_quickbooks::extract::extract_revenue(&tree), Decimal::new(125_075, 2));
    assert_eq!(amy_quickbooks::extract::extract_cogs(&tree), Decimal::new(25_025, 2));

    let rec = qb.recorded.lock().unwrap();
    let q = &rec.report_queries[0];
    assert_eq!(q["start_date"], "2024-01-01");
    assert_eq!(q["end_date"], "2024-01-31");
    assert_eq!(q["accounting_method"], "Cash");
}

#[tokio::test]
async fn report_failures_map_to_typed_errors() {
    let qb = FakeQuickBooks::spawn().await;
    let client = qb.reports(StdDuration::from_millis(300));
    let (start, end) = jan_2024();

    let fetch = |realm: &'static str| {
        let client = client.clone();
        async move {
            client
                .profit_and_loss(&credential(realm, "good", "r", Duration::hours(1)), start, end, AccountingMethod::Accrual)
                .await
                .unwrap_err()
        }
    };

    assert_eq!(fetch("unauth").await, QuickBooksError::Unauthorized);
    assert_eq!(fetch("limited").await, QuickBooksError::RateLimited { retry_after: Some(30) });
    match fetch("broken").await {
        QuickBooksError::ExternalApi { status, body } => {
            assert_eq!(status, 500);
            assert!(body.len() <= 512);
        }
        other => panic!("expected ExternalApi, got {other:?}"),
    }
    assert!(matches!(fetch("slow").await, QuickBooksError::Transport(_)));
}

#[tokio::test]
async fn token_endpoint_uses_basic_auth_and_maps_rejections() {
    let qb = FakeQuickBooks::spawn().await;
    let oauth = qb.oauth();

    let grant = oauth.refresh("good-refresh").await.unwrap();
    assert_eq!(grant.access_token, "fresh-access");
    assert_eq!(grant.refresh_token.as_deref(), Some("rotated-refresh"));
    assert_eq!(grant.x_refresh_token_expires_in, Some(8_726_400));

    assert_eq!(
        oauth.refresh("revoked").await.unwrap_err(),
        QuickBooksError::RefreshFailed("Token revoked".into())
    );
    assert_eq!(
        oauth.refresh("throttle").await.unwrap_err(),
        QuickBooksError::RateLimited { retry_after: Some(7) }
    );

    let first = oauth.exchange_code("good-code").await.unwrap();
    assert_eq!(first.access_token, "first-access");
    assert!(matches!(
        oauth.exchange_code("nope").await.unwrap_err(),
        QuickBooksError::AuthorizationFailed(_)
    ));
}

#[tokio::test]
async fn expiring_token_is_refreshed_before_the_report_fetch() {
    let qb = FakeQuickBooks::spawn().await;
    let store = Arc::new(InMemoryCredentialStore::new());
    // The fake rejects "stale-access", so the fetch only succeeds after the refresh.
    store
        .upsert(&credential("123", "stale-access", "good-refresh", Duration::minutes(2)))
        .await
        .unwrap();

    let tokens = Arc::new(TokenStore::new(
        store.clone(),
        Arc::new(qb.oauth()),
        Arc::new(ManualClock::new(Utc::now())),
    ));
    let fetcher = ReportFetcher::new(tokens, Arc::new(qb.reports(StdDuration::from_secs(5))));
    let aggregator = RevenueAggregator::new(fetcher, 2);

    let windows = split_into_periods(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        Granularity::Monthly,
    )
    .unwrap();
    let austin = LocationTag::new("austin").unwrap();

    let report = aggregator.aggregate(&[austin.clone()], &windows, AccountingMethod::Accrual).await;

    assert_eq!(report.locations[0].state, LocationState::Fresh);
    assert_eq!(report.totals.revenue, Decimal::new(250_150, 2));
    assert_eq!(qb.recorded.lock().unwrap().refresh_calls, 1);

    let stored = store.load(&austin).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "fresh-access");
    assert_eq!(stored.refresh_token, "rotated-refresh");
    assert!(stored.refresh_token_expires_at.is_some());
}

#[tokio::test]
async fn revoked_refresh_token_marks_location_failed() {
    let qb = FakeQuickBooks::spawn().await;
    let store = Arc::new(InMemoryCredentialStore::new());
    store
        .upsert(&credential("123", "stale-access", "revoked", Duration::minutes(-5)))
        .await
        .unwrap();

    let tokens = Arc::new(TokenStore::new(
        store,
        Arc::new(qb.oauth()),
        Arc::new(ManualClock::new(Utc::now())),
    ));
    let aggregator = RevenueAggregator::new(
        ReportFetcher::new(tokens, Arc::new(qb.reports(StdDuration::from_secs(5)))),
        2,
    );
    let (start, end) = jan_2024();
    let windows = split_into_periods(start, end, Granularity::Monthly).unwrap();

    let report = aggregator
        .aggregate(&[LocationTag::new("austin").unwrap()], &windows, AccountingMethod::Accrual)
        .await;

    assert_eq!(report.locations[0].state, LocationState::Error);
    assert_eq!(report.locations[0].error_code.as_deref(), Some("refresh_failed"));
    assert!(report.totals.revenue.is_zero());
    assert!(qb.recorded.lock().unwrap().report_queries.is_empty());
}
