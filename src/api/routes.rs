use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::{LatencySummary, SourceLatency};
use crate::db::QueryFilter;
use crate::error::AppError;
use crate::query::MarketDataQuery;
use crate::refresh::{RefreshOrchestrator, RefreshReport, UnitState};
use crate::types::{Category, Direction, Record};

#[derive(Clone)]
pub struct ApiState {
    pub query: MarketDataQuery,
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub health: Arc<HealthState>,
    pub latency: Arc<SourceLatency>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/earnings", get(get_earnings))
        .route("/economic-events", get(get_economic_events))
        .route("/fear-greed", get(get_fear_greed))
        .route("/premarket", get(get_premarket))
        .route("/premarket/gainers", get(get_premarket_gainers))
        .route("/premarket/losers", get(get_premarket_losers))
        .route("/market-holidays", get(get_market_holidays))
        .route("/refresh", post(post_refresh))
        .route("/refresh/status", get(get_refresh_status))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
pub struct EarningsQuery {
    pub limit: Option<u32>,
    pub symbol: Option<String>,
    pub from: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
pub struct DatedQuery {
    pub limit: Option<u32>,
    pub from: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize, Default)]
pub struct PremarketQuery {
    pub limit: Option<u32>,
    pub direction: Option<Direction>,
    pub symbol: Option<String>,
    /// Skip movers observed more than this many seconds ago.
    pub max_age_secs: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Every successful response is wrapped as `{"status": "success", "data": ...}`.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub data: T,
}

fn success<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { status: "success", data })
}

type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

#[derive(Serialize)]
pub struct RefreshStatusResponse {
    pub units: BTreeMap<Category, UnitState>,
    pub last_report: Option<RefreshReport>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub uptime_secs: i64,
    pub database: &'static str,
    pub refresh_runs: u64,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_refresh_failed_categories: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_earnings(
    State(state): State<ApiState>,
    Query(params): Query<EarningsQuery>,
) -> ApiResult<Vec<Record>> {
    let filter = QueryFilter {
        limit: params.limit,
        symbol: params.symbol.map(|s| s.trim().to_uppercase()),
        from: params.from,
        ..QueryFilter::default()
    };
    Ok(success(state.query.get(Category::Earnings, &filter).await?))
}

async fn get_economic_events(
    State(state): State<ApiState>,
    Query(params): Query<DatedQuery>,
) -> ApiResult<Vec<Record>> {
    let filter = QueryFilter { limit: params.limit, from: params.from, ..QueryFilter::default() };
    Ok(success(state.query.get(Category::EconomicEvents, &filter).await?))
}

/// Defaults to the single latest reading.
async fn get_fear_greed(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> ApiResult<Vec<Record>> {
    let limit = params.limit.unwrap_or(1);
    Ok(success(state.query.latest(Category::Sentiment, limit).await?))
}

async fn get_premarket(
    State(state): State<ApiState>,
    Query(params): Query<PremarketQuery>,
) -> ApiResult<Vec<Record>> {
    premarket(&state, params).await
}

async fn get_premarket_gainers(
    State(state): State<ApiState>,
    Query(params): Query<PremarketQuery>,
) -> ApiResult<Vec<Record>> {
    premarket(&state, PremarketQuery { direction: Some(Direction::Gainer), ..params }).await
}

async fn get_premarket_losers(
    State(state): State<ApiState>,
    Query(params): Query<PremarketQuery>,
) -> ApiResult<Vec<Record>> {
    premarket(&state, PremarketQuery { direction: Some(Direction::Loser), ..params }).await
}

async fn premarket(state: &ApiState, params: PremarketQuery) -> ApiResult<Vec<Record>> {
    let filter = QueryFilter {
        limit: params.limit,
        symbol: params.symbol.map(|s| s.trim().to_uppercase()),
        direction: params.direction,
        max_age: params.max_age_secs.map(|s| chrono::Duration::seconds(i64::from(s))),
        ..QueryFilter::default()
    };
    Ok(success(state.query.get(Category::PremarketMovers, &filter).await?))
}

async fn get_market_holidays(
    State(state): State<ApiState>,
    Query(params): Query<DatedQuery>,
) -> ApiResult<Vec<Record>> {
    let filter = QueryFilter { limit: params.limit, from: params.from, ..QueryFilter::default() };
    Ok(success(state.query.get(Category::MarketHolidays, &filter).await?))
}

/// Runs a full refresh synchronously; takes as long as the slowest source.
async fn post_refresh(State(state): State<ApiState>) -> ApiResult<RefreshReport> {
    Ok(success(state.orchestrator.run_all().await))
}

async fn get_refresh_status(State(state): State<ApiState>) -> ApiResult<RefreshStatusResponse> {
    Ok(success(RefreshStatusResponse {
        units: state.orchestrator.states(),
        last_report: state.orchestrator.last_report().await,
    }))
}

async fn get_health(State(state): State<ApiState>) -> ApiResult<HealthResponse> {
    let database = match state.query.ping().await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };
    Ok(success(HealthResponse {
        uptime_secs: state.health.uptime_secs(),
        database,
        refresh_runs: state.health.refresh_runs(),
        last_refresh_at: state.health.last_refresh_at(),
        last_refresh_failed_categories: state.health.last_refresh_failures(),
    }))
}

async fn get_stats_latency(
    State(state): State<ApiState>,
) -> ApiResult<BTreeMap<&'static str, LatencySummary>> {
    Ok(success(state.latency.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, SqliteStore};

    /// Serves the router on an ephemeral port and returns its base URL.
    async fn serve() -> String {
        let store = SqliteStore::new(test_pool().await);
        let latency = Arc::new(SourceLatency::new());
        let health = Arc::new(HealthState::new());
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            Vec::new(),
            store.clone(),
            Arc::clone(&latency),
            Arc::clone(&health),
        ));
        let app = router(ApiState { query: MarketDataQuery::new(store), orchestrator, health, latency });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn empty_category_is_success_with_empty_data() {
        let base = serve().await;
        let resp = reqwest::get(format!("{base}/premarket/gainers")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "data": []}));
    }

    #[tokio::test]
    async fn manual_refresh_echoes_report() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let resp = client.post(format!("{base}/refresh")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["status"], "success");
        assert!(json["data"]["categories"].as_object().unwrap().is_empty());

        let json: serde_json::Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(json["data"]["refresh_runs"], 1);
        assert_eq!(json["data"]["database"], "ok");
    }

    #[tokio::test]
    async fn bad_query_param_is_rejected() {
        let base = serve().await;
        let resp = reqwest::get(format!("{base}/premarket?direction=sideways")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
