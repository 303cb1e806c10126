//! Source clients: one per external source, each producing raw records for one category.
//!
//! | Source | Module | Category | Transport |
//! |--------|--------|----------|-----------|
//! | TradingView earnings calendar | [`earnings`] | earnings | page (HTTP, browser fallback) |
//! | TradingView economic calendar | [`economic`] | economic_events | JSON feed |
//! | CNN Fear & Greed | [`sentiment`] | sentiment | page (HTTP, browser fallback) |
//! | Polygon gainers/losers snapshot | [`premarket`] | premarket_movers | REST, API key |
//! | Polygon upcoming market status | [`holidays`] | market_holidays | REST, API key |
//!
//! Clients never retry and never validate: retries are the next refresh cycle, and
//! validation belongs to the normalizer. Extraction is split into pure `extract_*`
//! functions so each source can be tested against fixture documents.

pub mod browser;
pub mod earnings;
pub mod economic;
pub mod holidays;
pub mod page;
pub mod premarket;
pub mod sentiment;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, USER_AGENT};
use crate::error::FetchError;
use crate::types::{Category, RawRecord};

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Stable identifier used in logs, errors, and the refresh report.
    fn name(&self) -> &'static str;

    fn category(&self) -> Category;

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError>;
}

/// Builds every configured source client, sharing one HTTP connection pool.
pub fn build_sources(cfg: &Config) -> reqwest::Result<Vec<Arc<dyn SourceClient>>> {
    let client = http_client(cfg)?;
    let pages = Arc::new(page::PageLoader::new(client.clone(), cfg));

    Ok(vec![
        Arc::new(earnings::EarningsSource::new(cfg, Arc::clone(&pages))),
        Arc::new(economic::EconomicCalendarSource::new(cfg, client.clone())),
        Arc::new(sentiment::SentimentSource::new(cfg, Arc::clone(&pages))),
        Arc::new(premarket::PremarketSource::new(cfg, client.clone())),
        Arc::new(holidays::MarketHolidaySource::new(cfg, client)),
    ])
}

pub fn http_client(cfg: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
}

/// Maps a transport failure, keeping timeouts distinct from other network errors.
/// The URL is stripped so query credentials never reach logs or the refresh report.
pub(crate) fn request_error(
    source_id: &'static str,
    timeout_secs: u64,
) -> impl FnOnce(reqwest::Error) -> FetchError {
    move |cause| {
        if cause.is_timeout() {
            FetchError::Timeout { source_id, secs: timeout_secs }
        } else {
            FetchError::Network { source_id, cause: cause.without_url() }
        }
    }
}

/// GET a JSON document, mapping non-2xx statuses and undecodable bodies to [`FetchError`].
pub(crate) async fn get_json(
    source_id: &'static str,
    request: reqwest::RequestBuilder,
    timeout_secs: u64,
) -> Result<serde_json::Value, FetchError> {
    let resp = request.send().await.map_err(request_error(source_id, timeout_secs))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::from_status(source_id, status.as_u16()));
    }
    let body = resp.text().await.map_err(request_error(source_id, timeout_secs))?;
    serde_json::from_str(&body)
        .map_err(|e| FetchError::structure(source_id, format!("response is not JSON: {e}")))
}

/// Reads a JSON field that may arrive as a number or a numeric string.
pub(crate) fn json_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

pub(crate) fn json_str(v: &serde_json::Value, field: &str) -> Option<String> {
    v.get(field)
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
