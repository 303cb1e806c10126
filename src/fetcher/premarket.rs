//! Polygon.io gainers/losers snapshots.
//!
//! Outside the pre-market session (including weekends) the snapshot describes
//! another session, so the client skips the request entirely; the normalizer
//! enforces the same window on every record it receives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::{get_json, json_f64, SourceClient};
use crate::normalizer::in_premarket_window;
use crate::types::{Category, Direction, RawRecord};

const SOURCE_ID: &str = "polygon_premarket";

pub struct PremarketSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limit: usize,
    timeout_secs: u64,
}

impl PremarketSource {
    pub fn new(cfg: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: cfg.polygon_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.polygon_api_key.clone(),
            limit: cfg.premarket_limit,
            timeout_secs: cfg.http_timeout_secs,
        }
    }

    async fn snapshot(&self, api_key: &str, direction: Direction) -> Result<Value, FetchError> {
        let path = match direction {
            Direction::Gainer => "gainers",
            Direction::Loser => "losers",
        };
        let url = format!("{}/v2/snapshot/locale/us/markets/stocks/{path}", self.base_url);
        let request = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .query(&[("include_otc", "false")]);
        get_json(SOURCE_ID, request, self.timeout_secs).await
    }
}

#[async_trait]
impl SourceClient for PremarketSource {
    fn name(&self) -> &'static str {
        SOURCE_ID
    }

    fn category(&self) -> Category {
        Category::PremarketMovers
    }

    #[instrument(level = "info", skip_all, fields(source = SOURCE_ID))]
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| FetchError::NotConfigured {
            source_id: SOURCE_ID,
            detail: "POLYGON_API_KEY is not set".to_string(),
        })?;

        let now = Utc::now();
        if !in_premarket_window(now) {
            debug!("Outside the weekday pre-market window, skipping snapshot");
            return Ok(Vec::new());
        }

        let gainers = self.snapshot(api_key, Direction::Gainer).await?;
        let losers = self.snapshot(api_key, Direction::Loser).await?;

        let mut records = extract_movers(&gainers, Direction::Gainer, now, self.limit)?;
        records.extend(extract_movers(&losers, Direction::Loser, now, self.limit)?);
        info!(movers = records.len(), "Extracted pre-market movers");
        Ok(records)
    }
}

/// Reads at most `limit` tickers from one snapshot response.
pub fn extract_movers(
    body: &Value,
    direction: Direction,
    observed_at: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<RawRecord>, FetchError> {
    let tickers = body
        .get("tickers")
        .and_then(|t| t.as_array())
        .ok_or_else(|| FetchError::structure(SOURCE_ID, "`tickers` array missing from snapshot"))?;

    let records = tickers
        .iter()
        .take(limit)
        .map(|t| {
            let mut raw = RawRecord::observed(observed_at).with("direction", direction.as_str());
            raw.insert_opt("symbol", t.get("ticker").and_then(|s| s.as_str()));
            raw.insert_opt("change_percent", t.get("todaysChangePerc").and_then(json_f64));
            raw.insert_opt("change", t.get("todaysChange").and_then(json_f64));
            raw.insert_opt("price", last_price(t));
            raw.insert_opt("volume", nonzero(t.pointer("/min/av")).or_else(|| nonzero(t.pointer("/day/v"))));
            raw
        })
        .collect();
    Ok(records)
}

/// Before the open `day.c` is still zero, so prefer the last trade, then the last minute bar.
fn last_price(t: &Value) -> Option<f64> {
    nonzero(t.pointer("/lastTrade/p"))
        .or_else(|| nonzero(t.pointer("/min/c")))
        .or_else(|| nonzero(t.pointer("/day/c")))
}

fn nonzero(v: Option<&Value>) -> Option<f64> {
    v.and_then(json_f64).filter(|n| *n != 0.0)
}
