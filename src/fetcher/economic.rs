//! TradingView economic calendar, read from the JSON events feed behind the
//! calendar page. Importance arrives on a `-1 / 0 / 1` scale; filtering to
//! high-importance events is left to the normalizer.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{info, instrument};

use crate::config::{Config, ECONOMIC_CALENDAR_ORIGIN};
use crate::error::FetchError;
use crate::fetcher::{get_json, json_f64, json_str, SourceClient};
use crate::types::{Category, RawRecord};

const SOURCE_ID: &str = "tradingview_economic_calendar";

/// Events are requested from one day back to a week ahead.
const LOOKBACK_DAYS: i64 = 1;
const LOOKAHEAD_DAYS: i64 = 7;

pub struct EconomicCalendarSource {
    client: reqwest::Client,
    url: String,
    countries: String,
    timeout_secs: u64,
}

impl EconomicCalendarSource {
    pub fn new(cfg: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            url: cfg.economic_calendar_url.clone(),
            countries: cfg.economic_countries.join(","),
            timeout_secs: cfg.http_timeout_secs,
        }
    }
}

#[async_trait]
impl SourceClient for EconomicCalendarSource {
    fn name(&self) -> &'static str {
        SOURCE_ID
    }

    fn category(&self) -> Category {
        Category::EconomicEvents
    }

    #[instrument(level = "info", skip_all, fields(source = SOURCE_ID))]
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let now = Utc::now();
        let from = (now - Duration::days(LOOKBACK_DAYS)).to_rfc3339_opts(SecondsFormat::Millis, true);
        let to = (now + Duration::days(LOOKAHEAD_DAYS)).to_rfc3339_opts(SecondsFormat::Millis, true);

        let request = self
            .client
            .get(&self.url)
            .header(reqwest::header::ORIGIN, ECONOMIC_CALENDAR_ORIGIN)
            .query(&[("from", from.as_str()), ("to", to.as_str()), ("countries", self.countries.as_str())]);

        let body = get_json(SOURCE_ID, request, self.timeout_secs).await?;
        let records = extract_events(&body, now)?;
        info!(events = records.len(), "Extracted economic calendar events");
        Ok(records)
    }
}

pub fn extract_events(body: &Value, observed_at: DateTime<Utc>) -> Result<Vec<RawRecord>, FetchError> {
    let items = body
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| FetchError::structure(SOURCE_ID, "`result` array missing from calendar response"))?;

    let records = items
        .iter()
        .map(|item| {
            let mut raw = RawRecord::observed(observed_at);
            raw.insert_opt("name", json_str(item, "title").or_else(|| json_str(item, "indicator")));
            raw.insert_opt("scheduled_at", json_str(item, "date"));
            raw.insert_opt("importance", item.get("importance").and_then(json_f64));
            raw.insert_opt("country", json_str(item, "country"));
            raw.insert_opt("currency", json_str(item, "currency"));
            raw.insert_opt("actual", display_value(item, "actual"));
            raw.insert_opt("forecast", display_value(item, "forecast"));
            raw.insert_opt("prior", display_value(item, "previous"));
            raw
        })
        .collect();
    Ok(records)
}

/// Renders a numeric reading with the event's scale and unit, e.g. `3.2%` or `216K`.
fn display_value(item: &Value, field: &str) -> Option<String> {
    let value = item.get(field).and_then(json_f64)?;
    let scale = json_str(item, "scale").unwrap_or_default();
    let unit = json_str(item, "unit").unwrap_or_default();
    Some(format!("{value}{scale}{unit}"))
}
