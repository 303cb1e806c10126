//! Polygon.io upcoming market holidays and early closes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::{get_json, json_str, SourceClient};
use crate::types::{Category, RawRecord};

const SOURCE_ID: &str = "polygon_market_holidays";

pub struct MarketHolidaySource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl MarketHolidaySource {
    pub fn new(cfg: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            url: format!("{}/v1/marketstatus/upcoming", cfg.polygon_api_url.trim_end_matches('/')),
            api_key: cfg.polygon_api_key.clone(),
            timeout_secs: cfg.http_timeout_secs,
        }
    }
}

#[async_trait]
impl SourceClient for MarketHolidaySource {
    fn name(&self) -> &'static str {
        SOURCE_ID
    }

    fn category(&self) -> Category {
        Category::MarketHolidays
    }

    #[instrument(level = "info", skip_all, fields(source = SOURCE_ID))]
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| FetchError::NotConfigured {
            source_id: SOURCE_ID,
            detail: "POLYGON_API_KEY is not set".to_string(),
        })?;

        let request = self.client.get(&self.url).bearer_auth(api_key);
        let body = get_json(SOURCE_ID, request, self.timeout_secs).await?;
        let records = extract_holidays(&body, Utc::now())?;
        info!(holidays = records.len(), "Extracted upcoming market holidays");
        Ok(records)
    }
}

/// The response is a bare array with one entry per (holiday, exchange).
pub fn extract_holidays(body: &Value, observed_at: DateTime<Utc>) -> Result<Vec<RawRecord>, FetchError> {
    let items = body
        .as_array()
        .ok_or_else(|| FetchError::structure(SOURCE_ID, "expected an array of upcoming holidays"))?;

    let records = items
        .iter()
        .map(|item| {
            let mut raw = RawRecord::observed(observed_at);
            for field in ["name", "date", "exchange", "status", "open", "close"] {
                raw.insert_opt(field, json_str(item, field));
            }
            raw
        })
        .collect();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{normalize_batch, parse_datetime};
    use crate::types::{HolidayStatus, Record};

    #[test]
    fn extracts_closures_and_early_closes() {
        let body = serde_json::json!([
            {"date": "2024-11-28", "exchange": "NYSE", "name": "Thanksgiving", "status": "closed"},
            {"date": "2024-11-29", "exchange": "NASDAQ", "name": "Thanksgiving", "status": "early-close",
             "open": "2024-11-29T14:30:00.000Z", "close": "2024-11-29T18:00:00.000Z"},
            {"date": "2024-12-25", "exchange": "OTC", "name": "Christmas", "status": "unknown"}
        ]);
        let rows = extract_holidays(&body, parse_datetime("2024-11-01T12:00:00Z").unwrap()).unwrap();
        assert_eq!(rows.len(), 3);

        let batch = normalize_batch(Category::MarketHolidays, &rows);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.drop_kinds.get("unrecognized"), Some(&1));

        let Record::MarketHoliday(early) = &batch.records[1] else { panic!("expected holiday") };
        assert_eq!(early.status, HolidayStatus::EarlyClose);
        assert_eq!(early.exchange, "NASDAQ");
        assert_eq!(early.close.as_deref(), Some("2024-11-29T18:00:00.000Z"));
    }

    #[tokio::test]
    async fn network_error_does_not_expose_api_key() {
        let cfg = Config {
            polygon_api_url: "http://127.0.0.1:1".to_string(),
            polygon_api_key: Some("SECRETKEY123".to_string()),
            ..Config::for_tests()
        };
        let source = MarketHolidaySource::new(&cfg, crate::fetcher::http_client(&cfg).unwrap());

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "unexpected error: {err}");
        assert!(!err.to_string().contains("SECRETKEY123"), "key leaked: {err}");
        assert!(!format!("{err:?}").contains("SECRETKEY123"));
    }

    #[test]
    fn object_body_is_structure_error() {
        let body = serde_json::json!({"status": "ERROR", "error": "Unknown API Key"});
        let err = extract_holidays(&body, Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::Structure { .. }));
    }
}
