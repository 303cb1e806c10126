//! TradingView US earnings calendar.
//!
//! The table is script-rendered, so in practice the page loader falls through to
//! the browser. Each `.tv-data-table__row` carries its cells as
//! `[data-field-key=...]` elements.
//!
//! Only the rows present in the first render are captured: `--dump-dom` cannot
//! click the "This Week" filter or "Load More", so large weeks are truncated to
//! the page's initial batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::page::{element_text, selector, PageLoader};
use crate::fetcher::SourceClient;
use crate::types::{Category, RawRecord};

const SOURCE_ID: &str = "tradingview_earnings";
const TABLE_MARKER: &str = ".tv-data-table";
const ROW: &str = ".tv-data-table__row";

/// (raw field, data-field-key) for the numeric cells read as text.
const NUMERIC_CELLS: &[(&str, &str)] = &[
    ("eps_estimate", "earnings_per_share_forecast_next_fq"),
    ("eps_reported", "earnings_per_share_fq"),
    ("revenue_estimate", "revenue_forecast_next_fq"),
    ("revenue_reported", "revenue_fq"),
    ("market_cap", "market_cap_basic"),
];

pub struct EarningsSource {
    url: String,
    pages: Arc<PageLoader>,
}

impl EarningsSource {
    pub fn new(cfg: &Config, pages: Arc<PageLoader>) -> Self {
        Self { url: cfg.earnings_url.clone(), pages }
    }
}

#[async_trait]
impl SourceClient for EarningsSource {
    fn name(&self) -> &'static str {
        SOURCE_ID
    }

    fn category(&self) -> Category {
        Category::Earnings
    }

    #[instrument(level = "info", skip_all, fields(source = SOURCE_ID))]
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let html = self.pages.load(SOURCE_ID, &self.url, TABLE_MARKER).await?;
        let records = extract_earnings(&html, Utc::now())?;
        info!(rows = records.len(), "Extracted earnings rows");
        Ok(records)
    }
}

fn cell_selector(key: &str) -> Result<Selector, FetchError> {
    selector(SOURCE_ID, &format!("[data-field-key='{key}']"))
}

pub fn extract_earnings(html: &str, observed_at: DateTime<Utc>) -> Result<Vec<RawRecord>, FetchError> {
    let doc = Html::parse_document(html);
    let row_sel = selector(SOURCE_ID, ROW)?;
    let name_sel = cell_selector("name")?;
    let date_sel = cell_selector("earnings_release_next_date")?;
    let time_sel = cell_selector("earnings_release_next_time")?;
    let numeric_sels = NUMERIC_CELLS
        .iter()
        .map(|(field, key)| cell_selector(key).map(|sel| (*field, sel)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::new();
    for row in doc.select(&row_sel) {
        let mut raw = RawRecord::observed(observed_at);
        raw.insert_opt("symbol", row.select(&name_sel).next().and_then(ticker));
        raw.insert_opt("date", row.select(&date_sel).next().map(element_text));
        raw.insert_opt(
            "time",
            row.select(&time_sel)
                .next()
                .and_then(|el| el.value().attr("title"))
                .map(str::trim),
        );
        for (field, sel) in &numeric_sels {
            raw.insert_opt(field, row.select(sel).next().map(element_text));
        }
        records.push(raw);
    }
    Ok(records)
}

/// The ticker is the first text node of the name cell; badges and the company
/// description follow as separate nodes.
fn ticker(cell: ElementRef<'_>) -> Option<String> {
    cell.text().map(str::trim).find(|t| !t.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{normalize_batch, parse_datetime};
    use crate::types::{Record, RawValue, TimeOfDay};

    const FIXTURE: &str = r#"
        <table class="tv-data-table">
          <tbody>
            <tr class="tv-data-table__row">
              <td data-field-key="name">
                <a class="tv-screener__symbol">AAPL</a><span class="badge">D</span>
                <span class="tv-screener__description">Apple Inc.</span>
              </td>
              <td data-field-key="market_cap_basic">2.65T USD</td>
              <td data-field-key="earnings_per_share_forecast_next_fq">1.50 USD</td>
              <td data-field-key="earnings_per_share_fq">—</td>
              <td data-field-key="revenue_forecast_next_fq">90.33B USD</td>
              <td data-field-key="revenue_fq">—</td>
              <td data-field-key="earnings_release_next_date">2024-05-02</td>
              <td data-field-key="earnings_release_next_time" title="After Market Close"><span></span></td>
            </tr>
            <tr class="tv-data-table__row">
              <td data-field-key="name"><a>GD</a><span>General Dynamics</span></td>
              <td data-field-key="earnings_release_next_date">Apr 24, 2024</td>
              <td data-field-key="earnings_release_next_time" title="Before Market Open"></td>
            </tr>
            <tr class="tv-data-table__row">
              <td data-field-key="market_cap_basic">1B</td>
            </tr>
          </tbody>
        </table>"#;

    fn observed() -> DateTime<Utc> {
        parse_datetime("2024-04-22T12:00:00Z").unwrap()
    }

    #[test]
    fn extracts_every_row_without_validating() {
        let rows = extract_earnings(FIXTURE, observed()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("symbol"), Some(&RawValue::Text("AAPL".to_string())));
        assert_eq!(rows[0].get("time"), Some(&RawValue::Text("After Market Close".to_string())));
        assert_eq!(rows[0].get("market_cap"), Some(&RawValue::Text("2.65T USD".to_string())));
        // Tickers ending in D keep their last letter.
        assert_eq!(rows[1].get("symbol"), Some(&RawValue::Text("GD".to_string())));
        assert_eq!(rows[2].get("symbol"), None);
    }

    #[test]
    fn extracted_rows_normalize() {
        let rows = extract_earnings(FIXTURE, observed()).unwrap();
        let batch = normalize_batch(Category::Earnings, &rows);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.dropped, 1);

        let Record::Earnings(aapl) = &batch.records[0] else { panic!("expected earnings") };
        assert_eq!(aapl.time_of_day, Some(TimeOfDay::AfterClose));
        assert_eq!(aapl.eps_estimate, Some(1.5));
        assert_eq!(aapl.eps_reported, None);

        let Record::Earnings(gd) = &batch.records[1] else { panic!("expected earnings") };
        assert_eq!(gd.time_of_day, Some(TimeOfDay::BeforeOpen));
        assert_eq!(gd.report_date.to_string(), "2024-04-24");
    }

    #[test]
    fn page_without_rows_yields_nothing() {
        let rows = extract_earnings(r#"<table class="tv-data-table"></table>"#, observed()).unwrap();
        assert!(rows.is_empty());
    }
}
