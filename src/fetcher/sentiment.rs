//! CNN Fear & Greed index. The dial value is script-rendered.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::Html;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::page::{element_text, selector, PageLoader};
use crate::fetcher::SourceClient;
use crate::types::{Category, RawRecord};

const SOURCE_ID: &str = "cnn_fear_greed";
const DIAL_VALUE: &str = "span.dial-number-value";

pub struct SentimentSource {
    url: String,
    pages: Arc<PageLoader>,
}

impl SentimentSource {
    pub fn new(cfg: &Config, pages: Arc<PageLoader>) -> Self {
        Self { url: cfg.sentiment_url.clone(), pages }
    }
}

#[async_trait]
impl SourceClient for SentimentSource {
    fn name(&self) -> &'static str {
        SOURCE_ID
    }

    fn category(&self) -> Category {
        Category::Sentiment
    }

    #[instrument(level = "info", skip_all, fields(source = SOURCE_ID))]
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let html = self.pages.load(SOURCE_ID, &self.url, DIAL_VALUE).await?;
        let record = extract_reading(&html, Utc::now())?;
        info!(value = ?record.get("value"), "Extracted fear & greed reading");
        Ok(vec![record])
    }
}

/// Reads the first dial value on the page.
pub fn extract_reading(html: &str, observed_at: DateTime<Utc>) -> Result<RawRecord, FetchError> {
    let doc = Html::parse_document(html);
    let sel = selector(SOURCE_ID, DIAL_VALUE)?;
    let value = doc
        .select(&sel)
        .next()
        .map(element_text)
        .ok_or_else(|| FetchError::structure(SOURCE_ID, format!("`{DIAL_VALUE}` not found")))?;

    Ok(RawRecord::observed(observed_at).with("value", value))
}
