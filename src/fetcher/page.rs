use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::browser::BrowserLauncher;
use crate::fetcher::request_error;

/// Loads a page through the fallback chain: plain HTTP first, then a headless
/// browser render when the static HTML does not contain the marker selector
/// (the content is script-rendered) or the plain request failed.
pub struct PageLoader {
    client: reqwest::Client,
    browser: BrowserLauncher,
    http_timeout_secs: u64,
}

impl PageLoader {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Self {
        Self {
            client,
            browser: BrowserLauncher::new(cfg),
            http_timeout_secs: cfg.http_timeout_secs,
        }
    }

    /// Returns HTML in which `marker` matches at least one element.
    pub async fn load(
        &self,
        source_id: &'static str,
        url: &str,
        marker: &str,
    ) -> Result<String, FetchError> {
        let static_err = match self.fetch_static(source_id, url).await {
            Ok(html) if contains(source_id, &html, marker)? => {
                debug!(source = source_id, "Marker found in static HTML");
                return Ok(html);
            }
            Ok(_) => {
                debug!(source = source_id, marker, "Marker missing from static HTML, rendering");
                None
            }
            Err(e) => {
                warn!(source = source_id, error = %e, "Static fetch failed, rendering");
                Some(e)
            }
        };

        match self.browser.render(source_id, url).await {
            Ok(html) if contains(source_id, &html, marker)? => {
                info!(source = source_id, bytes = html.len(), "Page rendered by browser");
                Ok(html)
            }
            Ok(_) => Err(FetchError::structure(
                source_id,
                format!("`{marker}` not found after browser render"),
            )),
            // Without a browser, the static failure is the more useful error.
            Err(FetchError::NotConfigured { .. }) => Err(static_err.unwrap_or_else(|| {
                FetchError::structure(
                    source_id,
                    format!("`{marker}` not in static HTML and no browser configured"),
                )
            })),
            Err(e) => Err(e),
        }
    }

    async fn fetch_static(&self, source_id: &'static str, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(request_error(source_id, self.http_timeout_secs))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status(source_id, status.as_u16()));
        }
        resp.text().await.map_err(request_error(source_id, self.http_timeout_secs))
    }
}

/// Parses a CSS selector owned by a source module. A bad selector is a source bug,
/// reported as a structure error rather than a panic.
pub fn selector(source_id: &'static str, css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::structure(source_id, format!("bad selector `{css}`: {e}")))
}

fn contains(source_id: &'static str, html: &str, marker: &str) -> Result<bool, FetchError> {
    let sel = selector(source_id, marker)?;
    Ok(Html::parse_document(html).select(&sel).next().is_some())
}

/// Text content of an element with whitespace runs collapsed.
pub fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
