use crate::error::{AppError, Result};

pub const EARNINGS_URL: &str = "https://www.tradingview.com/markets/stocks-usa/earnings/";
pub const ECONOMIC_CALENDAR_URL: &str = "https://economic-calendar.tradingview.com/events";
/// Sent as Origin on calendar requests; the events feed rejects requests without it.
pub const ECONOMIC_CALENDAR_ORIGIN: &str = "https://www.tradingview.com";
pub const SENTIMENT_URL: &str = "https://www.cnn.com/markets/fear-and-greed";
pub const POLYGON_API_URL: &str = "https://api.polygon.io";

/// Browser binaries tried in order when a page needs rendering.
pub const DEFAULT_BROWSER_PATHS: &[&str] = &["chromium", "chromium-browser", "google-chrome"];

/// Sent with every page request; several sources serve an empty shell to unknown agents.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Refresh interval (seconds): how often every source is re-scraped.
pub const REFRESH_INTERVAL_SECS: u64 = 900;

/// Market-local timezone for pre-market windows and sentiment days.
pub const MARKET_TZ: chrono_tz::Tz = chrono_tz::America::New_York;

/// Pre-market session bounds in market-local time, `[start, end)`.
pub mod premarket_window {
    pub const START: (u32, u32) = (4, 0);
    pub const END: (u32, u32) = (9, 30);
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between scheduled refresh cycles (REFRESH_INTERVAL_SECS)
    pub refresh_interval_secs: u64,
    /// Run one refresh cycle immediately at startup (REFRESH_ON_STARTUP)
    pub refresh_on_startup: bool,
    /// Per-request timeout for plain HTTP fetches (HTTP_TIMEOUT_SECS)
    pub http_timeout_secs: u64,
    /// Upper bound on one headless browser render (BROWSER_TIMEOUT_SECS)
    pub browser_timeout_secs: u64,
    /// Candidate browser binaries, tried in order (BROWSER_PATHS, comma-separated)
    pub browser_paths: Vec<String>,
    /// Pass --no-sandbox to the browser; needed when running as root in containers
    pub browser_no_sandbox: bool,
    /// Polygon.io key for pre-market movers and market status (POLYGON_API_KEY)
    pub polygon_api_key: Option<String>,
    pub polygon_api_url: String,
    pub earnings_url: String,
    pub economic_calendar_url: String,
    pub sentiment_url: String,
    /// Countries requested from the economic calendar (ECONOMIC_COUNTRIES, comma-separated)
    pub economic_countries: Vec<String>,
    /// Keep at most this many gainers and this many losers per refresh (PREMARKET_LIMIT)
    pub premarket_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "market_dashboard.db".to_string()),
            api_port: parse_var("API_PORT", 8000)?,
            refresh_interval_secs: parse_var("REFRESH_INTERVAL_SECS", REFRESH_INTERVAL_SECS)?,
            refresh_on_startup: parse_var("REFRESH_ON_STARTUP", true)?,
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 30)?,
            browser_timeout_secs: parse_var("BROWSER_TIMEOUT_SECS", 60)?,
            browser_paths: std::env::var("BROWSER_PATHS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|_| DEFAULT_BROWSER_PATHS.iter().map(|s| s.to_string()).collect()),
            browser_no_sandbox: parse_var("BROWSER_NO_SANDBOX", false)?,
            polygon_api_key: std::env::var("POLYGON_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            polygon_api_url: std::env::var("POLYGON_API_URL")
                .unwrap_or_else(|_| POLYGON_API_URL.to_string()),
            earnings_url: std::env::var("EARNINGS_URL").unwrap_or_else(|_| EARNINGS_URL.to_string()),
            economic_calendar_url: std::env::var("ECONOMIC_CALENDAR_URL")
                .unwrap_or_else(|_| ECONOMIC_CALENDAR_URL.to_string()),
            sentiment_url: std::env::var("SENTIMENT_URL")
                .unwrap_or_else(|_| SENTIMENT_URL.to_string()),
            economic_countries: split_list(
                &std::env::var("ECONOMIC_COUNTRIES").unwrap_or_else(|_| "US,CA".to_string()),
            ),
            premarket_limit: parse_var("PREMARKET_LIMIT", 20)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}"))),
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
impl Config {
    /// Defaults without touching the process environment.
    pub fn for_tests() -> Self {
        Self {
            log_level: "debug".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            refresh_interval_secs: REFRESH_INTERVAL_SECS,
            refresh_on_startup: false,
            http_timeout_secs: 5,
            browser_timeout_secs: 5,
            browser_paths: Vec::new(),
            browser_no_sandbox: true,
            polygon_api_key: None,
            polygon_api_url: POLYGON_API_URL.to_string(),
            earnings_url: EARNINGS_URL.to_string(),
            economic_calendar_url: ECONOMIC_CALENDAR_URL.to_string(),
            sentiment_url: SENTIMENT_URL.to_string(),
            economic_countries: vec!["US".to_string(), "CA".to_string()],
            premarket_limit: 20,
        }
    }
}
