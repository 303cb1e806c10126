use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// One storage category per external source. Categories never reference each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Earnings,
    EconomicEvents,
    Sentiment,
    PremarketMovers,
    MarketHolidays,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Earnings => "earnings",
            Category::EconomicEvents => "economic_events",
            Category::Sentiment => "sentiment",
            Category::PremarketMovers => "premarket_movers",
            Category::MarketHolidays => "market_holidays",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Raw records: extractor output, pre-validation
// ---------------------------------------------------------------------------

/// Field set on every raw record by the source client at extraction time.
pub const OBSERVED_AT: &str = "observed_at";

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Number(n as f64)
    }
}

/// Untyped field map straight out of an extractor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a record stamped with its observation time.
    pub fn observed(at: DateTime<Utc>) -> Self {
        Self::new().with(OBSERVED_AT, at.to_rfc3339())
    }

    pub fn with(mut self, field: &str, value: impl Into<RawValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<RawValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Sets `field` only when a value was actually extracted.
    pub fn insert_opt(&mut self, field: &str, value: Option<impl Into<RawValue>>) {
        if let Some(v) = value {
            self.insert(field, v);
        }
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.fields.get(field)
    }
}

// ---------------------------------------------------------------------------
// Enumerated fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    BeforeOpen,
    AfterClose,
}

impl TimeOfDay {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::BeforeOpen => "before_open",
            TimeOfDay::AfterClose => "after_close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "before_open" => Some(TimeOfDay::BeforeOpen),
            "after_close" => Some(TimeOfDay::AfterClose),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn as_str(self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Importance::Low),
            "medium" => Some(Importance::Medium),
            "high" => Some(Importance::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Gainer,
    Loser,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Gainer => "gainer",
            Direction::Loser => "loser",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gainer" | "gainers" => Some(Direction::Gainer),
            "loser" | "losers" => Some(Direction::Loser),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl SentimentLabel {
    /// Bands: 0–25, 26–44, 45–55, 56–74, 75–100, applied to the rounded value.
    pub fn from_value(value: f64) -> Self {
        match value.round() as i64 {
            i64::MIN..=25 => SentimentLabel::ExtremeFear,
            26..=44 => SentimentLabel::Fear,
            45..=55 => SentimentLabel::Neutral,
            56..=74 => SentimentLabel::Greed,
            _ => SentimentLabel::ExtremeGreed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HolidayStatus {
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "early-close")]
    EarlyClose,
}

impl HolidayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HolidayStatus::Closed => "closed",
            HolidayStatus::EarlyClose => "early-close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "closed" => Some(HolidayStatus::Closed),
            "early-close" | "early_close" => Some(HolidayStatus::EarlyClose),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized records
// ---------------------------------------------------------------------------

/// Unique per (symbol, report_date).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsReport {
    pub symbol: String,
    pub report_date: NaiveDate,
    pub time_of_day: Option<TimeOfDay>,
    pub eps_estimate: Option<f64>,
    pub eps_reported: Option<f64>,
    pub revenue_estimate: Option<f64>,
    pub revenue_reported: Option<f64>,
    pub market_cap: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// Unique per (name, scheduled_at). Only high-importance events are ever stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicEvent {
    pub name: String,
    pub scheduled_at: DateTime<Utc>,
    pub importance: Importance,
    pub country: String,
    pub currency: Option<String>,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub prior: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// One row per market-local day; the latest observation of the day wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentReading {
    pub value: f64,
    pub label: SentimentLabel,
    pub day: NaiveDate,
    pub observed_at: DateTime<Utc>,
}

/// Unique per (symbol, market_day). Only observed inside the pre-market session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PremarketMover {
    pub symbol: String,
    pub direction: Direction,
    pub change_percent: f64,
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub volume: Option<f64>,
    pub market_day: NaiveDate,
    pub observed_at: DateTime<Utc>,
}

/// Unique per (name, date, exchange).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketHoliday {
    pub name: String,
    pub date: NaiveDate,
    pub exchange: String,
    pub status: HolidayStatus,
    pub open: Option<String>,
    pub close: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Earnings(EarningsReport),
    EconomicEvent(EconomicEvent),
    Sentiment(SentimentReading),
    PremarketMover(PremarketMover),
    MarketHoliday(MarketHoliday),
}

impl Record {
    pub fn category(&self) -> Category {
        match self {
            Record::Earnings(_) => Category::Earnings,
            Record::EconomicEvent(_) => Category::EconomicEvents,
            Record::Sentiment(_) => Category::Sentiment,
            Record::PremarketMover(_) => Category::PremarketMovers,
            Record::MarketHoliday(_) => Category::MarketHolidays,
        }
    }
}
