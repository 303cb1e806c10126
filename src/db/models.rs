//! Row types for the per-category tables in `migrations/0001_init.sql`.
//! Used by sqlx for typed reads; each converts back into its record type.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::types::{
    Category, Direction, EarningsReport, EconomicEvent, HolidayStatus, Importance, MarketHoliday,
    PremarketMover, SentimentLabel, SentimentReading, TimeOfDay,
};

#[derive(Debug, sqlx::FromRow)]
pub struct EarningsRow {
    pub symbol: String,
    pub report_date: NaiveDate,
    pub time_of_day: Option<String>,
    pub eps_estimate: Option<f64>,
    pub eps_reported: Option<f64>,
    pub revenue_estimate: Option<f64>,
    pub revenue_reported: Option<f64>,
    pub market_cap: Option<f64>,
    pub observed_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct EconomicEventRow {
    pub name: String,
    pub scheduled_at: i64,
    pub importance: String,
    pub country: String,
    pub currency: Option<String>,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub prior: Option<String>,
    pub observed_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SentimentRow {
    pub day: NaiveDate,
    pub value: f64,
    pub observed_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PremarketMoverRow {
    pub symbol: String,
    pub market_day: NaiveDate,
    pub direction: String,
    pub change_percent: f64,
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub volume: Option<f64>,
    pub observed_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MarketHolidayRow {
    pub name: String,
    pub date: NaiveDate,
    pub exchange: String,
    pub status: String,
    pub open: Option<String>,
    pub close: Option<String>,
    pub observed_at: i64,
}

pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(category: Category, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt { category, detail: format!("timestamp {ms} out of range") })
}

fn decode<T>(category: Category, column: &str, raw: &str, parsed: Option<T>) -> Result<T, StoreError> {
    parsed.ok_or_else(|| StoreError::Corrupt {
        category,
        detail: format!("unknown {column} {raw:?}"),
    })
}

impl EarningsRow {
    pub fn into_record(self) -> Result<EarningsReport, StoreError> {
        let c = Category::Earnings;
        let time_of_day = match self.time_of_day {
            Some(t) => Some(decode(c, "time_of_day", &t, TimeOfDay::parse(&t))?),
            None => None,
        };
        Ok(EarningsReport {
            symbol: self.symbol,
            report_date: self.report_date,
            time_of_day,
            eps_estimate: self.eps_estimate,
            eps_reported: self.eps_reported,
            revenue_estimate: self.revenue_estimate,
            revenue_reported: self.revenue_reported,
            market_cap: self.market_cap,
            observed_at: from_millis(c, self.observed_at)?,
        })
    }
}

impl EconomicEventRow {
    pub fn into_record(self) -> Result<EconomicEvent, StoreError> {
        let c = Category::EconomicEvents;
        Ok(EconomicEvent {
            importance: decode(c, "importance", &self.importance, Importance::parse(&self.importance))?,
            name: self.name,
            scheduled_at: from_millis(c, self.scheduled_at)?,
            country: self.country,
            currency: self.currency,
            actual: self.actual,
            forecast: self.forecast,
            prior: self.prior,
            observed_at: from_millis(c, self.observed_at)?,
        })
    }
}

impl SentimentRow {
    /// The label is derived from the stored value rather than stored itself.
    pub fn into_record(self) -> Result<SentimentReading, StoreError> {
        Ok(SentimentReading {
            value: self.value,
            label: SentimentLabel::from_value(self.value),
            day: self.day,
            observed_at: from_millis(Category::Sentiment, self.observed_at)?,
        })
    }
}

impl PremarketMoverRow {
    pub fn into_record(self) -> Result<PremarketMover, StoreError> {
        let c = Category::PremarketMovers;
        Ok(PremarketMover {
            direction: decode(c, "direction", &self.direction, Direction::parse(&self.direction))?,
            symbol: self.symbol,
            change_percent: self.change_percent,
            price: self.price,
            change: self.change,
            volume: self.volume,
            market_day: self.market_day,
            observed_at: from_millis(c, self.observed_at)?,
        })
    }
}

impl MarketHolidayRow {
    pub fn into_record(self) -> Result<MarketHoliday, StoreError> {
        let c = Category::MarketHolidays;
        Ok(MarketHoliday {
            status: decode(c, "status", &self.status, HolidayStatus::parse(&self.status))?,
            name: self.name,
            date: self.date,
            exchange: self.exchange,
            open: self.open,
            close: self.close,
            observed_at: from_millis(c, self.observed_at)?,
        })
    }
}
