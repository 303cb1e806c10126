//! Raw extractor output → typed records.
//!
//! Everything here is pure: the observation timestamp comes from the raw record
//! (stamped by the source client), never from the clock, so the same input always
//! yields the same record or the same [`ValidationError`].

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};

use crate::config::{premarket_window, MARKET_TZ};
use crate::error::ValidationError;
use crate::types::{
    Category, Direction, EarningsReport, EconomicEvent, HolidayStatus, Importance, MarketHoliday,
    PremarketMover, RawRecord, RawValue, Record, SentimentLabel, SentimentReading, TimeOfDay,
    OBSERVED_AT,
};

type VResult<T> = std::result::Result<T, ValidationError>;

/// Outcome of normalizing one source's batch.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<Record>,
    pub dropped: usize,
    /// Drop count per [`ValidationError::kind`].
    pub drop_kinds: BTreeMap<&'static str, usize>,
}

pub fn normalize_batch(category: Category, raws: &[RawRecord]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for raw in raws {
        match normalize(category, raw) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                batch.dropped += 1;
                *batch.drop_kinds.entry(e.kind()).or_default() += 1;
            }
        }
    }
    batch
}

pub fn normalize(category: Category, raw: &RawRecord) -> VResult<Record> {
    match category {
        Category::Earnings => normalize_earnings(raw).map(Record::Earnings),
        Category::EconomicEvents => normalize_economic_event(raw).map(Record::EconomicEvent),
        Category::Sentiment => normalize_sentiment(raw).map(Record::Sentiment),
        Category::PremarketMovers => normalize_premarket_mover(raw).map(Record::PremarketMover),
        Category::MarketHolidays => normalize_market_holiday(raw).map(Record::MarketHoliday),
    }
}

// ---------------------------------------------------------------------------
// Per-category rules
// ---------------------------------------------------------------------------

fn normalize_earnings(raw: &RawRecord) -> VResult<EarningsReport> {
    let time_of_day = match optional_text(raw, "time") {
        Some(t) => parse_time_of_day(&t)
            .map_err(|_| ValidationError::Unrecognized { field: "time", value: t })?,
        None => None,
    };

    Ok(EarningsReport {
        symbol: symbol(raw)?,
        report_date: required_date(raw, "date")?,
        time_of_day,
        eps_estimate: optional_number(raw, "eps_estimate")?,
        eps_reported: optional_number(raw, "eps_reported")?,
        revenue_estimate: optional_number(raw, "revenue_estimate")?,
        revenue_reported: optional_number(raw, "revenue_reported")?,
        market_cap: optional_number(raw, "market_cap")?,
        observed_at: observed_at(raw)?,
    })
}

fn normalize_economic_event(raw: &RawRecord) -> VResult<EconomicEvent> {
    let importance_raw = required_text(raw, "importance")?;
    let importance = parse_importance(&importance_raw).ok_or_else(|| {
        ValidationError::Unrecognized { field: "importance", value: importance_raw.clone() }
    })?;
    if importance != Importance::High {
        return Err(ValidationError::NotHighImportance(importance.as_str().to_string()));
    }

    let scheduled_raw = required_text(raw, "scheduled_at")?;
    let scheduled_at = match raw.get("scheduled_at") {
        Some(RawValue::Number(ms)) => DateTime::from_timestamp_millis(*ms as i64),
        _ => parse_datetime(&scheduled_raw),
    }
    .ok_or(ValidationError::InvalidDate { field: "scheduled_at", value: scheduled_raw })?;

    Ok(EconomicEvent {
        name: required_text(raw, "name")?,
        scheduled_at,
        importance,
        country: required_text(raw, "country")?,
        currency: optional_text(raw, "currency").map(|c| c.to_uppercase()),
        actual: optional_text(raw, "actual"),
        forecast: optional_text(raw, "forecast"),
        prior: optional_text(raw, "prior"),
        observed_at: observed_at(raw)?,
    })
}

fn normalize_sentiment(raw: &RawRecord) -> VResult<SentimentReading> {
    let value = required_number(raw, "value")?;
    if !(0.0..=100.0).contains(&value) {
        return Err(ValidationError::OutOfRange { field: "value", value: value.to_string() });
    }
    let observed_at = observed_at(raw)?;

    Ok(SentimentReading {
        value,
        label: SentimentLabel::from_value(value),
        day: market_day(observed_at),
        observed_at,
    })
}

/// Rejects anything observed outside `[04:00, 09:30)` market-local time.
fn normalize_premarket_mover(raw: &RawRecord) -> VResult<PremarketMover> {
    let observed_at = observed_at(raw)?;
    if !in_premarket_window(observed_at) {
        return Err(ValidationError::OutsidePremarketWindow(observed_at.to_rfc3339()));
    }

    let direction_raw = required_text(raw, "direction")?;
    let direction = Direction::parse(&direction_raw.to_lowercase()).ok_or(
        ValidationError::Unrecognized { field: "direction", value: direction_raw },
    )?;

    Ok(PremarketMover {
        symbol: symbol(raw)?,
        direction,
        change_percent: required_number(raw, "change_percent")?,
        price: optional_number(raw, "price")?,
        change: optional_number(raw, "change")?,
        volume: optional_number(raw, "volume")?,
        market_day: market_day(observed_at),
        observed_at,
    })
}

fn normalize_market_holiday(raw: &RawRecord) -> VResult<MarketHoliday> {
    let status_raw = required_text(raw, "status")?;
    let status = HolidayStatus::parse(&status_raw.to_lowercase())
        .ok_or(ValidationError::Unrecognized { field: "status", value: status_raw })?;

    Ok(MarketHoliday {
        name: required_text(raw, "name")?,
        date: required_date(raw, "date")?,
        exchange: required_text(raw, "exchange")?.to_uppercase(),
        status,
        open: optional_text(raw, "open"),
        close: optional_text(raw, "close"),
        observed_at: observed_at(raw)?,
    })
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// Values sources use to mean "nothing here".
fn is_placeholder(s: &str) -> bool {
    matches!(s, "" | "—" | "–" | "-" | "N/A" | "n/a" | "NA" | "null" | "None")
}

fn optional_text(raw: &RawRecord, field: &'static str) -> Option<String> {
    match raw.get(field)? {
        RawValue::Text(s) => {
            let s = s.trim();
            (!is_placeholder(s)).then(|| s.to_string())
        }
        RawValue::Number(n) => Some(n.to_string()),
    }
}

fn required_text(raw: &RawRecord, field: &'static str) -> VResult<String> {
    optional_text(raw, field).ok_or(ValidationError::MissingField(field))
}

fn optional_number(raw: &RawRecord, field: &'static str) -> VResult<Option<f64>> {
    match raw.get(field) {
        None => Ok(None),
        Some(RawValue::Number(n)) if n.is_finite() => Ok(Some(*n)),
        Some(RawValue::Number(n)) => {
            Err(ValidationError::InvalidNumber { field, value: n.to_string() })
        }
        Some(RawValue::Text(s)) => {
            let s = s.trim();
            if is_placeholder(s) {
                return Ok(None);
            }
            parse_number(s)
                .map(Some)
                .ok_or_else(|| ValidationError::InvalidNumber { field, value: s.to_string() })
        }
    }
}

fn required_number(raw: &RawRecord, field: &'static str) -> VResult<f64> {
    optional_number(raw, field)?.ok_or(ValidationError::MissingField(field))
}

fn required_date(raw: &RawRecord, field: &'static str) -> VResult<NaiveDate> {
    let s = required_text(raw, field)?;
    parse_date(&s).ok_or(ValidationError::InvalidDate { field, value: s })
}

fn observed_at(raw: &RawRecord) -> VResult<DateTime<Utc>> {
    let s = required_text(raw, OBSERVED_AT)?;
    parse_datetime(&s).ok_or(ValidationError::InvalidDate { field: OBSERVED_AT, value: s })
}

/// Ticker symbols: upper-cased, letters/digits plus `.` and `-`, at most 12 chars.
fn symbol(raw: &RawRecord) -> VResult<String> {
    let s = required_text(raw, "symbol")?.to_uppercase();
    let valid = s.len() <= 12
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && s.chars().any(|c| c.is_ascii_alphabetic());
    if !valid {
        return Err(ValidationError::Unrecognized { field: "symbol", value: s });
    }
    Ok(s)
}

// ---------------------------------------------------------------------------
// Coercions
// ---------------------------------------------------------------------------

/// Parses source-formatted numbers: `1,234.5`, `−0.12` (Unicode minus), `+4.2%`,
/// `1.52 USD`, and magnitude suffixes `K`/`M`/`B`/`T` (`2.95 T` → 2.95e12).
pub fn parse_number(s: &str) -> Option<f64> {
    let mut cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '\u{202f}')
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();

    if let Some(stripped) = cleaned.strip_suffix("USD") {
        cleaned = stripped.to_string();
    }
    if let Some(stripped) = cleaned.strip_suffix('%') {
        cleaned = stripped.to_string();
    }

    let (digits, multiplier) = match cleaned.chars().last()? {
        'K' | 'k' => (&cleaned[..cleaned.len() - 1], 1e3),
        'M' | 'm' => (&cleaned[..cleaned.len() - 1], 1e6),
        'B' | 'b' => (&cleaned[..cleaned.len() - 1], 1e9),
        'T' | 't' => (&cleaned[..cleaned.len() - 1], 1e12),
        _ => (cleaned.as_str(), 1.0),
    };
    let digits = digits.strip_prefix('+').unwrap_or(digits);

    let value = digits.parse::<f64>().ok()? * multiplier;
    value.is_finite().then_some(value)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%m/%d/%Y"];

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
}

/// RFC 3339, or a naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `Ok(None)` for "unknown"-style values, `Err(())` for anything unrecognized.
fn parse_time_of_day(s: &str) -> std::result::Result<Option<TimeOfDay>, ()> {
    let lower = s.trim().to_lowercase();
    match lower.as_str() {
        "before" | "bmo" | "before open" | "before market open" | "pre-market" | "premarket" => {
            Ok(Some(TimeOfDay::BeforeOpen))
        }
        "after" | "amc" | "after close" | "after market close" | "after-hours"
        | "after hours" => Ok(Some(TimeOfDay::AfterClose)),
        "unknown" | "time not supplied" | "tns" | "during market" | "dmh" => Ok(None),
        _ => Err(()),
    }
}

/// Text levels, or the calendar's numeric scale where `1` is high, `0` medium, `-1` low.
fn parse_importance(s: &str) -> Option<Importance> {
    match s.trim().to_lowercase().as_str() {
        "high" | "1" => Some(Importance::High),
        "medium" | "moderate" | "0" => Some(Importance::Medium),
        "low" | "-1" => Some(Importance::Low),
        _ => None,
    }
}

fn market_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&MARKET_TZ).date_naive()
}

/// Weekday mornings only; on weekends the snapshot still describes Friday.
pub fn in_premarket_window(at: DateTime<Utc>) -> bool {
    let day = market_day(at);
    if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let (sh, sm) = premarket_window::START;
    let (eh, em) = premarket_window::END;
    match (market_local(day, sh, sm), market_local(day, eh, em)) {
        (Some(start), Some(end)) => at >= start && at < end,
        _ => false,
    }
}

/// Converts a market-local wall-clock time to UTC; `None` inside a DST gap.
pub fn market_local(date: NaiveDate, h: u32, m: u32) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(h, m, 0)?;
    MARKET_TZ
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
