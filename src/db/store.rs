use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqlitePool, SqliteQueryResult};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, warn};

use crate::db::models::{
    to_millis, EarningsRow, EconomicEventRow, MarketHolidayRow, PremarketMoverRow, SentimentRow,
};
use crate::error::StoreError;
use crate::types::{Category, Direction, Record};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// Optional narrowing applied to a category read. Filters that do not apply to
/// a category (e.g. `direction` for earnings) are ignored.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub limit: Option<u32>,
    /// Earnings and pre-market movers.
    pub symbol: Option<String>,
    /// Pre-market movers.
    pub direction: Option<Direction>,
    /// Report date, event date, or holiday date on or after this day.
    pub from: Option<NaiveDate>,
    /// Only rows observed within this long of now.
    pub max_age: Option<Duration>,
}

impl QueryFilter {
    pub fn limit(limit: u32) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }

    fn effective_limit(&self) -> i64 {
        i64::from(self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
    }

    fn observed_since(&self, now: DateTime<Utc>) -> Option<i64> {
        self.max_age.map(|age| to_millis(now - age))
    }
}

/// SQLite-backed store: one table per category, upserts keyed by natural key.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    /// Inserts or updates `records` in one transaction and returns the number of
    /// rows written. A collision only overwrites when the incoming observation is
    /// not older than the stored one, so replaying a batch changes nothing.
    ///
    /// Records of another category and rows rejected by a table constraint are
    /// logged and skipped; any other database error fails the whole call.
    pub async fn upsert(&self, category: Category, records: &[Record]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::unavailable(category))?;
        let mut written = 0usize;
        let mut skipped = 0usize;

        for record in records {
            if record.category() != category {
                warn!(%category, found = %record.category(), "Record in wrong category, skipping");
                skipped += 1;
                continue;
            }
            match write_record(&mut tx, record).await {
                Ok(res) => written += res.rows_affected() as usize,
                Err(sqlx::Error::Database(db)) if !matches!(db.kind(), ErrorKind::Other) => {
                    warn!(%category, error = %db, "Row violates a table constraint, skipping");
                    skipped += 1;
                }
                Err(e) => return Err(StoreError::Unavailable { category, cause: e }),
            }
        }

        tx.commit().await.map_err(StoreError::unavailable(category))?;
        debug!(%category, written, skipped, "Upsert committed");
        Ok(written)
    }

    /// Newest observations first.
    pub async fn latest(&self, category: Category, limit: u32) -> Result<Vec<Record>, StoreError> {
        self.query(category, &QueryFilter::limit(limit)).await
    }

    pub async fn query(&self, category: Category, filter: &QueryFilter) -> Result<Vec<Record>, StoreError> {
        let since = filter.observed_since(Utc::now());
        let limit = filter.effective_limit();
        let unavailable = StoreError::unavailable(category);

        match category {
            Category::Earnings => {
                let rows = sqlx::query_as::<_, EarningsRow>(
                    r#"
                    SELECT symbol, report_date, time_of_day, eps_estimate, eps_reported,
                           revenue_estimate, revenue_reported, market_cap, observed_at
                    FROM earnings_reports
                    WHERE (? IS NULL OR symbol = ?)
                      AND (? IS NULL OR report_date >= ?)
                      AND (? IS NULL OR observed_at >= ?)
                    ORDER BY observed_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(filter.symbol.as_deref())
                .bind(filter.symbol.as_deref())
                .bind(filter.from)
                .bind(filter.from)
                .bind(since)
                .bind(since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
                rows.into_iter().map(|r| r.into_record().map(Record::Earnings)).collect()
            }
            Category::EconomicEvents => {
                let from = filter.from.map(|d| to_millis(d.and_time(chrono::NaiveTime::MIN).and_utc()));
                let rows = sqlx::query_as::<_, EconomicEventRow>(
                    r#"
                    SELECT name, scheduled_at, importance, country, currency,
                           actual, forecast, prior, observed_at
                    FROM economic_events
                    WHERE (? IS NULL OR scheduled_at >= ?)
                      AND (? IS NULL OR observed_at >= ?)
                    ORDER BY observed_at DESC, scheduled_at ASC
                    LIMIT ?
                    "#,
                )
                .bind(from)
                .bind(from)
                .bind(since)
                .bind(since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
                rows.into_iter().map(|r| r.into_record().map(Record::EconomicEvent)).collect()
            }
            Category::Sentiment => {
                let rows = sqlx::query_as::<_, SentimentRow>(
                    r#"
                    SELECT day, value, observed_at
                    FROM sentiment_readings
                    WHERE (? IS NULL OR day >= ?)
                      AND (? IS NULL OR observed_at >= ?)
                    ORDER BY observed_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(filter.from)
                .bind(filter.from)
                .bind(since)
                .bind(since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
                rows.into_iter().map(|r| r.into_record().map(Record::Sentiment)).collect()
            }
            Category::PremarketMovers => {
                let direction = filter.direction.map(Direction::as_str);
                let rows = sqlx::query_as::<_, PremarketMoverRow>(
                    r#"
                    SELECT symbol, market_day, direction, change_percent, price, change,
                           volume, observed_at
                    FROM premarket_movers
                    WHERE (? IS NULL OR symbol = ?)
                      AND (? IS NULL OR direction = ?)
                      AND (? IS NULL OR market_day >= ?)
                      AND (? IS NULL OR observed_at >= ?)
                    ORDER BY observed_at DESC, ABS(change_percent) DESC
                    LIMIT ?
                    "#,
                )
                .bind(filter.symbol.as_deref())
                .bind(filter.symbol.as_deref())
                .bind(direction)
                .bind(direction)
                .bind(filter.from)
                .bind(filter.from)
                .bind(since)
                .bind(since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
                rows.into_iter().map(|r| r.into_record().map(Record::PremarketMover)).collect()
            }
            Category::MarketHolidays => {
                let rows = sqlx::query_as::<_, MarketHolidayRow>(
                    r#"
                    SELECT name, date, exchange, status, open, close, observed_at
                    FROM market_holidays
                    WHERE (? IS NULL OR date >= ?)
                      AND (? IS NULL OR observed_at >= ?)
                    ORDER BY observed_at DESC, date ASC, exchange ASC
                    LIMIT ?
                    "#,
                )
                .bind(filter.from)
                .bind(filter.from)
                .bind(since)
                .bind(since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
                rows.into_iter().map(|r| r.into_record().map(Record::MarketHoliday)).collect()
            }
        }
    }
}

async fn write_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &Record,
) -> Result<SqliteQueryResult, sqlx::Error> {
    match record {
        Record::Earnings(r) => {
            sqlx::query(
                r#"
                INSERT INTO earnings_reports (
                    symbol, report_date, time_of_day, eps_estimate, eps_reported,
                    revenue_estimate, revenue_reported, market_cap, observed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, report_date) DO UPDATE SET
                    time_of_day = excluded.time_of_day,
                    eps_estimate = excluded.eps_estimate,
                    eps_reported = excluded.eps_reported,
                    revenue_estimate = excluded.revenue_estimate,
                    revenue_reported = excluded.revenue_reported,
                    market_cap = excluded.market_cap,
                    observed_at = excluded.observed_at
                WHERE excluded.observed_at >= earnings_reports.observed_at
                "#,
            )
            .bind(&r.symbol)
            .bind(r.report_date)
            .bind(r.time_of_day.map(|t| t.as_str()))
            .bind(r.eps_estimate)
            .bind(r.eps_reported)
            .bind(r.revenue_estimate)
            .bind(r.revenue_reported)
            .bind(r.market_cap)
            .bind(to_millis(r.observed_at))
            .execute(&mut **tx)
            .await
        }
        Record::EconomicEvent(r) => {
            sqlx::query(
                r#"
                INSERT INTO economic_events (
                    name, scheduled_at, importance, country, currency,
                    actual, forecast, prior, observed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(name, scheduled_at, country) DO UPDATE SET
                    importance = excluded.importance,
                    currency = excluded.currency,
                    actual = excluded.actual,
                    forecast = excluded.forecast,
                    prior = excluded.prior,
                    observed_at = excluded.observed_at
                WHERE excluded.observed_at >= economic_events.observed_at
                "#,
            )
            .bind(&r.name)
            .bind(to_millis(r.scheduled_at))
            .bind(r.importance.as_str())
            .bind(&r.country)
            .bind(r.currency.as_deref())
            .bind(r.actual.as_deref())
            .bind(r.forecast.as_deref())
            .bind(r.prior.as_deref())
            .bind(to_millis(r.observed_at))
            .execute(&mut **tx)
            .await
        }
        Record::Sentiment(r) => {
            sqlx::query(
                r#"
                INSERT INTO sentiment_readings (day, value, observed_at)
                VALUES (?, ?, ?)
                ON CONFLICT(day) DO UPDATE SET
                    value = excluded.value,
                    observed_at = excluded.observed_at
                WHERE excluded.observed_at >= sentiment_readings.observed_at
                "#,
            )
            .bind(r.day)
            .bind(r.value)
            .bind(to_millis(r.observed_at))
            .execute(&mut **tx)
            .await
        }
        Record::PremarketMover(r) => {
            sqlx::query(
                r#"
                INSERT INTO premarket_movers (
                    symbol, market_day, direction, change_percent, price, change,
                    volume, observed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, market_day) DO UPDATE SET
                    direction = excluded.direction,
                    change_percent = excluded.change_percent,
                    price = excluded.price,
                    change = excluded.change,
                    volume = excluded.volume,
                    observed_at = excluded.observed_at
                WHERE excluded.observed_at >= premarket_movers.observed_at
                "#,
            )
            .bind(&r.symbol)
            .bind(r.market_day)
            .bind(r.direction.as_str())
            .bind(r.change_percent)
            .bind(r.price)
            .bind(r.change)
            .bind(r.volume)
            .bind(to_millis(r.observed_at))
            .execute(&mut **tx)
            .await
        }
        Record::MarketHoliday(r) => {
            sqlx::query(
                r#"
                INSERT INTO market_holidays (
                    name, date, exchange, status, open, close, observed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(name, date, exchange) DO UPDATE SET
                    status = excluded.status,
                    open = excluded.open,
                    close = excluded.close,
                    observed_at = excluded.observed_at
                WHERE excluded.observed_at >= market_holidays.observed_at
                "#,
            )
            .bind(&r.name)
            .bind(r.date)
            .bind(r.exchange.as_str())
            .bind(r.status.as_str())
            .bind(r.open.as_deref())
            .bind(r.close.as_deref())
            .bind(to_millis(r.observed_at))
            .execute(&mut **tx)
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::normalizer::parse_datetime;
    use crate::types::{
        EarningsReport, EconomicEvent, HolidayStatus, Importance, MarketHoliday, PremarketMover,
        SentimentLabel, SentimentReading, TimeOfDay,
    };

    fn ts(s: &str) -> DateTime<Utc> {
        parse_datetime(s).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn aapl(time_of_day: TimeOfDay, observed_at: &str) -> Record {
        Record::Earnings(EarningsReport {
            symbol: "AAPL".to_string(),
            report_date: day(2024, 5, 2),
            time_of_day: Some(time_of_day),
            eps_estimate: Some(1.5),
            eps_reported: None,
            revenue_estimate: None,
            revenue_reported: None,
            market_cap: None,
            observed_at: ts(observed_at),
        })
    }

    fn sentiment(value: f64, observed_at: &str) -> Record {
        Record::Sentiment(SentimentReading {
            value,
            label: SentimentLabel::from_value(value),
            day: day(2024, 5, 2),
            observed_at: ts(observed_at),
        })
    }

    async fn store() -> SqliteStore {
        SqliteStore::new(test_pool().await)
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = store().await;
        let batch = vec![aapl(TimeOfDay::AfterClose, "2024-04-30T12:00:00Z")];

        store.upsert(Category::Earnings, &batch).await.unwrap();
        let first = store.latest(Category::Earnings, 10).await.unwrap();
        store.upsert(Category::Earnings, &batch).await.unwrap();
        let second = store.latest(Category::Earnings, 10).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        assert_eq!(first[0], batch[0]);
    }

    #[tokio::test]
    async fn newer_observation_replaces_non_key_fields() {
        let store = store().await;
        store
            .upsert(Category::Earnings, &[aapl(TimeOfDay::AfterClose, "2024-04-30T12:00:00Z")])
            .await
            .unwrap();
        store
            .upsert(Category::Earnings, &[aapl(TimeOfDay::BeforeOpen, "2024-05-01T12:00:00Z")])
            .await
            .unwrap();

        let rows = store.latest(Category::Earnings, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let Record::Earnings(r) = &rows[0] else { panic!("expected earnings") };
        assert_eq!(r.time_of_day, Some(TimeOfDay::BeforeOpen));
        assert_eq!(r.observed_at, ts("2024-05-01T12:00:00Z"));
    }

    #[tokio::test]
    async fn older_observation_does_not_overwrite() {
        let store = store().await;
        store
            .upsert(Category::Earnings, &[aapl(TimeOfDay::BeforeOpen, "2024-05-01T12:00:00Z")])
            .await
            .unwrap();
        let written = store
            .upsert(Category::Earnings, &[aapl(TimeOfDay::AfterClose, "2024-04-30T12:00:00Z")])
            .await
            .unwrap();

        assert_eq!(written, 0);
        let rows = store.latest(Category::Earnings, 10).await.unwrap();
        let Record::Earnings(r) = &rows[0] else { panic!("expected earnings") };
        assert_eq!(r.time_of_day, Some(TimeOfDay::BeforeOpen));
    }

    #[tokio::test]
    async fn sentiment_keeps_latest_reading_of_the_day() {
        let store = store().await;
        store
            .upsert(
                Category::Sentiment,
                &[sentiment(40.0, "2024-05-02T14:00:00Z"), sentiment(62.0, "2024-05-02T18:00:00Z")],
            )
            .await
            .unwrap();

        let rows = store.latest(Category::Sentiment, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let Record::Sentiment(r) = &rows[0] else { panic!("expected sentiment") };
        assert_eq!(r.value, 62.0);
        assert_eq!(r.label, SentimentLabel::Greed);
    }

    #[tokio::test]
    async fn wrong_category_and_constraint_violations_are_skipped() {
        let store = store().await;
        let batch = vec![
            aapl(TimeOfDay::AfterClose, "2024-04-30T12:00:00Z"),
            sentiment(150.0, "2024-05-02T14:00:00Z"),
            sentiment(55.0, "2024-05-02T15:00:00Z"),
        ];

        let written = store.upsert(Category::Sentiment, &batch).await.unwrap();
        assert_eq!(written, 1);
        assert!(store.latest(Category::Earnings, 10).await.unwrap().is_empty());
        assert_eq!(store.latest(Category::Sentiment, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_category_reads_empty() {
        let store = store().await;
        for category in [
            Category::Earnings,
            Category::EconomicEvents,
            Category::Sentiment,
            Category::PremarketMovers,
            Category::MarketHolidays,
        ] {
            assert!(store.latest(category, 5).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn query_filters_by_direction_and_symbol() {
        let store = store().await;
        let mover = |symbol: &str, direction, change_percent| {
            Record::PremarketMover(PremarketMover {
                symbol: symbol.to_string(),
                direction,
                change_percent,
                price: None,
                change: None,
                volume: None,
                market_day: day(2024, 5, 2),
                observed_at: ts("2024-05-02T12:00:00Z"),
            })
        };
        store
            .upsert(
                Category::PremarketMovers,
                &[
                    mover("SMCI", Direction::Gainer, 12.5),
                    mover("PLTR", Direction::Gainer, 6.1),
                    mover("INTC", Direction::Loser, -8.3),
                ],
            )
            .await
            .unwrap();

        let gainers = QueryFilter { direction: Some(Direction::Gainer), ..QueryFilter::default() };
        let rows = store.query(Category::PremarketMovers, &gainers).await.unwrap();
        assert_eq!(rows.len(), 2);
        let Record::PremarketMover(top) = &rows[0] else { panic!("expected mover") };
        assert_eq!(top.symbol, "SMCI");

        let intc = QueryFilter { symbol: Some("INTC".to_string()), ..QueryFilter::default() };
        assert_eq!(store.query(Category::PremarketMovers, &intc).await.unwrap().len(), 1);

        let limited = store.latest(Category::PremarketMovers, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn same_event_in_two_countries_keeps_both_rows() {
        let store = store().await;
        let release = |country: &str, currency: &str| {
            Record::EconomicEvent(EconomicEvent {
                name: "Unemployment Rate".to_string(),
                scheduled_at: ts("2024-03-08T13:30:00Z"),
                importance: Importance::High,
                country: country.to_string(),
                currency: Some(currency.to_string()),
                actual: None,
                forecast: None,
                prior: None,
                observed_at: ts("2024-03-07T12:00:00Z"),
            })
        };
        let batch = [release("US", "USD"), release("CA", "CAD")];

        let written = store.upsert(Category::EconomicEvents, &batch).await.unwrap();
        assert_eq!(written, 2);
        let rows = store.latest(Category::EconomicEvents, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        for record in &batch {
            assert!(rows.contains(record));
        }

        // Replaying the batch still leaves one row per country.
        store.upsert(Category::EconomicEvents, &batch).await.unwrap();
        assert_eq!(store.latest(Category::EconomicEvents, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn holidays_filter_from_date() {
        let store = store().await;
        let holiday = |name: &str, date| {
            Record::MarketHoliday(MarketHoliday {
                name: name.to_string(),
                date,
                exchange: "NYSE".to_string(),
                status: HolidayStatus::Closed,
                open: None,
                close: None,
                observed_at: ts("2024-11-01T12:00:00Z"),
            })
        };
        store
            .upsert(
                Category::MarketHolidays,
                &[holiday("Thanksgiving", day(2024, 11, 28)), holiday("Christmas", day(2024, 12, 25))],
            )
            .await
            .unwrap();

        let filter = QueryFilter { from: Some(day(2024, 12, 1)), ..QueryFilter::default() };
        let rows = store.query(Category::MarketHolidays, &filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        let Record::MarketHoliday(h) = &rows[0] else { panic!("expected holiday") };
        assert_eq!(h.name, "Christmas");
    }
}
