//! Read-only access for the API layer. Never triggers a refresh.

use crate::db::{QueryFilter, SqliteStore};
use crate::error::StoreError;
use crate::types::{Category, Record};

#[derive(Clone)]
pub struct MarketDataQuery {
    store: SqliteStore,
}

impl MarketDataQuery {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Latest records in `category`, newest observation first. An empty result is
    /// not an error.
    pub async fn get(&self, category: Category, filter: &QueryFilter) -> Result<Vec<Record>, StoreError> {
        self.store.query(category, filter).await
    }

    /// The `limit` newest records in `category`, unfiltered.
    pub async fn latest(&self, category: Category, limit: u32) -> Result<Vec<Record>, StoreError> {
        self.store.latest(category, limit).await
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::normalizer::{normalize, parse_datetime};
    use crate::types::RawRecord;

    #[tokio::test]
    async fn empty_store_returns_empty_list() {
        let query = MarketDataQuery::new(SqliteStore::new(test_pool().await));
        let rows = query.get(Category::EconomicEvents, &QueryFilter::default()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn reads_what_the_store_wrote() {
        let store = SqliteStore::new(test_pool().await);
        let observed = parse_datetime("2024-03-11T09:00:00Z").unwrap();
        let raws = [
            RawRecord::observed(observed)
                .with("name", "CPI m/m")
                .with("scheduled_at", "2024-03-12T12:30:00.000Z")
                .with("importance", 1.0)
                .with("country", "US"),
            RawRecord::observed(observed)
                .with("name", "Employment Change")
                .with("scheduled_at", "2024-03-08T13:30:00.000Z")
                .with("importance", "high")
                .with("country", "CA"),
        ];
        let records: Vec<_> = raws
            .iter()
            .map(|r| normalize(Category::EconomicEvents, r).unwrap())
            .collect();
        store.upsert(Category::EconomicEvents, &records).await.unwrap();

        let query = MarketDataQuery::new(store);
        let all = query.get(Category::EconomicEvents, &QueryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let from_tenth = QueryFilter {
            from: chrono::NaiveDate::from_ymd_opt(2024, 3, 10),
            ..QueryFilter::default()
        };
        let upcoming = query.get(Category::EconomicEvents, &from_tenth).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0], records[0]);
    }

    #[tokio::test]
    async fn latest_returns_newest_reading_first() {
        let store = SqliteStore::new(test_pool().await);
        let records: Vec<_> = ["2024-05-01T15:00:00Z", "2024-05-02T15:00:00Z"]
            .iter()
            .enumerate()
            .map(|(i, at)| {
                let raw = RawRecord::observed(parse_datetime(at).unwrap()).with("value", 40.0 + i as f64);
                normalize(Category::Sentiment, &raw).unwrap()
            })
            .collect();
        store.upsert(Category::Sentiment, &records).await.unwrap();

        let query = MarketDataQuery::new(store);
        let latest = query.latest(Category::Sentiment, 1).await.unwrap();
        assert_eq!(latest, vec![records[1].clone()]);
    }
}
