use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::config::Config;
use crate::refresh::RefreshOrchestrator;

/// Triggers [`RefreshOrchestrator::run_all`] on a fixed interval. Runs for the
/// life of the process.
pub struct RefreshScheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    interval_secs: u64,
    run_on_startup: bool,
}

impl RefreshScheduler {
    pub fn new(cfg: &Config, orchestrator: Arc<RefreshOrchestrator>) -> Self {
        Self {
            orchestrator,
            interval_secs: cfg.refresh_interval_secs.max(1),
            run_on_startup: cfg.refresh_on_startup,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.run_on_startup {
            ticker.tick().await; // consume the immediate first tick
        }
        info!(interval_secs = self.interval_secs, "Refresh scheduler started");

        loop {
            ticker.tick().await;
            // Failures are recorded per category inside the report.
            self.orchestrator.run_all().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::api::health::HealthState;
    use crate::api::latency::SourceLatency;
    use crate::db::SqliteStore;
    use crate::error::FetchError;
    use crate::fetcher::SourceClient;
    use crate::types::{Category, RawRecord};

    /// Fails at fetch, so a run never touches the store.
    struct Unreachable;

    #[async_trait]
    impl SourceClient for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn category(&self) -> Category {
            Category::Sentiment
        }

        async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
            Err(FetchError::Blocked { source_id: "unreachable", status: 503 })
        }
    }

    fn spawn_scheduler(run_on_startup: bool) -> (Arc<RefreshOrchestrator>, Arc<HealthState>) {
        let pool = SqlitePoolOptions::new().connect_lazy("sqlite::memory:").unwrap();
        let health = Arc::new(HealthState::new());
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            vec![Arc::new(Unreachable)],
            SqliteStore::new(pool),
            Arc::new(SourceLatency::new()),
            Arc::clone(&health),
        ));
        let cfg = Config {
            refresh_interval_secs: 60,
            refresh_on_startup: run_on_startup,
            ..Config::for_tests()
        };
        let scheduler = RefreshScheduler::new(&cfg, Arc::clone(&orchestrator));
        tokio::spawn(scheduler.run());
        (orchestrator, health)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_startup_then_every_interval() {
        let (orchestrator, health) = spawn_scheduler(true);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(health.refresh_runs(), 1);
        let report = orchestrator.last_report().await.unwrap();
        assert_eq!(report.failed(), 1);
        assert!(report.categories.contains_key(&Category::Sentiment));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(health.refresh_runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn startup_run_can_be_skipped() {
        let (orchestrator, health) = spawn_scheduler(false);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(health.refresh_runs(), 0);
        assert!(orchestrator.last_report().await.is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(health.refresh_runs(), 1);
    }
}
