use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::SourceLatency;
use crate::db::SqliteStore;
use crate::fetcher::SourceClient;
use crate::normalizer::normalize_batch;
use crate::refresh::report::{CategoryOutcome, RefreshReport, Stage, UnitFailure, UnitState};
use crate::types::Category;

/// Runs every source unit (fetch → normalize → upsert) concurrently and reports
/// per-category outcomes. Both the scheduler and the manual trigger call
/// [`RefreshOrchestrator::run_all`].
pub struct RefreshOrchestrator {
    sources: Vec<Arc<dyn SourceClient>>,
    store: SqliteStore,
    states: Arc<DashMap<Category, UnitState>>,
    latency: Arc<SourceLatency>,
    health: Arc<HealthState>,
    last_report: RwLock<Option<RefreshReport>>,
}

impl RefreshOrchestrator {
    pub fn new(
        sources: Vec<Arc<dyn SourceClient>>,
        store: SqliteStore,
        latency: Arc<SourceLatency>,
        health: Arc<HealthState>,
    ) -> Self {
        let states = DashMap::new();
        for source in &sources {
            states.insert(source.category(), UnitState::Pending);
        }
        Self {
            sources,
            store,
            states: Arc::new(states),
            latency,
            health,
            last_report: RwLock::new(None),
        }
    }

    /// Current unit states, keyed by category.
    pub fn states(&self) -> BTreeMap<Category, UnitState> {
        self.states
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub async fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.read().await.clone()
    }

    pub async fn run_all(&self) -> RefreshReport {
        let started_at = Utc::now();

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let category = source.category();
                self.states.insert(category, UnitState::Pending);
                let handle = tokio::spawn(run_unit(
                    Arc::clone(source),
                    self.store.clone(),
                    Arc::clone(&self.states),
                ));
                (category, source.name(), handle)
            })
            .collect();

        let mut categories = BTreeMap::new();
        let joined = join_all(handles.into_iter().map(|(category, name, handle)| async move {
            (category, name, handle.await)
        }))
        .await;

        for (category, source, result) in joined {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let stage = self.states.get(&category).map(|s| s.stage()).unwrap_or(Stage::Fetch);
                    let message = format!("unit aborted: {join_err}");
                    error!(%category, source, %stage, "Refresh unit panicked");
                    self.states.insert(category, UnitState::Failed { stage, cause: message.clone() });
                    CategoryOutcome { error: Some(UnitFailure { stage, message }), ..CategoryOutcome::new(source) }
                }
            };
            self.latency.record(source, std::time::Duration::from_millis(outcome.duration_ms));
            log_outcome(category, &outcome);
            categories.insert(category, outcome);
        }

        let report = RefreshReport { started_at, finished_at: Utc::now(), categories };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            written = report.written(),
            duration_ms = report.duration_ms(),
            "Refresh run complete: {} ok, {} failed, {} rows written",
            report.succeeded(),
            report.failed(),
            report.written(),
        );

        self.health.record_refresh(&report);
        *self.last_report.write().await = Some(report.clone());
        report
    }
}

/// One source's pipeline. Every stage transition is published to `states`;
/// errors end the unit and are returned inside the outcome, never propagated.
async fn run_unit(
    source: Arc<dyn SourceClient>,
    store: SqliteStore,
    states: Arc<DashMap<Category, UnitState>>,
) -> CategoryOutcome {
    let category = source.category();
    let start = Instant::now();
    let mut outcome = CategoryOutcome::new(source.name());

    let fail = |outcome: &mut CategoryOutcome, stage: Stage, message: String| {
        states.insert(category, UnitState::Failed { stage, cause: message.clone() });
        outcome.error = Some(UnitFailure { stage, message });
    };

    states.insert(category, UnitState::Fetching);
    match source.fetch().await {
        Ok(raws) => {
            outcome.fetched = raws.len();

            states.insert(category, UnitState::Normalizing);
            let batch = normalize_batch(category, &raws);
            outcome.dropped = batch.dropped;
            outcome.drop_kinds = batch.drop_kinds;

            states.insert(category, UnitState::Persisting);
            match store.upsert(category, &batch.records).await {
                Ok(written) => {
                    outcome.written = written;
                    states.insert(category, UnitState::Succeeded);
                }
                Err(e) => fail(&mut outcome, Stage::Persist, e.to_string()),
            }
        }
        Err(e) => fail(&mut outcome, Stage::Fetch, e.to_string()),
    }

    outcome.duration_ms = start.elapsed().as_millis() as u64;
    outcome
}

fn log_outcome(category: Category, o: &CategoryOutcome) {
    match &o.error {
        None if o.dropped > 0 => warn!(
            %category,
            source = o.source,
            fetched = o.fetched,
            written = o.written,
            dropped = o.dropped,
            drop_kinds = ?o.drop_kinds,
            duration_ms = o.duration_ms,
            "{category}: {} written, {} dropped",
            o.written,
            o.dropped,
        ),
        None => info!(
            %category,
            source = o.source,
            fetched = o.fetched,
            written = o.written,
            duration_ms = o.duration_ms,
            "{category}: {} written",
            o.written,
        ),
        Some(failure) => error!(
            %category,
            source = o.source,
            stage = %failure.stage,
            duration_ms = o.duration_ms,
            "{category}: failed during {}: {}",
            failure.stage,
            failure.message,
        ),
    }
}
