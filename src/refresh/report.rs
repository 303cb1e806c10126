use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Category;

/// Where in a unit's pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Normalize,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Persist => "persist",
        })
    }
}

/// Progress of one source unit within the current (or last) run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Fetching,
    Normalizing,
    Persisting,
    Succeeded,
    Failed { stage: Stage, cause: String },
}

impl UnitState {
    /// The stage a unit was in when it stopped, used to attribute panics.
    pub fn stage(&self) -> Stage {
        match self {
            UnitState::Pending | UnitState::Fetching => Stage::Fetch,
            UnitState::Normalizing => Stage::Normalize,
            UnitState::Persisting | UnitState::Succeeded => Stage::Persist,
            UnitState::Failed { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub stage: Stage,
    pub message: String,
}

/// Outcome of one category's fetch → normalize → upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryOutcome {
    pub source: &'static str,
    pub fetched: usize,
    pub written: usize,
    pub dropped: usize,
    /// Dropped records by validation failure kind.
    pub drop_kinds: BTreeMap<&'static str, usize>,
    pub error: Option<UnitFailure>,
    pub duration_ms: u64,
}

impl CategoryOutcome {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            fetched: 0,
            written: 0,
            dropped: 0,
            drop_kinds: BTreeMap::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub categories: BTreeMap<Category, CategoryOutcome>,
}

impl RefreshReport {
    pub fn failed(&self) -> usize {
        self.categories.values().filter(|o| !o.is_success()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.categories.len() - self.failed()
    }

    pub fn written(&self) -> usize {
        self.categories.values().map(|o| o.written).sum()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_state_serializes_with_tag() {
        let failed = UnitState::Failed { stage: Stage::Persist, cause: "disk I/O error".to_string() };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"state": "failed", "stage": "persist", "cause": "disk I/O error"})
        );
        assert_eq!(serde_json::to_value(UnitState::Fetching).unwrap(), serde_json::json!({"state": "fetching"}));
    }

    #[test]
    fn report_keys_by_category_name() {
        let now = Utc::now();
        let mut categories = BTreeMap::new();
        categories.insert(Category::Sentiment, CategoryOutcome::new("cnn_fear_greed"));
        let report = RefreshReport { started_at: now, finished_at: now, categories };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["categories"]["sentiment"]["source"], "cnn_fear_greed");
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 0);
    }
}
