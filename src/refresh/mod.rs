//! Refresh pipeline: each source unit runs fetch → normalize → upsert in its own
//! task; the orchestrator collects a per-category report.

pub mod orchestrator;
pub mod report;
pub mod scheduler;

pub use orchestrator::RefreshOrchestrator;
pub use report::{RefreshReport, UnitState};
pub use scheduler::RefreshScheduler;
