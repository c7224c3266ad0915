//! Risk engine crate.
//!
//! Forecasts daily demand, scores residuals against a trailing window,
//! classifies risk, and advances the persisted cursor one day per run.

pub mod anomaly;
pub mod classifier;
pub mod forecast;
pub mod pipeline;
pub mod query;
pub mod scheduler;

pub use classifier::{anomaly_flag, assign_composite_tier, assign_tier};
pub use pipeline::enrich;
pub use query::{RiskQuery, RiskSummary};
pub use scheduler::{RunOutcome, RunReport, Scheduler, SchedulerState};
