//! Plan execution and governance engine.
//!
//! - [`graph`] - dependency validation and unlock queries
//! - [`machine`] - the task lifecycle table
//! - [`policy`] - WIP, AI quota and budget rules
//! - [`journal`] - the append-only event log
//! - [`drift`] - spec/plan divergence
//! - [`forecast`] - velocity and completion estimates
//! - [`planning`] - deterministic spec decomposition
//! - [`coordinator`] - ties the above together; the only writer of state

pub mod coordinator;
pub mod drift;
pub mod forecast;
pub mod graph;
pub mod journal;
pub mod machine;
pub mod planning;
pub mod policy;

pub use coordinator::{Clock, Coordinator, CoordinatorOptions, StatusReport, TaskLine, TransitionOutcome};
pub use drift::{DriftIssue, DriftKind, DriftReport, Severity};
pub use forecast::{
    BurndownPoint, ConfidenceInterval, ForecastResult, TrendDirection, VelocityTrend, WindowVelocity,
};
pub use graph::DependencyGraph;
pub use journal::Journal;
pub use planning::PruneOutcome;
pub use policy::{AiOperation, PolicyEngine, ProposedAction};
