//! Core types for Charter.
//!
//! This module contains the data model shared by every component: specs,
//! plans, execution state, journal events, policy settings, configuration,
//! and errors.

mod config;
mod error;
pub mod event;
mod plan;
mod policy;
mod spec;
mod state;

pub use config::{
    AiConfig, Config, ForecastConfig, GeneralConfig, GovernanceConfig, PROJECT_DIR,
};
pub use error::{CharterError, ErrorKind, Resource, Result, StorageError, TransitionError};
pub use event::Event;
pub use plan::{ApprovalStatus, Plan, Priority, Task};
pub use policy::{PolicyConfig, PolicyRule, UsageSnapshot, Violation, ViolationLevel};
pub use spec::{is_valid_id, task_key, ExpectedTask, Feature, Requirement, Spec, TASK_PREFIX};
pub use state::{ExecutionState, TaskEvent, TaskResult, TaskStatus};
