#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]

//! # Charter
//!
//! Spec-driven plan execution and governance for software projects.
//!
//! Charter turns a declarative spec (features and requirements) into a plan
//! of tasks, moves those tasks through a guarded lifecycle, enforces policy
//! on that movement, and records every change in an append-only journal.
//!
//! ## Features
//!
//! - **Dependency graph**: cycle detection and unlock checks
//! - **Lifecycle**: a closed table of task transitions
//! - **Policy**: WIP limits, AI token quotas, time budgets
//! - **Audit journal**: one JSON event per line, never rewritten
//! - **Drift**: spec vs. plan divergence
//! - **Forecasts**: velocity, trend, and burndown from the journal
//!
//! ## Quick Start
//!
//! ```bash
//! charter init "My Project"
//! charter plan generate
//! charter task start task-core-setup
//! charter forecast
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::use_self)]

pub mod ai;
pub mod core;
pub mod engine;
pub mod storage;

// Re-export commonly used types
pub use crate::core::{CharterError, Config, ErrorKind, Result};
pub use engine::{Coordinator, CoordinatorOptions};
pub use storage::{FileRepository, MemoryRepository, Repository};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "charter";
