//! Persistence for Charter projects.
//!
//! The engine never touches files directly; it goes through a [`Repository`].
//!
//! - [`FileRepository`] - YAML/JSON snapshots and a JSONL event log under `.charter/`
//! - [`MemoryRepository`] - in-process storage with failure injection for tests

mod fs;
mod memory;

pub use fs::FileRepository;
pub use memory::{FailPoint, MemoryRepository};

use crate::core::{Event, ExecutionState, Plan, PolicyConfig, Resource, Spec, StorageError};

/// Result type for repository calls.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage backend for a single project.
///
/// `load_*` returns [`StorageError::NotFound`] when nothing has been saved,
/// distinct from IO or parse failures. `save_*` and `append_event` must not
/// return before the data is durably written.
pub trait Repository {
    fn load_spec(&self) -> StorageResult<Spec>;
    fn save_spec(&self, spec: &Spec) -> StorageResult<()>;

    fn load_plan(&self) -> StorageResult<Plan>;
    fn save_plan(&self, plan: &Plan) -> StorageResult<()>;

    fn load_state(&self) -> StorageResult<ExecutionState>;
    fn save_state(&self, state: &ExecutionState) -> StorageResult<()>;

    fn load_policy(&self) -> StorageResult<PolicyConfig>;
    fn save_policy(&self, policy: &PolicyConfig) -> StorageResult<()>;

    /// All events in append order. An empty log is not an error.
    fn load_events(&self) -> StorageResult<Vec<Event>>;
    fn append_event(&self, event: &Event) -> StorageResult<()>;

    /// Delete a stored snapshot so the next load is `NotFound`.
    ///
    /// Removing an absent snapshot succeeds. The event log cannot be removed.
    fn remove(&self, resource: Resource) -> StorageResult<()>;
}

/// Convert a `NotFound` into `None`, passing other errors through.
pub fn optional<T>(result: StorageResult<T>) -> StorageResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
