//! In-memory repository.

use parking_lot::Mutex;

use super::{Repository, StorageResult};
use crate::core::{Event, ExecutionState, Plan, PolicyConfig, Resource, Spec, StorageError};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    SaveState,
    SavePlan,
    AppendEvent,
}

#[derive(Debug, Default)]
struct Inner {
    spec: Option<Spec>,
    plan: Option<Plan>,
    state: Option<ExecutionState>,
    policy: Option<PolicyConfig>,
    events: Vec<Event>,
    failing: Vec<FailPoint>,
    state_saves: usize,
}

/// Repository that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository seeded with a spec.
    pub fn with_spec(spec: Spec) -> Self {
        let repo = Self::new();
        repo.inner.lock().spec = Some(spec);
        repo
    }

    /// Make an operation fail until [`heal`](Self::heal) is called.
    pub fn fail_on(&self, point: FailPoint) {
        let mut inner = self.inner.lock();
        if !inner.failing.contains(&point) {
            inner.failing.push(point);
        }
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        self.inner.lock().failing.clear();
    }

    /// Number of successful state saves.
    pub fn state_saves(&self) -> usize {
        self.inner.lock().state_saves
    }

    fn check(inner: &Inner, point: FailPoint) -> StorageResult<()> {
        if inner.failing.contains(&point) {
            return Err(StorageError::Unavailable(format!("injected failure: {point:?}")));
        }
        Ok(())
    }
}

impl Repository for MemoryRepository {
    fn load_spec(&self) -> StorageResult<Spec> {
        self.inner.lock().spec.clone().ok_or(StorageError::NotFound(Resource::Spec))
    }

    fn save_spec(&self, spec: &Spec) -> StorageResult<()> {
        self.inner.lock().spec = Some(spec.clone());
        Ok(())
    }

    fn load_plan(&self) -> StorageResult<Plan> {
        self.inner.lock().plan.clone().ok_or(StorageError::NotFound(Resource::Plan))
    }

    fn save_plan(&self, plan: &Plan) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, FailPoint::SavePlan)?;
        inner.plan = Some(plan.clone());
        Ok(())
    }

    fn load_state(&self) -> StorageResult<ExecutionState> {
        self.inner.lock().state.clone().ok_or(StorageError::NotFound(Resource::State))
    }

    fn save_state(&self, state: &ExecutionState) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, FailPoint::SaveState)?;
        inner.state = Some(state.clone());
        inner.state_saves += 1;
        Ok(())
    }

    fn load_policy(&self) -> StorageResult<PolicyConfig> {
        self.inner.lock().policy.clone().ok_or(StorageError::NotFound(Resource::Policy))
    }

    fn save_policy(&self, policy: &PolicyConfig) -> StorageResult<()> {
        self.inner.lock().policy = Some(policy.clone());
        Ok(())
    }

    fn load_events(&self) -> StorageResult<Vec<Event>> {
        Ok(self.inner.lock().events.clone())
    }

    fn append_event(&self, event: &Event) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, FailPoint::AppendEvent)?;
        inner.events.push(event.clone());
        Ok(())
    }

    fn remove(&self, resource: Resource) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        match resource {
            Resource::Spec => inner.spec = None,
            Resource::Plan => inner.plan = None,
            Resource::State => inner.state = None,
            Resource::Policy => inner.policy = None,
            Resource::Events => {
                return Err(StorageError::Unavailable("the event log is append-only".to_string()));
            }
        }
        Ok(())
    }
}
