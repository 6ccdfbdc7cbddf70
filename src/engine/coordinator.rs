//! Plan execution coordinator.
//!
//! The only component that mutates execution state. Every state-changing
//! operation runs in the same order:
//!
//! 1. load the snapshot it needs
//! 2. check guards (task exists, state matches plan, approval, dependencies, policy)
//! 3. compute the new value
//! 4. save it
//! 5. append the journal event
//!
//! If step 5 fails the previous snapshot is written back and the whole
//! operation fails with [`CharterError::JournalAppend`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::drift::{self, DriftReport};
use super::forecast::{self, ForecastResult};
use super::graph::{self, DependencyGraph};
use super::journal::Journal;
use super::machine::{self, TransitionContext};
use super::planning::{self, PruneOutcome};
use super::policy::{usage_from_events, AiOperation, PolicyEngine, ProposedAction};
use crate::ai::PlanGenerationPort;
use crate::core::{
    event::{actions, keys},
    ApprovalStatus, CharterError, Config, Event, ExecutionState, ForecastConfig, Plan,
    PolicyConfig, Resource, Result, Spec, StorageError, Task, TaskEvent, TaskStatus,
    UsageSnapshot, Violation,
};
use crate::storage::{optional, Repository, StorageResult};

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Per-invocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorOptions {
    /// Recorded on every event
    pub actor: String,

    /// Refuse `start` until the plan is approved
    pub require_approved_plan: bool,

    pub forecast: ForecastConfig,
}

impl CoordinatorOptions {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            require_approved_plan: false,
            forecast: ForecastConfig::default(),
        }
    }

    /// Fold loaded configuration and an optional actor override.
    pub fn from_config(config: &Config, actor: Option<String>) -> Self {
        Self {
            actor: actor.unwrap_or_else(|| config.actor()),
            require_approved_plan: config.governance.require_approved_plan,
            forecast: config.forecast.clone(),
        }
    }
}

/// Outcome of a successful transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
    /// Non-blocking policy findings
    pub warnings: Vec<Violation>,
}

/// One row of [`Coordinator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskLine {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub owner: Option<String>,
    /// Every dependency is complete
    pub unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub plan_id: String,
    pub approval: ApprovalStatus,
    pub tasks: Vec<TaskLine>,
}

impl StatusReport {
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// Orchestrates the engine over a repository.
pub struct Coordinator<R: Repository> {
    repo: R,
    options: CoordinatorOptions,
    clock: Clock,
}

impl<R: Repository + fmt::Debug> fmt::Debug for Coordinator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("repo", &self.repo)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Map a storage `NotFound` to the precondition error for that resource.
fn required<T>(result: StorageResult<T>) -> Result<T> {
    result.map_err(|e| match e {
        StorageError::NotFound(resource) => CharterError::Missing(resource),
        other => CharterError::Storage(other),
    })
}

impl<R: Repository> Coordinator<R> {
    pub fn new(repo: R, options: CoordinatorOptions) -> Self {
        Self { repo, options, clock: Arc::new(Utc::now) }
    }

    /// Replace the clock (builder style).
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn event(&self, action: &str) -> Event {
        Event::new(&self.options.actor, action)
    }

    fn journal(&self) -> Journal<'_, R> {
        Journal::new(&self.repo)
    }

    /// Append an event, undoing the preceding save if the append fails.
    fn record(&self, event: Event, rollback: impl FnOnce() -> StorageResult<()>) -> Result<Event> {
        match self.journal().append(event, self.now()) {
            Ok(event) => Ok(event),
            Err(source) => {
                let rolled_back = match rollback() {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "rollback after failed journal append also failed");
                        false
                    }
                };
                tracing::warn!(error = %source, rolled_back, "journal append failed");
                Err(CharterError::JournalAppend { source, rolled_back })
            }
        }
    }

    /// Write back a snapshot taken before an operation, or remove it if
    /// there was none.
    fn restore<T>(
        &self,
        previous: Option<&T>,
        resource: Resource,
        save: impl FnOnce(&R, &T) -> StorageResult<()>,
    ) -> StorageResult<()> {
        match previous {
            Some(value) => save(&self.repo, value),
            None => self.repo.remove(resource),
        }
    }

    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    pub fn spec(&self) -> Result<Spec> {
        required(self.repo.load_spec())
    }

    pub fn plan(&self) -> Result<Plan> {
        required(self.repo.load_plan())
    }

    /// Policy from the repository, or defaults when none was saved.
    pub fn policy(&self) -> Result<PolicyConfig> {
        Ok(optional(self.repo.load_policy())?.unwrap_or_default())
    }

    pub fn events(&self) -> Result<Vec<Event>> {
        self.journal().load_all()
    }

    pub fn usage(&self) -> Result<UsageSnapshot> {
        Ok(usage_from_events(&self.events()?))
    }

    /// Plan and its state, checked to belong together.
    fn plan_and_state(&self) -> Result<(Plan, ExecutionState)> {
        let plan = self.plan()?;
        let state = required(self.repo.load_state())?;
        if state.plan_id != plan.id {
            return Err(CharterError::StateMismatch { plan: plan.id, state_plan: state.plan_id });
        }
        Ok((plan, state))
    }

    // ---------------------------------------------------------------------
    // Project and plan lifecycle
    // ---------------------------------------------------------------------

    /// Store the spec and a default policy, and journal `project.init`.
    ///
    /// Refuses to replace an existing spec unless `force` is set.
    pub fn init_project(&self, spec: &Spec, force: bool) -> Result<()> {
        let previous_spec = match optional(self.repo.load_spec()) {
            Ok(previous) => previous,
            // An unreadable spec is replaced when forced; rollback then removes ours.
            Err(e) if force => {
                tracing::warn!(error = %e, "overwriting unreadable spec");
                None
            }
            Err(e) => return Err(e.into()),
        };
        if !force && previous_spec.is_some() {
            return Err(CharterError::InvalidInput(
                "a project already exists here; pass --force to overwrite it".to_string(),
            ));
        }
        spec.validate()?;

        let previous_policy = optional(self.repo.load_policy())?;
        let write_policy = force || previous_policy.is_none();

        self.repo.save_spec(spec)?;
        if write_policy {
            if let Err(e) = self.repo.save_policy(&PolicyConfig::default()) {
                self.restore(previous_spec.as_ref(), Resource::Spec, R::save_spec)?;
                return Err(e.into());
            }
        }

        let event = self.event(actions::PROJECT_INIT).with("spec_id", spec.id.as_str());
        self.record(event, || {
            self.restore(previous_spec.as_ref(), Resource::Spec, R::save_spec)?;
            if write_policy {
                self.restore(previous_policy.as_ref(), Resource::Policy, R::save_policy)?;
            }
            Ok(())
        })?;
        tracing::info!(spec = %spec.id, "project initialized");
        Ok(())
    }

    /// Decompose the spec deterministically and install the result.
    pub fn generate_plan(&self) -> Result<Plan> {
        let spec = self.spec()?;
        let tasks = planning::decompose(&spec)?;
        self.install_plan(&spec, tasks, "spec")
    }

    /// Ask an AI port for tasks and install them.
    ///
    /// Refused up front when policy does not admit an AI call. Tokens the
    /// port reports are journaled even if the returned plan is invalid.
    pub async fn generate_plan_with_ai(
        &self,
        port: &dyn PlanGenerationPort,
        cancel: &CancellationToken,
    ) -> Result<Plan> {
        let spec = self.spec()?;
        spec.validate()?;

        let policy = self.policy()?;
        let state = optional(self.repo.load_state())?.unwrap_or_default();
        let usage = self.usage()?;
        let warnings = PolicyEngine::new(&policy).admit(
            &state,
            &usage,
            ProposedAction::AiCall(AiOperation::PlanGeneration),
        )?;
        for warning in &warnings {
            tracing::warn!(rule = %warning.rule, "{}", warning.message);
        }

        let decomposition = port.decompose_spec(&spec, cancel).await?;
        if decomposition.tokens_used > 0 {
            let usage = self
                .event(actions::AI_USAGE)
                .with(keys::TOKENS, decomposition.tokens_used)
                .with(keys::SOURCE, port.name());
            // Journal-only: nothing was saved, so there is nothing to undo.
            self.record(usage, || Ok(()))?;
        }

        self.install_plan(&spec, decomposition.tasks, port.name())
    }

    /// Validate, save the plan and a state carrying over existing results.
    fn install_plan(&self, spec: &Spec, tasks: Vec<Task>, source: &str) -> Result<Plan> {
        let mut plan = Plan::new(&spec.id, tasks);
        plan.created_at = self.now();
        plan.spec_fingerprint = spec.fingerprint();
        DependencyGraph::validate(&plan)?;

        let previous_plan = optional(self.repo.load_plan())?;
        let previous_state = optional(self.repo.load_state())?;

        let mut state = ExecutionState::new(&plan.id);
        if let Some(old) = &previous_state {
            for (task_id, result) in old.entries() {
                if plan.contains(task_id) {
                    state.put(task_id, result.clone());
                }
            }
        }

        self.repo.save_plan(&plan)?;
        if let Err(e) = self.repo.save_state(&state) {
            self.restore(previous_plan.as_ref(), Resource::Plan, R::save_plan)?;
            return Err(e.into());
        }

        let event = self
            .event(actions::PLAN_GENERATE)
            .with(keys::PLAN_ID, plan.id.as_str())
            .with(keys::SOURCE, source)
            .with("tasks", plan.len());
        self.record(event, || {
            self.restore(previous_plan.as_ref(), Resource::Plan, R::save_plan)?;
            self.restore(previous_state.as_ref(), Resource::State, R::save_state)
        })?;

        tracing::info!(plan = %plan.id, tasks = plan.len(), carried = state.len(), "plan generated");
        Ok(plan)
    }

    pub fn approve_plan(&self) -> Result<Plan> {
        self.set_approval(ApprovalStatus::Approved, actions::PLAN_APPROVE)
    }

    pub fn reject_plan(&self) -> Result<Plan> {
        self.set_approval(ApprovalStatus::Rejected, actions::PLAN_REJECT)
    }

    fn set_approval(&self, status: ApprovalStatus, action: &str) -> Result<Plan> {
        let previous = self.plan()?;
        if previous.approval == status {
            return Err(CharterError::InvalidInput(format!(
                "plan '{}' is already {status}",
                previous.id
            )));
        }
        if status == ApprovalStatus::Approved {
            DependencyGraph::validate(&previous)?;
        }

        let mut plan = previous.clone();
        plan.approval = status;
        self.repo.save_plan(&plan)?;
        self.record(self.event(action).with(keys::PLAN_ID, plan.id.as_str()), || {
            self.repo.save_plan(&previous)
        })?;

        tracing::info!(plan = %plan.id, %status, "plan approval changed");
        Ok(plan)
    }

    /// Drop tasks whose feature left the spec.
    pub fn prune_plan(&self) -> Result<PruneOutcome> {
        let spec = self.spec()?;
        let previous = self.plan()?;

        let mut plan = previous.clone();
        let outcome = planning::prune(&mut plan, &spec);
        if outcome.is_empty() {
            return Ok(outcome);
        }
        DependencyGraph::validate(&plan)?;

        self.repo.save_plan(&plan)?;
        let event = self
            .event(actions::PLAN_PRUNE)
            .with(keys::PLAN_ID, plan.id.as_str())
            .with("removed", outcome.removed.clone());
        self.record(event, || self.repo.save_plan(&previous))?;

        tracing::info!(plan = %plan.id, removed = outcome.removed.len(), "plan pruned");
        Ok(outcome)
    }

    /// Replace the policy.
    pub fn set_policy(&self, policy: &PolicyConfig) -> Result<()> {
        if !policy.budget_hours.is_finite() || policy.budget_hours < 0.0 {
            return Err(CharterError::InvalidInput(format!(
                "budget_hours must be a non-negative number, got {}",
                policy.budget_hours
            )));
        }
        let previous = optional(self.repo.load_policy())?;

        self.repo.save_policy(policy)?;
        let event = self
            .event(actions::POLICY_UPDATE)
            .with("max_wip", policy.max_wip)
            .with("allow_ai", policy.allow_ai)
            .with("token_limit", policy.token_limit)
            .with("budget_hours", policy.budget_hours);
        self.record(event, || self.restore(previous.as_ref(), Resource::Policy, R::save_policy))?;

        tracing::info!(?policy, "policy updated");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Task transitions
    // ---------------------------------------------------------------------

    /// Apply a lifecycle event to a task.
    pub fn transition(
        &self,
        task_id: &str,
        event: TaskEvent,
        evidence: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let (plan, mut state) = self.plan_and_state()?;
        let task = plan
            .task(task_id)
            .ok_or_else(|| CharterError::TaskNotFound { task_id: task_id.to_string() })?;
        let current = state.get(task_id).cloned().unwrap_or_default();

        let mut warnings = Vec::new();
        if event == TaskEvent::Start && machine::next_status(current.status, event).is_some() {
            warnings = self.admit_start(&plan, task, &state)?;
        }

        let ctx = TransitionContext { actor: &self.options.actor, now: self.now(), evidence };
        let next = machine::apply(task_id, &current, event, &ctx)?;
        let (from, to) = (current.status, next.status);

        let previous = state.clone();
        state.put(task_id, next.clone());
        self.repo.save_state(&state)?;

        let mut record = self
            .event(event.action())
            .with(keys::TASK_ID, task_id)
            .with(keys::FROM, from.as_str())
            .with(keys::TO, to.as_str());
        if event == TaskEvent::Start {
            record = record.with(keys::OWNER, self.options.actor.as_str());
        }
        if let Some(evidence) = next.evidence.as_deref().filter(|_| event == TaskEvent::Verify) {
            record = record.with(keys::EVIDENCE, evidence);
        }
        self.record(record, || self.repo.save_state(&previous))?;

        tracing::info!(task = task_id, %from, %to, "task {event}");
        Ok(TransitionOutcome { task_id: task_id.to_string(), from, to, warnings })
    }

    /// Guards that only apply to `start`.
    fn admit_start(&self, plan: &Plan, task: &Task, state: &ExecutionState) -> Result<Vec<Violation>> {
        if self.options.require_approved_plan && plan.approval != ApprovalStatus::Approved {
            return Err(CharterError::PlanNotApproved {
                plan_id: plan.id.clone(),
                status: plan.approval,
            });
        }

        if let Some((dependency, status)) = graph::first_unmet(task, state) {
            tracing::debug!(task = %task.id, dependency, %status, "start refused: locked");
            return Err(CharterError::DependencyNotSatisfied {
                task_id: task.id.clone(),
                dependency: dependency.to_string(),
                status,
            });
        }

        let policy = self.policy()?;
        let usage = self.usage()?;
        PolicyEngine::new(&policy).admit(
            state,
            &usage,
            ProposedAction::StartTask { task_id: &task.id, plan: Some(plan) },
        )
    }

    pub fn start(&self, task_id: &str) -> Result<TransitionOutcome> {
        self.transition(task_id, TaskEvent::Start, None)
    }

    pub fn block(&self, task_id: &str) -> Result<TransitionOutcome> {
        self.transition(task_id, TaskEvent::Block, None)
    }

    pub fn unblock(&self, task_id: &str) -> Result<TransitionOutcome> {
        self.transition(task_id, TaskEvent::Unblock, None)
    }

    pub fn complete(&self, task_id: &str) -> Result<TransitionOutcome> {
        self.transition(task_id, TaskEvent::Complete, None)
    }

    pub fn stop(&self, task_id: &str) -> Result<TransitionOutcome> {
        self.transition(task_id, TaskEvent::Stop, None)
    }

    pub fn reopen(&self, task_id: &str) -> Result<TransitionOutcome> {
        self.transition(task_id, TaskEvent::Reopen, None)
    }

    pub fn verify(&self, task_id: &str, evidence: &str) -> Result<TransitionOutcome> {
        self.transition(task_id, TaskEvent::Verify, Some(evidence))
    }

    // ---------------------------------------------------------------------
    // Usage
    // ---------------------------------------------------------------------

    /// Journal hours spent, optionally against a task.
    ///
    /// Returns the policy findings after logging.
    pub fn log_time(&self, task_id: Option<&str>, hours: f64, note: Option<&str>) -> Result<Vec<Violation>> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(CharterError::InvalidInput(format!("hours must be positive, got {hours}")));
        }

        let mut event = self.event(actions::TIME_LOG).with(keys::HOURS, hours);
        if let Some(task_id) = task_id {
            if !self.plan()?.contains(task_id) {
                return Err(CharterError::TaskNotFound { task_id: task_id.to_string() });
            }
            event = event.with(keys::TASK_ID, task_id);
        }
        if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
            event = event.with(keys::NOTE, note);
        }
        // Journal-only: hours live in the journal, never in a snapshot.
        self.record(event, || Ok(()))?;

        tracing::info!(hours, task = ?task_id, "time logged");
        let policy = self.policy()?;
        Ok(PolicyEngine::new(&policy).check_compliance(None, None, &self.usage()?))
    }

    // ---------------------------------------------------------------------
    // Read-only queries
    // ---------------------------------------------------------------------

    /// Every policy finding for the current snapshot. Never blocks.
    pub fn check_compliance(&self) -> Result<Vec<Violation>> {
        let policy = self.policy()?;
        let plan = optional(self.repo.load_plan())?;
        let state = optional(self.repo.load_state())?;
        let usage = self.usage()?;
        Ok(PolicyEngine::new(&policy).check_compliance(plan.as_ref(), state.as_ref(), &usage))
    }

    pub fn detect_drift(&self) -> Result<DriftReport> {
        let spec = self.spec()?;
        let plan = self.plan()?;
        let state = optional(self.repo.load_state())?;
        Ok(drift::detect(&spec, &plan, state.as_ref()))
    }

    /// Forecast as of `today`, or the clock's current day.
    pub fn forecast(&self, today: Option<NaiveDate>) -> Result<ForecastResult> {
        let plan = self.plan()?;
        let state = optional(self.repo.load_state())?
            .filter(|s| s.plan_id == plan.id)
            .unwrap_or_else(|| ExecutionState::new(&plan.id));
        let events = self.events()?;
        let today = today.unwrap_or_else(|| self.now().date_naive());
        Ok(forecast::calculate(&events, &plan, &state, today, &self.options.forecast))
    }

    pub fn timeline(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        self.journal().timeline(limit)
    }

    pub fn events_for_task(&self, task_id: &str) -> Result<Vec<Event>> {
        self.journal().events_for_task(task_id)
    }

    /// Check the plan graph, returning task ids in dependency order.
    pub fn validate_graph(&self) -> Result<Vec<String>> {
        let plan = self.plan()?;
        let graph = DependencyGraph::validate(&plan)?;
        Ok(graph.topological_order().into_iter().map(|t| t.id.clone()).collect())
    }

    /// Pending tasks whose dependencies are all complete, in plan order.
    pub fn ready_tasks(&self) -> Result<Vec<Task>> {
        let (plan, state) = self.plan_and_state()?;
        Ok(plan
            .tasks
            .iter()
            .filter(|t| state.status_of(&t.id) == TaskStatus::Pending && graph::is_unlocked(t, &state))
            .cloned()
            .collect())
    }

    pub fn status(&self) -> Result<StatusReport> {
        let (plan, state) = self.plan_and_state()?;
        let tasks = plan
            .tasks
            .iter()
            .map(|t| TaskLine {
                task_id: t.id.clone(),
                title: t.title.clone(),
                status: state.status_of(&t.id),
                owner: state.get(&t.id).and_then(|r| r.owner.clone()),
                unlocked: graph::is_unlocked(t, &state),
            })
            .collect();
        Ok(StatusReport { plan_id: plan.id, approval: plan.approval, tasks })
    }
}
