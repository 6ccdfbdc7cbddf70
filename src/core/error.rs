//! Error types for Charter.
//!
//! Every failure carries the structured data (ids, statuses, rule ids) a
//! caller needs to build an actionable message.

use std::path::PathBuf;

use thiserror::Error;

use super::plan::ApprovalStatus;
use super::policy::PolicyRule;
use super::state::{TaskEvent, TaskStatus};

/// Result type for Charter operations.
pub type Result<T> = std::result::Result<T, CharterError>;

/// Persisted resources managed by a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Spec,
    Plan,
    State,
    Policy,
    Events,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Spec => "spec",
            Self::Plan => "plan",
            Self::State => "execution state",
            Self::Policy => "policy",
            Self::Events => "event log",
        })
    }
}

/// Errors raised by a persistence repository.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Nothing has been stored yet.
    #[error("{0} not found")]
    NotFound(Resource),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be decoded.
    #[error("Failed to parse {}{}: {message}", .path.display(), line_suffix(.line))]
    Parse { path: PathBuf, line: Option<usize>, message: String },

    #[error("Failed to serialize {resource}: {message}")]
    Serialize { resource: Resource, message: String },

    /// Injected or backend specific failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "state rolled back"
    } else {
        "state left inconsistent"
    }
}

/// Broad classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required data is missing; run a setup operation first
    Precondition,
    /// The plan or spec is structurally invalid
    Validation,
    /// A dependency, transition, or policy guard refused the operation
    Guard,
    /// The repository failed
    Persistence,
    /// An external collaborator (AI port) failed or was cancelled
    External,
}

/// Invalid state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot {event} task '{task_id}': {from} -> {attempted} is not a valid transition")]
pub struct TransitionError {
    pub task_id: String,
    pub from: TaskStatus,
    pub attempted: TaskStatus,
    pub event: TaskEvent,
}

/// Errors that can occur in Charter operations.
#[derive(Debug, Error)]
pub enum CharterError {
    /// Required resource has not been created yet.
    #[error("No {0} found")]
    Missing(Resource),

    /// The execution state belongs to a different plan.
    #[error("Execution state belongs to plan '{state_plan}', but the current plan is '{plan}'")]
    StateMismatch { plan: String, state_plan: String },

    #[error("Plan '{plan_id}' is {status}; approve it before starting work")]
    PlanNotApproved { plan_id: String, status: ApprovalStatus },

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("Duplicate identifier '{id}'")]
    DuplicateId { id: String },

    #[error("Malformed identifier '{id}'")]
    MalformedId { id: String },

    #[error("Task '{task_id}' not found in plan")]
    TaskNotFound { task_id: String },

    #[error("Task '{task_id}' is locked: dependency '{dependency}' is {status}")]
    DependencyNotSatisfied { task_id: String, dependency: String, status: TaskStatus },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Verifying task '{task_id}' requires evidence")]
    EvidenceRequired { task_id: String },

    #[error("Policy '{rule}' violated: {message}")]
    PolicyViolation { rule: PolicyRule, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The state was saved but the journal append failed.
    #[error("Journal append failed ({}): {source}", rollback_note(.rolled_back))]
    JournalAppend {
        #[source]
        source: StorageError,
        rolled_back: bool,
    },

    #[error("Plan generation failed: {0}")]
    Generation(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CharterError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Missing(_) | Self::StateMismatch { .. } | Self::PlanNotApproved { .. } => {
                ErrorKind::Precondition
            }
            Self::CyclicDependency { .. }
            | Self::UnknownDependency { .. }
            | Self::DuplicateId { .. }
            | Self::MalformedId { .. }
            | Self::InvalidInput(_) => ErrorKind::Validation,
            Self::TaskNotFound { .. }
            | Self::DependencyNotSatisfied { .. }
            | Self::Transition(_)
            | Self::EvidenceRequired { .. }
            | Self::PolicyViolation { .. } => ErrorKind::Guard,
            Self::Storage(_) | Self::JournalAppend { .. } => ErrorKind::Persistence,
            Self::Generation(_) | Self::Cancelled => ErrorKind::External,
        }
    }

    /// A short suggestion for resolving the error.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Missing(Resource::Spec) => {
                Some("Run `charter init` to create a project".to_string())
            }
            Self::Missing(Resource::Plan | Resource::State) => {
                Some("Run `charter plan generate` first".to_string())
            }
            Self::StateMismatch { .. } => {
                Some("Regenerate the plan with `charter plan generate`".to_string())
            }
            Self::PlanNotApproved { .. } => Some("Run `charter plan approve`".to_string()),
            Self::CyclicDependency { cycle } => cycle
                .first()
                .map(|id| format!("Remove one of the dependencies on the cycle through '{id}'")),
            Self::DependencyNotSatisfied { dependency, .. } => {
                Some(format!("Complete '{dependency}' first (`charter task complete {dependency}`)"))
            }
            Self::Transition(e) => Some(match e.from {
                TaskStatus::Pending => format!("Start it with `charter task start {}`", e.task_id),
                TaskStatus::Blocked => format!("Unblock it with `charter task unblock {}`", e.task_id),
                TaskStatus::InProgress => {
                    format!("Complete it with `charter task complete {}`", e.task_id)
                }
                TaskStatus::Done => {
                    format!("Verify it with `charter task verify {} --evidence ...`", e.task_id)
                }
                TaskStatus::Verified => format!("Reopen it with `charter task reopen {}`", e.task_id),
            }),
            Self::EvidenceRequired { task_id } => {
                Some(format!("Pass --evidence when verifying '{task_id}'"))
            }
            Self::PolicyViolation { rule: PolicyRule::Wip, .. } => {
                Some("Finish or stop an in-progress task, or raise max_wip".to_string())
            }
            Self::PolicyViolation { rule: PolicyRule::AiDisabled, .. } => {
                Some("Set allow_ai: true in the policy to enable AI features".to_string())
            }
            Self::PolicyViolation { rule: PolicyRule::TokenQuota, .. } => {
                Some("Raise token_limit in the policy".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_message() {
        let err = TransitionError {
            task_id: "task-a".to_string(),
            from: TaskStatus::Pending,
            attempted: TaskStatus::Done,
            event: TaskEvent::Complete,
        };
        assert_eq!(
            err.to_string(),
            "Cannot complete task 'task-a': pending -> done is not a valid transition"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(CharterError::Missing(Resource::Plan).kind(), ErrorKind::Precondition);
        assert_eq!(
            CharterError::CyclicDependency { cycle: vec!["a".into(), "b".into(), "a".into()] }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CharterError::PolicyViolation { rule: PolicyRule::Wip, message: String::new() }.kind(),
            ErrorKind::Guard
        );
        assert_eq!(
            CharterError::Storage(StorageError::NotFound(Resource::Spec)).kind(),
            ErrorKind::Persistence
        );
        assert_eq!(CharterError::Cancelled.kind(), ErrorKind::External);
    }

    #[test]
    fn test_hints_use_structured_fields() {
        let err = CharterError::DependencyNotSatisfied {
            task_id: "task-b".to_string(),
            dependency: "task-a".to_string(),
            status: TaskStatus::InProgress,
        };
        assert!(err.hint().unwrap().contains("task-a"));
        assert!(err.to_string().contains("in_progress"));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = StorageError::Parse {
            path: PathBuf::from("events.jsonl"),
            line: Some(3),
            message: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to parse events.jsonl (line 3): bad");
    }
}
