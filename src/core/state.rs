//! Execution state: the current lifecycle status of every task in a plan.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Blocked,
    InProgress,
    Done,
    Verified,
}

impl TaskStatus {
    /// Whether this status satisfies a dependency.
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Done | Self::Verified)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Verified => "verified",
        }
    }

    pub const ALL: [Self; 5] =
        [Self::Pending, Self::Blocked, Self::InProgress, Self::Done, Self::Verified];
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status '{s}'"))
    }
}

/// Lifecycle events that move a task between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskEvent {
    Start,
    Block,
    Unblock,
    Complete,
    Stop,
    Reopen,
    Verify,
}

impl TaskEvent {
    pub const ALL: [Self; 7] = [
        Self::Start,
        Self::Block,
        Self::Unblock,
        Self::Complete,
        Self::Stop,
        Self::Reopen,
        Self::Verify,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::Complete => "complete",
            Self::Stop => "stop",
            Self::Reopen => "reopen",
            Self::Verify => "verify",
        }
    }

    /// The status this event moves a task into.
    pub fn target(self) -> TaskStatus {
        match self {
            Self::Start | Self::Reopen => TaskStatus::InProgress,
            Self::Block => TaskStatus::Blocked,
            Self::Unblock | Self::Stop => TaskStatus::Pending,
            Self::Complete => TaskStatus::Done,
            Self::Verify => TaskStatus::Verified,
        }
    }

    /// Journal action recorded for this event.
    pub fn action(self) -> &'static str {
        use super::event::actions;
        match self {
            Self::Start => actions::TASK_START,
            Self::Block => actions::TASK_BLOCK,
            Self::Unblock => actions::TASK_UNBLOCK,
            Self::Complete => actions::TASK_COMPLETE,
            Self::Stop => actions::TASK_STOP,
            Self::Reopen => actions::TASK_REOPEN,
            Self::Verify => actions::TASK_VERIFY,
        }
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("unknown task event '{s}'"))
    }
}

/// Recorded outcome for a single task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,

    /// Who started the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Evidence supplied on verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Task results for one plan, keyed by task id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Plan these results belong to
    pub plan_id: String,

    #[serde(default)]
    task_states: BTreeMap<String, TaskResult>,
}

impl ExecutionState {
    /// Create an empty state for a plan.
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self { plan_id: plan_id.into(), task_states: BTreeMap::new() }
    }

    /// Result for a task, if one has been recorded.
    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.task_states.get(task_id)
    }

    /// Status for a task; missing entries read as `Pending`.
    pub fn status_of(&self, task_id: &str) -> TaskStatus {
        self.get(task_id).map(|r| r.status).unwrap_or_default()
    }

    /// All recorded results, ordered by task id.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &TaskResult)> {
        self.task_states.iter().map(|(id, result)| (id.as_str(), result))
    }

    pub fn len(&self) -> usize {
        self.task_states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_states.is_empty()
    }

    /// Number of tasks currently in the given status.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.task_states.values().filter(|r| r.status == status).count()
    }

    pub fn in_progress(&self) -> usize {
        self.count(TaskStatus::InProgress)
    }

    /// Replace the result for a task. Only the coordinator writes results.
    pub(crate) fn put(&mut self, task_id: impl Into<String>, result: TaskResult) {
        self.task_states.insert(task_id.into(), result);
    }
}
