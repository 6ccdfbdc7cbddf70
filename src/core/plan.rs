//! Plans and tasks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task priority, ordered from low to high.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Approval status of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// A unit of work derived from the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the plan
    pub id: String,

    /// Owning feature
    pub feature_id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    /// Opaque effort estimate
    #[serde(default)]
    pub estimate: String,

    /// Tasks that must be complete before this one can start
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, feature_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            feature_id: feature_id.into(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            estimate: String::new(),
            depends_on: Vec::new(),
        }
    }

    /// Add a dependency (builder style). Duplicates are ignored.
    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if !self.depends_on.contains(&task_id) {
            self.depends_on.push(task_id);
        }
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// The ordered set of tasks derived from a spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier
    pub id: String,

    /// Spec this plan was generated from
    pub spec_id: String,

    /// Fingerprint of the spec at generation time
    #[serde(default)]
    pub spec_fingerprint: String,

    #[serde(default)]
    pub approval: ApprovalStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Plan {
    /// Create a new pending plan with a fresh identifier.
    pub fn new(spec_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            id: format!("plan-{}", uuid::Uuid::new_v4()),
            spec_id: spec_id.into(),
            spec_fingerprint: String::new(),
            approval: ApprovalStatus::Pending,
            created_at: Utc::now(),
            tasks,
        }
    }

    /// Find a task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.task(id).is_some()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
