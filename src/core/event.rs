//! Audit events.
//!
//! Every governance action is recorded as an [`Event`]. Events are
//! persisted one JSON object per line:
//!
//! ```json
//! {"timestamp":"2026-01-02T10:00:00Z","actor":"ana","action":"task.start","metadata":{"task_id":"task-login"}}
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event actions.
pub mod actions {
    pub const PROJECT_INIT: &str = "project.init";
    pub const PLAN_GENERATE: &str = "plan.generate";
    pub const PLAN_APPROVE: &str = "plan.approve";
    pub const PLAN_REJECT: &str = "plan.reject";
    pub const PLAN_PRUNE: &str = "plan.prune";
    pub const POLICY_UPDATE: &str = "policy.update";
    pub const TIME_LOG: &str = "time.log";
    pub const AI_USAGE: &str = "ai.usage";

    pub const TASK_START: &str = "task.start";
    pub const TASK_BLOCK: &str = "task.block";
    pub const TASK_UNBLOCK: &str = "task.unblock";
    pub const TASK_COMPLETE: &str = "task.complete";
    pub const TASK_STOP: &str = "task.stop";
    pub const TASK_REOPEN: &str = "task.reopen";
    pub const TASK_VERIFY: &str = "task.verify";
}

/// Metadata keys shared by task events.
pub mod keys {
    pub const TASK_ID: &str = "task_id";
    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const OWNER: &str = "owner";
    pub const EVIDENCE: &str = "evidence";
    pub const HOURS: &str = "hours";
    pub const NOTE: &str = "note";
    pub const TOKENS: &str = "tokens";
    pub const PLAN_ID: &str = "plan_id";
    pub const SOURCE: &str = "source";
}

/// A single immutable journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Set by the journal at append time when absent
    pub timestamp: Option<DateTime<Utc>>,

    pub actor: String,

    pub action: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Event {
    /// Create an event without a timestamp.
    pub fn new(actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self { timestamp: None, actor: actor.into(), action: action.into(), metadata: BTreeMap::new() }
    }

    /// Attach a metadata entry (builder style).
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Pin the timestamp (builder style).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// String metadata value.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Numeric metadata value.
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }

    /// Task this event refers to, if any.
    pub fn task_id(&self) -> Option<&str> {
        self.meta_str(keys::TASK_ID)
    }

    /// Whether the action records a task completion.
    pub fn is_completion(&self) -> bool {
        self.action == actions::TASK_COMPLETE || self.action == actions::TASK_VERIFY
    }
}
