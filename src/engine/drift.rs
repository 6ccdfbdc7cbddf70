//! Spec/plan drift detection.
//!
//! The expected task set is recomputed from the spec on every call and
//! diffed against the plan. Drift is never an error; the report may be empty.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::core::{ExecutionState, Plan, Spec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftKind {
    /// A spec item has no task
    MissingTask,
    /// A task's feature is not in the spec
    OrphanTask,
    /// A task matches a requirement but names another feature
    MismatchedFeature,
    /// A state entry has no task in the plan
    OrphanState,
}

impl DriftKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingTask => "missing-task",
            Self::OrphanTask => "orphan-task",
            Self::MismatchedFeature => "mismatched-feature",
            Self::OrphanState => "orphan-state",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::MissingTask | Self::OrphanTask => Severity::Medium,
            Self::MismatchedFeature | Self::OrphanState => Severity::Low,
        }
    }
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftIssue {
    pub severity: Severity,
    pub kind: DriftKind,
    pub message: String,
    /// Ids involved: task, requirement or feature
    pub related: Vec<String>,
}

impl DriftIssue {
    fn new(kind: DriftKind, message: String, related: Vec<String>) -> Self {
        Self { severity: kind.severity(), kind, message, related }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub issues: Vec<DriftIssue>,
    /// The spec changed since the plan was generated
    pub spec_changed: bool,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && !self.spec_changed
    }

    pub fn count(&self, kind: DriftKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

/// Compare a plan (and optionally its state) against the spec.
///
/// Issues are ordered: missing tasks in spec order, then task issues in
/// plan order, then orphaned state entries.
pub fn detect(spec: &Spec, plan: &Plan, state: Option<&ExecutionState>) -> DriftReport {
    let mut issues = Vec::new();
    let expected = spec.expected_tasks();

    for item in &expected {
        if !plan.contains(&item.task_id) {
            issues.push(DriftIssue::new(
                DriftKind::MissingTask,
                format!(
                    "'{}' in feature '{}' has no task '{}'",
                    item.source_id, item.feature_id, item.task_id
                ),
                vec![item.source_id.clone(), item.task_id.clone(), item.feature_id.clone()],
            ));
        }
    }

    let expected_feature: HashMap<&str, &str> =
        expected.iter().map(|e| (e.task_id.as_str(), e.feature_id.as_str())).collect();

    for task in &plan.tasks {
        if !spec.has_feature(&task.feature_id) {
            issues.push(DriftIssue::new(
                DriftKind::OrphanTask,
                format!("task '{}' belongs to unknown feature '{}'", task.id, task.feature_id),
                vec![task.id.clone(), task.feature_id.clone()],
            ));
            continue;
        }
        if let Some(&feature) = expected_feature.get(task.id.as_str()) {
            if feature != task.feature_id {
                issues.push(DriftIssue::new(
                    DriftKind::MismatchedFeature,
                    format!(
                        "task '{}' is filed under '{}' but the spec places it in '{feature}'",
                        task.id, task.feature_id
                    ),
                    vec![task.id.clone(), task.feature_id.clone(), feature.to_string()],
                ));
            }
        }
    }

    if let Some(state) = state {
        for (task_id, _) in state.entries() {
            if !plan.contains(task_id) {
                issues.push(DriftIssue::new(
                    DriftKind::OrphanState,
                    format!("state records '{task_id}' which is not in the plan"),
                    vec![task_id.to_string()],
                ));
            }
        }
    }

    let spec_changed =
        !plan.spec_fingerprint.is_empty() && plan.spec_fingerprint != spec.fingerprint();

    if !issues.is_empty() || spec_changed {
        tracing::warn!(issues = issues.len(), spec_changed, "drift detected");
    }

    DriftReport { issues, spec_changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Feature, Requirement, Task, TaskResult};
    use crate::engine::planning;

    fn spec() -> Spec {
        Spec::new("shop", "Shop")
            .with_feature(
                Feature::new("auth", "Auth")
                    .with_requirement(Requirement::new("login", "Login"))
                    .with_requirement(Requirement::new("logout", "Logout")),
            )
            .with_feature(Feature::new("cart", "Cart"))
    }

    fn generated(spec: &Spec) -> Plan {
        let mut plan = Plan::new(&spec.id, planning::decompose(spec).unwrap());
        plan.spec_fingerprint = spec.fingerprint();
        plan
    }

    #[test]
    fn test_generated_plan_has_no_drift() {
        let spec = spec();
        let report = detect(&spec, &generated(&spec), None);
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn test_deleted_task_is_one_missing_task() {
        let spec = spec();
        let mut plan = generated(&spec);
        plan.tasks.retain(|t| t.id != "task-logout");

        let report = detect(&spec, &plan, None);
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.kind, DriftKind::MissingTask);
        assert_eq!(issue.severity, Severity::Medium);
        assert!(issue.related.iter().any(|r| r == "logout"));
    }

    #[test]
    fn test_orphan_task() {
        let spec = spec();
        let mut plan = generated(&spec);
        plan.tasks.push(Task::new("task-pay", "billing", "Pay"));

        let report = detect(&spec, &plan, None);
        assert_eq!(report.count(DriftKind::OrphanTask), 1);
        assert_eq!(report.issues[0].related, vec!["task-pay", "billing"]);
    }

    #[test]
    fn test_mismatched_feature() {
        let spec = spec();
        let mut plan = generated(&spec);
        plan.tasks[0].feature_id = "cart".to_string();

        let report = detect(&spec, &plan, None);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, DriftKind::MismatchedFeature);
        assert_eq!(report.max_severity(), Some(Severity::Low));
    }

    #[test]
    fn test_orphan_state_entry() {
        let spec = spec();
        let plan = generated(&spec);
        let mut state = ExecutionState::new(&plan.id);
        state.put("task-gone", TaskResult::default());

        let report = detect(&spec, &plan, Some(&state));
        assert_eq!(report.count(DriftKind::OrphanState), 1);
    }

    #[test]
    fn test_spec_edit_flags_fingerprint() {
        let spec = spec();
        let plan = generated(&spec);
        let mut edited = spec.clone();
        edited.description = "now with coupons".to_string();

        let report = detect(&edited, &plan, None);
        assert!(report.issues.is_empty());
        assert!(report.spec_changed);
    }
}
