//! Policy evaluation.
//!
//! Rules:
//! - WIP: starting a task must not push the in-progress count above `max_wip`.
//! - AI: refused outright when `allow_ai` is false; token usage at 100% of
//!   `token_limit` blocks, 90% warns, 75% is informational.
//! - Budget: logged hours above `budget_hours` warn but never block.

use crate::core::{
    event::{actions, keys},
    CharterError, Event, ExecutionState, Plan, PolicyConfig, PolicyRule, Result, TaskStatus,
    UsageSnapshot, Violation, ViolationLevel,
};

/// Kinds of AI-backed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiOperation {
    PlanGeneration,
    Decomposition,
    Query,
}

impl AiOperation {
    fn describe(self) -> &'static str {
        match self {
            Self::PlanGeneration => "AI plan generation",
            Self::Decomposition => "AI decomposition",
            Self::Query => "AI query",
        }
    }
}

/// An operation awaiting admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposedAction<'a> {
    /// `plan` limits the WIP count to tasks it contains.
    StartTask { task_id: &'a str, plan: Option<&'a Plan> },
    AiCall(AiOperation),
}

/// Stateless rule evaluator.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEngine<'a> {
    config: &'a PolicyConfig,
}

impl<'a> PolicyEngine<'a> {
    pub fn new(config: &'a PolicyConfig) -> Self {
        Self { config }
    }

    /// Violations a proposed action would cause.
    pub fn evaluate(
        &self,
        state: &ExecutionState,
        usage: &UsageSnapshot,
        action: ProposedAction<'_>,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        match action {
            ProposedAction::StartTask { task_id, plan } => {
                let max = self.config.max_wip;
                let after = wip(plan, state) + 1;
                if max > 0 && after > max as usize {
                    violations.push(Violation::new(
                        PolicyRule::Wip,
                        ViolationLevel::Error,
                        format!(
                            "starting '{task_id}' would put {after} tasks in progress (max_wip is {max})"
                        ),
                    ));
                }
            }
            ProposedAction::AiCall(operation) => {
                if !self.config.allow_ai {
                    violations.push(Violation::new(
                        PolicyRule::AiDisabled,
                        ViolationLevel::Error,
                        format!("{} is disabled by policy", operation.describe()),
                    ));
                    return violations;
                }
                violations.extend(self.token_quota(usage));
            }
        }

        violations.extend(self.budget(usage));
        violations
    }

    /// Check an action and fail on the first blocking violation.
    ///
    /// Returns the non-blocking findings on success.
    pub fn admit(
        &self,
        state: &ExecutionState,
        usage: &UsageSnapshot,
        action: ProposedAction<'_>,
    ) -> Result<Vec<Violation>> {
        let violations = self.evaluate(state, usage, action);
        if let Some(blocking) = violations.iter().find(|v| v.is_blocking()) {
            tracing::debug!(rule = %blocking.rule, "policy refused {action:?}");
            return Err(CharterError::PolicyViolation {
                rule: blocking.rule,
                message: blocking.message.clone(),
            });
        }
        Ok(violations)
    }

    /// Evaluate the whole snapshot. Never blocks and never mutates.
    pub fn check_compliance(
        &self,
        plan: Option<&Plan>,
        state: Option<&ExecutionState>,
        usage: &UsageSnapshot,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        if let Some(state) = state {
            let max = self.config.max_wip as usize;
            let wip = wip(plan, state);
            if max > 0 && wip > max {
                violations.push(Violation::new(
                    PolicyRule::Wip,
                    ViolationLevel::Error,
                    format!("{wip} tasks in progress exceeds max_wip of {max}"),
                ));
            } else if max > 0 && wip == max {
                violations.push(Violation::new(
                    PolicyRule::Wip,
                    ViolationLevel::Info,
                    format!("at WIP limit ({wip}/{max}); no new task can start"),
                ));
            }
        }

        violations.extend(self.token_quota(usage));
        violations.extend(self.budget(usage));
        violations
    }

    fn token_quota(&self, usage: &UsageSnapshot) -> Option<Violation> {
        let limit = self.config.token_limit;
        if limit == 0 {
            return None;
        }

        let percent = usage.tokens_used.saturating_mul(100) / limit;
        let level = match percent {
            100.. => ViolationLevel::Error,
            90..=99 => ViolationLevel::Warning,
            75..=89 => ViolationLevel::Info,
            _ => return None,
        };
        Some(Violation::new(
            PolicyRule::TokenQuota,
            level,
            format!("{} of {limit} AI tokens used ({percent}%)", usage.tokens_used),
        ))
    }

    fn budget(&self, usage: &UsageSnapshot) -> Option<Violation> {
        let budget = self.config.budget_hours;
        if budget <= 0.0 || usage.hours_logged <= budget {
            return None;
        }
        Some(Violation::new(
            PolicyRule::Budget,
            ViolationLevel::Warning,
            format!("{:.1}h logged exceeds budget of {budget:.1}h", usage.hours_logged),
        ))
    }
}

/// In-progress tasks, counting only those in `plan` when given.
fn wip(plan: Option<&Plan>, state: &ExecutionState) -> usize {
    match plan {
        Some(plan) => plan
            .task_ids()
            .filter(|id| state.status_of(id) == TaskStatus::InProgress)
            .count(),
        None => state.in_progress(),
    }
}

/// Derive usage figures by replaying the journal.
pub fn usage_from_events(events: &[Event]) -> UsageSnapshot {
    events.iter().fold(UsageSnapshot::default(), |mut usage, event| {
        match event.action.as_str() {
            actions::AI_USAGE => {
                let tokens = event.meta_f64(keys::TOKENS).unwrap_or(0.0);
                if tokens > 0.0 {
                    usage.tokens_used = usage.tokens_used.saturating_add(tokens as u64);
                }
            }
            actions::TIME_LOG => {
                let hours = event.meta_f64(keys::HOURS).unwrap_or(0.0);
                if hours.is_finite() && hours > 0.0 {
                    usage.hours_logged += hours;
                }
            }
            _ => {}
        }
        usage
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Task, TaskResult};

    fn state_in_progress(n: usize) -> ExecutionState {
        let mut state = ExecutionState::new("p");
        for i in 0..n {
            state.put(
                format!("t{i}"),
                TaskResult { status: TaskStatus::InProgress, ..Default::default() },
            );
        }
        state
    }

    fn usage(tokens: u64, hours: f64) -> UsageSnapshot {
        UsageSnapshot { tokens_used: tokens, hours_logged: hours }
    }

    #[test]
    fn test_wip_blocks_start_beyond_limit() {
        let config = PolicyConfig { max_wip: 2, ..Default::default() };
        let engine = PolicyEngine::new(&config);
        let start = ProposedAction::StartTask { task_id: "t9", plan: None };

        assert!(engine.admit(&state_in_progress(1), &usage(0, 0.0), start).is_ok());
        let err = engine.admit(&state_in_progress(2), &usage(0, 0.0), start).unwrap_err();
        assert!(matches!(err, CharterError::PolicyViolation { rule: PolicyRule::Wip, .. }));
    }

    #[test]
    fn test_wip_ignores_tasks_outside_plan() {
        let config = PolicyConfig { max_wip: 1, ..Default::default() };
        let engine = PolicyEngine::new(&config);
        // t0 is in progress in state but no longer part of the plan.
        let plan = Plan::new("s", vec![Task::new("t1", "f", "T1")]);
        let state = state_in_progress(1);

        let start = ProposedAction::StartTask { task_id: "t1", plan: Some(&plan) };
        assert!(engine.admit(&state, &usage(0, 0.0), start).is_ok());
        assert!(engine.check_compliance(Some(&plan), Some(&state), &usage(0, 0.0)).is_empty());
    }

    #[test]
    fn test_zero_wip_is_unlimited() {
        let config = PolicyConfig::default();
        let engine = PolicyEngine::new(&config);
        let violations = engine.evaluate(
            &state_in_progress(50),
            &usage(0, 0.0),
            ProposedAction::StartTask { task_id: "x", plan: None },
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_ai_disabled_refuses_outright() {
        let config = PolicyConfig { allow_ai: false, ..Default::default() };
        let engine = PolicyEngine::new(&config);
        let err = engine
            .admit(
                &ExecutionState::default(),
                &usage(0, 0.0),
                ProposedAction::AiCall(AiOperation::PlanGeneration),
            )
            .unwrap_err();
        assert!(matches!(err, CharterError::PolicyViolation { rule: PolicyRule::AiDisabled, .. }));
    }

    #[test]
    fn test_token_quota_thresholds() {
        let config = PolicyConfig { token_limit: 1000, ..Default::default() };
        let engine = PolicyEngine::new(&config);
        let call = ProposedAction::AiCall(AiOperation::Query);
        let state = ExecutionState::default();

        let level_at = |used| engine.evaluate(&state, &usage(used, 0.0), call).first().map(|v| v.level);

        assert_eq!(level_at(500), None);
        assert_eq!(level_at(750), Some(ViolationLevel::Info));
        assert_eq!(level_at(899), Some(ViolationLevel::Info));
        assert_eq!(level_at(900), Some(ViolationLevel::Warning));
        assert_eq!(level_at(999), Some(ViolationLevel::Warning));
        assert_eq!(level_at(1000), Some(ViolationLevel::Error));
        assert!(engine.admit(&state, &usage(1200, 0.0), call).is_err());
        assert!(engine.admit(&state, &usage(950, 0.0), call).is_ok());
    }

    #[test]
    fn test_budget_overrun_warns_without_blocking() {
        let config = PolicyConfig { budget_hours: 10.0, ..Default::default() };
        let engine = PolicyEngine::new(&config);
        let findings = engine
            .admit(
                &ExecutionState::default(),
                &usage(0, 12.5),
                ProposedAction::StartTask { task_id: "t", plan: None },
            )
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, PolicyRule::Budget);
        assert_eq!(findings[0].level, ViolationLevel::Warning);
    }

    #[test]
    fn test_compliance_reports_everything() {
        let config = PolicyConfig { max_wip: 1, token_limit: 100, budget_hours: 1.0, ..Default::default() };
        let engine = PolicyEngine::new(&config);
        let plan = Plan::new("s", vec![Task::new("t0", "f", "T0"), Task::new("t1", "f", "T1")]);
        let state = state_in_progress(2);

        let violations = engine.check_compliance(Some(&plan), Some(&state), &usage(100, 2.0));
        let rules: Vec<_> = violations.iter().map(|v| v.rule).collect();
        assert_eq!(rules, vec![PolicyRule::Wip, PolicyRule::TokenQuota, PolicyRule::Budget]);
        assert_eq!(violations[0].level, ViolationLevel::Error);
    }

    #[test]
    fn test_usage_replay() {
        let events = vec![
            Event::new("a", actions::AI_USAGE).with(keys::TOKENS, 120),
            Event::new("a", actions::TIME_LOG).with(keys::HOURS, 1.5),
            Event::new("a", actions::TASK_START),
            Event::new("a", actions::AI_USAGE).with(keys::TOKENS, 30),
            Event::new("a", actions::TIME_LOG).with(keys::HOURS, 2.0),
        ];
        let usage = usage_from_events(&events);
        assert_eq!(usage.tokens_used, 150);
        assert!((usage.hours_logged - 3.5).abs() < 1e-9);
    }
}
