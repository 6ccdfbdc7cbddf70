//! Policy configuration and violation types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Project-wide governance limits.
///
/// Zero means "no limit" for the numeric fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Maximum number of tasks in progress at once
    pub max_wip: u32,

    /// Whether AI-backed operations are permitted
    pub allow_ai: bool,

    /// AI token allowance
    pub token_limit: u64,

    /// Budgeted hours of logged time
    pub budget_hours: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { max_wip: 0, allow_ai: true, token_limit: 0, budget_hours: 0.0 }
    }
}

/// Usage figures derived from the journal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSnapshot {
    pub tokens_used: u64,
    pub hours_logged: f64,
}

/// Policy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyRule {
    /// Work-in-progress limit
    Wip,
    /// AI disabled by policy
    AiDisabled,
    /// AI token quota
    TokenQuota,
    /// Logged time budget
    Budget,
}

impl PolicyRule {
    pub fn id(self) -> &'static str {
        match self {
            Self::Wip => "wip",
            Self::AiDisabled => "ai-disabled",
            Self::TokenQuota => "token-quota",
            Self::Budget => "budget",
        }
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.id())
    }
}

/// How serious a violation is. Only `Error` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for ViolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A single policy finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: PolicyRule,
    pub level: ViolationLevel,
    pub message: String,
}

impl Violation {
    pub fn new(rule: PolicyRule, level: ViolationLevel, message: impl Into<String>) -> Self {
        Self { rule, level, message: message.into() }
    }

    pub fn is_blocking(&self) -> bool {
        self.level == ViolationLevel::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults_are_unlimited() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.max_wip, 0);
        assert!(policy.allow_ai);
        assert_eq!(policy.token_limit, 0);
    }

    #[test]
    fn test_policy_partial_yaml_uses_defaults() {
        let policy: PolicyConfig = serde_yaml::from_str("max_wip: 3\n").unwrap();
        assert_eq!(policy.max_wip, 3);
        assert!(policy.allow_ai);
        assert!(policy.budget_hours.abs() < f64::EPSILON);
    }

    #[test]
    fn test_only_errors_block() {
        assert!(Violation::new(PolicyRule::Wip, ViolationLevel::Error, "x").is_blocking());
        assert!(!Violation::new(PolicyRule::Budget, ViolationLevel::Warning, "x").is_blocking());
        assert!(ViolationLevel::Error > ViolationLevel::Warning);
    }
}
