//! Specification documents.
//!
//! A spec declares the features and requirements a project should deliver.
//! Plans are derived from it, and drift is measured against it.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{CharterError, Result};
use super::plan::Priority;

/// Identifiers must start with an alphanumeric character.
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid id pattern"));

/// Prefix used when deriving task identifiers from spec items.
pub const TASK_PREFIX: &str = "task-";

/// Returns true if `id` is a well-formed identifier.
pub fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

/// Task identifier derived from a requirement or feature id.
pub fn task_key(item_id: &str) -> String {
    format!("{TASK_PREFIX}{item_id}")
}

/// The declarative description of what a project should deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    /// Spec identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Declared features
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// A feature groups related requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

/// A single requirement of a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,

    /// Opaque effort estimate ("2d", "4h", ...)
    #[serde(default)]
    pub estimate: String,

    /// Requirement ids this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A task the spec expects a plan to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedTask {
    /// Derived task identifier
    pub task_id: String,
    /// Feature that owns the item
    pub feature_id: String,
    /// Requirement id, or the feature id for requirement-less features
    pub source_id: String,
}

impl Spec {
    /// Create an empty spec.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), description: String::new(), features: Vec::new() }
    }

    /// Add a feature (builder style).
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// Find a feature by id.
    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Whether a feature with this id is declared.
    pub fn has_feature(&self, id: &str) -> bool {
        self.feature(id).is_some()
    }

    /// Iterate all requirements along with their owning feature.
    pub fn requirements(&self) -> impl Iterator<Item = (&Feature, &Requirement)> {
        self.features.iter().flat_map(|f| f.requirements.iter().map(move |r| (f, r)))
    }

    /// The set of tasks that should exist for this spec, in declaration order.
    ///
    /// Each requirement yields one task; a feature without requirements
    /// yields a single task of its own.
    pub fn expected_tasks(&self) -> Vec<ExpectedTask> {
        let mut expected = Vec::new();
        for feature in &self.features {
            if feature.requirements.is_empty() {
                expected.push(ExpectedTask {
                    task_id: task_key(&feature.id),
                    feature_id: feature.id.clone(),
                    source_id: feature.id.clone(),
                });
                continue;
            }
            for req in &feature.requirements {
                expected.push(ExpectedTask {
                    task_id: task_key(&req.id),
                    feature_id: feature.id.clone(),
                    source_id: req.id.clone(),
                });
            }
        }
        expected
    }

    /// Check identifiers and cross references.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_id(&self.id) {
            return Err(CharterError::MalformedId { id: self.id.clone() });
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if !is_valid_id(&feature.id) {
                return Err(CharterError::MalformedId { id: feature.id.clone() });
            }
            if !seen.insert(feature.id.as_str()) {
                return Err(CharterError::DuplicateId { id: feature.id.clone() });
            }
        }

        let mut requirement_ids = HashSet::new();
        for (_, req) in self.requirements() {
            if !is_valid_id(&req.id) {
                return Err(CharterError::MalformedId { id: req.id.clone() });
            }
            // Requirement ids share a namespace with feature ids since both derive task keys.
            if !requirement_ids.insert(req.id.as_str()) || seen.contains(req.id.as_str()) {
                return Err(CharterError::DuplicateId { id: req.id.clone() });
            }
        }

        for (_, req) in self.requirements() {
            for dep in &req.depends_on {
                if !requirement_ids.contains(dep.as_str()) {
                    return Err(CharterError::UnknownDependency {
                        task_id: task_key(&req.id),
                        dependency: task_key(dep),
                    });
                }
            }
        }

        Ok(())
    }

    /// SHA-256 fingerprint over the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Starter spec written by `charter init`.
    pub fn template(name: &str) -> Self {
        let id = slugify(name);
        Self {
            id: if id.is_empty() { "project".to_string() } else { id },
            title: name.to_string(),
            description: "Describe what this project delivers.".to_string(),
            features: vec![Feature {
                id: "core".to_string(),
                title: "Core".to_string(),
                description: "First feature".to_string(),
                requirements: vec![Requirement {
                    id: "core-setup".to_string(),
                    title: "Set up the project skeleton".to_string(),
                    description: String::new(),
                    priority: Priority::High,
                    estimate: "1d".to_string(),
                    depends_on: Vec::new(),
                }],
            }],
        }
    }
}

impl Feature {
    /// Create a feature with no requirements.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            requirements: Vec::new(),
        }
    }

    /// Add a requirement (builder style).
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }
}

impl Requirement {
    /// Create a medium priority requirement.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            estimate: String::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, requirement_id: impl Into<String>) -> Self {
        self.depends_on.push(requirement_id.into());
        self
    }
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
