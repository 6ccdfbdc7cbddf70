//! Deterministic spec decomposition and plan pruning.

use std::collections::HashSet;

use crate::core::{task_key, Plan, Result, Spec, Task};

/// Turn a spec into tasks, one per requirement.
///
/// Features without requirements get a single task of their own. Task
/// order follows declaration order in the spec.
pub fn decompose(spec: &Spec) -> Result<Vec<Task>> {
    spec.validate()?;

    let mut tasks = Vec::new();
    for feature in &spec.features {
        if feature.requirements.is_empty() {
            let mut task = Task::new(task_key(&feature.id), &feature.id, &feature.title);
            task.description = feature.description.clone();
            tasks.push(task);
            continue;
        }

        for req in &feature.requirements {
            let mut task =
                Task::new(task_key(&req.id), &feature.id, &req.title).with_priority(req.priority);
            task.description = req.description.clone();
            task.estimate = req.estimate.clone();
            for dep in &req.depends_on {
                task = task.depends_on(task_key(dep));
            }
            tasks.push(task);
        }
    }

    Ok(tasks)
}

/// What [`prune`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Ids of dropped tasks
    pub removed: Vec<String>,
    /// Number of dependency references stripped from surviving tasks
    pub stripped_dependencies: usize,
}

impl PruneOutcome {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.stripped_dependencies == 0
    }
}

/// Drop tasks whose feature no longer exists in `spec`.
///
/// Dependencies on dropped tasks are removed from the tasks that remain.
pub fn prune(plan: &mut Plan, spec: &Spec) -> PruneOutcome {
    let (kept, dropped): (Vec<Task>, Vec<Task>) =
        std::mem::take(&mut plan.tasks).into_iter().partition(|t| spec.has_feature(&t.feature_id));
    plan.tasks = kept;

    let removed: Vec<String> = dropped.into_iter().map(|t| t.id).collect();
    let gone: HashSet<&str> = removed.iter().map(String::as_str).collect();

    let mut stripped_dependencies = 0;
    for task in &mut plan.tasks {
        let before = task.depends_on.len();
        task.depends_on.retain(|d| !gone.contains(d.as_str()));
        stripped_dependencies += before - task.depends_on.len();
    }

    PruneOutcome { removed, stripped_dependencies }
}
