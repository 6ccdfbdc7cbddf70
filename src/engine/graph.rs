//! Task dependency graph.
//!
//! Edges point from a task to the tasks it depends on. The graph must be
//! acyclic and closed (every dependency names a task in the same plan).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::core::{CharterError, ExecutionState, Plan, Result, Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Index over a plan's `depends_on` edges.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    plan: &'a Plan,
    index: HashMap<&'a str, usize>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph, rejecting duplicate task ids and dangling references.
    pub fn new(plan: &'a Plan) -> Result<Self> {
        let mut index = HashMap::with_capacity(plan.tasks.len());
        for (i, task) in plan.tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), i).is_some() {
                return Err(CharterError::DuplicateId { id: task.id.clone() });
            }
        }

        for task in &plan.tasks {
            for dep in &task.depends_on {
                if !index.contains_key(dep.as_str()) {
                    return Err(CharterError::UnknownDependency {
                        task_id: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        Ok(Self { plan, index })
    }

    /// Build and check for cycles in one step.
    pub fn validate(plan: &'a Plan) -> Result<Self> {
        let graph = Self::new(plan)?;
        if let Some(cycle) = graph.find_cycle() {
            return Err(CharterError::CyclicDependency { cycle });
        }
        Ok(graph)
    }

    /// Three-color depth-first search.
    ///
    /// Returns the first cycle found as a path that starts and ends at the
    /// same task, e.g. `[a, b, a]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let tasks = &self.plan.tasks;
        let mut marks = vec![Mark::Unvisited; tasks.len()];
        // (node, index of next dependency to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..tasks.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::InProgress;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let deps = &tasks[node].depends_on;
                if top.1 >= deps.len() {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                }

                let child = self.index[deps[top.1].as_str()];
                top.1 += 1;

                match marks[child] {
                    Mark::Unvisited => {
                        marks[child] = Mark::InProgress;
                        stack.push((child, 0));
                    }
                    Mark::InProgress => {
                        let start = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|&(n, _)| tasks[n].id.clone()).collect();
                        cycle.push(tasks[child].id.clone());
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }

        None
    }

    /// Tasks in an order where every task follows its dependencies.
    ///
    /// Ties keep plan order. Only meaningful on a validated graph.
    pub fn topological_order(&self) -> Vec<&'a Task> {
        let plan: &'a Plan = self.plan;
        let tasks = &plan.tasks;
        let mut pending = vec![0usize; tasks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.depends_on {
                if let Some(&d) = self.index.get(dep.as_str()) {
                    pending[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        // Min-heap on plan index: the earliest ready task goes next.
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..tasks.len()).filter(|&i| pending[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(tasks.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(&tasks[i]);
            for &next in &dependents[i] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        order
    }

    /// Ids of tasks that depend directly on `task_id`.
    pub fn dependents(&self, task_id: &str) -> Vec<&'a str> {
        let plan: &'a Plan = self.plan;
        plan.tasks
            .iter()
            .filter(|t| t.depends_on.iter().any(|d| d == task_id))
            .map(|t| t.id.as_str())
            .collect()
    }
}

/// Whether every dependency of `task` is complete.
///
/// Dependencies with no recorded result count as `Pending`.
pub fn is_unlocked(task: &Task, state: &ExecutionState) -> bool {
    first_unmet(task, state).is_none()
}

/// The first dependency that is not complete, with its status.
pub fn first_unmet<'t>(task: &'t Task, state: &ExecutionState) -> Option<(&'t str, TaskStatus)> {
    task.depends_on
        .iter()
        .map(|dep| (dep.as_str(), state.status_of(dep)))
        .find(|(_, status)| !status.is_complete())
}
