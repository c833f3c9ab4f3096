//! Task graph queries and integrity checks for one phase iteration.
//!
//! The graph is a read-only view over the iteration's declared tasks and the
//! statuses loaded from the status store. Mutations are validated here and
//! applied by the caller only when validation succeeds.

use std::collections::{HashMap, HashSet};

use crate::error::PhaseGraphError;
use crate::task::{Task, TaskStatus};

/// Read-only view joining declarations with current statuses.
#[derive(Debug, Clone, Copy)]
pub struct TaskGraph<'a> {
    tasks: &'a [Task],
    statuses: &'a HashMap<String, TaskStatus>,
}

impl<'a> TaskGraph<'a> {
    pub fn new(tasks: &'a [Task], statuses: &'a HashMap<String, TaskStatus>) -> Self {
        Self { tasks, statuses }
    }

    pub fn tasks(&self) -> &'a [Task] {
        self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&'a Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Status of a declared task; tasks never written to the store are `todo`.
    pub fn status(&self, id: &str) -> TaskStatus {
        self.statuses.get(id).copied().unwrap_or_default()
    }

    /// `todo` and every parent `done`.
    pub fn is_available(&self, task: &Task) -> bool {
        self.status(&task.id) == TaskStatus::Todo
            && task
                .parents
                .iter()
                .all(|parent| self.task(parent).is_some() && self.status(parent) == TaskStatus::Done)
    }

    /// Available tasks in declaration order.
    pub fn available(&self) -> Vec<&'a Task> {
        self.tasks
            .iter()
            .filter(|task| self.is_available(task))
            .collect()
    }

    pub fn with_status(&self, status: TaskStatus) -> Vec<&'a Task> {
        self.tasks
            .iter()
            .filter(|task| self.status(&task.id) == status)
            .collect()
    }

    pub fn blocked(&self) -> Vec<&'a Task> {
        self.with_status(TaskStatus::Blocked)
    }

    pub fn has_blockers(&self) -> bool {
        self.tasks
            .iter()
            .any(|task| self.status(&task.id) == TaskStatus::Blocked)
    }

    pub fn in_progress(&self) -> Vec<&'a Task> {
        self.with_status(TaskStatus::InProgress)
    }

    /// True when every declared task is `done` (and at least one exists).
    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty()
            && self
                .tasks
                .iter()
                .all(|task| self.status(&task.id) == TaskStatus::Done)
    }

    /// Blocked tasks reachable by walking up `task`'s parents, sorted by id.
    pub fn blocked_ancestors(&self, task: &Task) -> Vec<String> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<&str> = task.parents.iter().map(String::as_str).collect();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            if self.status(id) == TaskStatus::Blocked {
                found.push(id.to_string());
            }
            if let Some(parent) = self.task(id) {
                pending.extend(parent.parents.iter().map(String::as_str));
            }
        }
        found.sort();
        found
    }
}

/// Validate appending `batch` to `existing` as one atomic addition.
///
/// Checks run in a fixed order: duplicate ids, unknown parents, then cycles
/// (only possible through self-parents or parents inside the batch).
pub fn check_additions(existing: &[Task], batch: &[Task]) -> Result<(), PhaseGraphError> {
    let mut ids: HashSet<&str> = existing.iter().map(|task| task.id.as_str()).collect();
    for task in batch {
        if !ids.insert(task.id.as_str()) {
            return Err(PhaseGraphError::DuplicateId(task.id.clone()));
        }
    }

    for task in batch {
        if let Some(parent) = task.parents.iter().find(|p| !ids.contains(p.as_str())) {
            return Err(PhaseGraphError::UnknownParent {
                task: task.id.clone(),
                parent: parent.clone(),
            });
        }
    }

    let combined: Vec<Task> = existing.iter().chain(batch.iter()).cloned().collect();
    match find_cycle(&combined) {
        Some(path) => Err(PhaseGraphError::CycleDetected { path }),
        None => Ok(()),
    }
}

/// Validate replacing the parents of `id` with `parents`.
pub fn check_reparent(tasks: &[Task], id: &str, parents: &[String]) -> Result<(), PhaseGraphError> {
    if !tasks.iter().any(|task| task.id == id) {
        return Err(PhaseGraphError::not_found("task", id));
    }
    if let Some(parent) = parents
        .iter()
        .find(|parent| !tasks.iter().any(|task| &task.id == *parent))
    {
        return Err(PhaseGraphError::UnknownParent {
            task: id.to_string(),
            parent: parent.clone(),
        });
    }

    let candidate: Vec<Task> = tasks
        .iter()
        .map(|task| {
            if task.id == id {
                let mut updated = task.clone();
                updated.parents = parents.to_vec();
                updated
            } else {
                task.clone()
            }
        })
        .collect();
    match find_cycle(&candidate) {
        Some(path) => Err(PhaseGraphError::CycleDetected { path }),
        None => Ok(()),
    }
}

/// Depth-first search over parent edges in declaration order.
///
/// Returns the first cycle found as a closed path (`a -> b -> a`).
pub fn find_cycle(tasks: &[Task]) -> Option<Vec<String>> {
    let index: HashMap<&str, &Task> = tasks.iter().map(|task| (task.id.as_str(), task)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'t>(
        id: &'t str,
        index: &HashMap<&'t str, &'t Task>,
        visited: &mut HashSet<&'t str>,
        stack: &mut Vec<&'t str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|entry| *entry == id) {
            let mut path: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            path.push(id.to_string());
            return Some(path);
        }
        if !visited.insert(id) {
            return None;
        }
        stack.push(id);
        if let Some(&task) = index.get(id) {
            for parent in &task.parents {
                if let Some(path) = visit(parent.as_str(), index, visited, stack) {
                    return Some(path);
                }
            }
        }
        stack.pop();
        None
    }

    for task in tasks {
        if let Some(path) = visit(task.id.as_str(), &index, &mut visited, &mut stack) {
            return Some(path);
        }
    }
    None
}
