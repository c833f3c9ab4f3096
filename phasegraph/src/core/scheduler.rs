//! Concurrency classification for available tasks.
//!
//! The scheduler never dispatches. It groups tasks that may run side by side
//! (pairwise-disjoint lock sets) and reports what is held back and why.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::graph::TaskGraph;
use crate::task::Task;

/// What a blocked task does to the rest of its iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlockPolicy {
    /// Any blocked task stops all new starts until an operator resets it.
    #[default]
    Halt,
    /// Only tasks downstream of a blocked task are held back.
    Descendants,
}

/// Available task whose locks are held by a running task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deferred {
    pub task: String,
    pub lock: String,
    pub holder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Schedule {
    /// Groups of task ids; members of one group may run concurrently.
    pub groups: Vec<Vec<String>>,
    pub deferred: Vec<Deferred>,
    /// Blocked tasks that halted the iteration (empty unless halted).
    pub halted_by: Vec<String>,
}

impl Schedule {
    pub fn is_halted(&self) -> bool {
        !self.halted_by.is_empty()
    }

    /// Tasks that may start right now: the first group.
    pub fn startable(&self) -> &[String] {
        self.groups.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Greedy first-fit partition in declaration order.
///
/// Each task joins the first group whose accumulated locks are disjoint from
/// its own; otherwise it opens a new group. Lock-free tasks always land in
/// the first group.
pub fn partition<'a>(tasks: &[&'a Task]) -> Vec<Vec<&'a Task>> {
    let mut groups: Vec<(BTreeSet<&str>, Vec<&'a Task>)> = Vec::new();
    for task in tasks {
        let slot = groups
            .iter()
            .position(|(held, _)| task.locks.iter().all(|lock| !held.contains(lock.as_str())));
        match slot {
            Some(idx) => {
                let (held, members) = &mut groups[idx];
                held.extend(task.locks.iter().map(String::as_str));
                members.push(task);
            }
            None => {
                let held = task.locks.iter().map(String::as_str).collect();
                groups.push((held, vec![*task]));
            }
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

/// Build the schedule for an iteration under `policy`.
pub fn schedule(graph: &TaskGraph<'_>, policy: BlockPolicy) -> Schedule {
    let blocked = graph.blocked();
    if policy == BlockPolicy::Halt && !blocked.is_empty() {
        return Schedule {
            groups: Vec::new(),
            deferred: Vec::new(),
            halted_by: blocked.iter().map(|task| task.id.clone()).collect(),
        };
    }

    let running = graph.in_progress();
    let mut deferred = Vec::new();
    let mut startable = Vec::new();
    for task in graph.available() {
        match lock_conflict(task, &running) {
            Some((lock, holder)) => deferred.push(Deferred {
                task: task.id.clone(),
                lock,
                holder,
            }),
            None => startable.push(task),
        }
    }

    let groups = partition(&startable)
        .into_iter()
        .map(|group| group.into_iter().map(|task| task.id.clone()).collect())
        .collect();

    Schedule {
        groups,
        deferred,
        halted_by: Vec::new(),
    }
}

fn lock_conflict(task: &Task, running: &[&Task]) -> Option<(String, String)> {
    running.iter().find_map(|holder| {
        task.locks
            .intersection(&holder.locks)
            .next()
            .map(|lock| (lock.clone(), holder.id.clone()))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::task::TaskStatus;
    use crate::test_support::{locked_task, task};

    fn group_ids(groups: &[Vec<&Task>]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|group| group.iter().map(|task| task.id.clone()).collect())
            .collect()
    }

    /// Tasks sharing any lock never land in the same group.
    #[test]
    fn overlapping_locks_are_serialized() {
        let tasks = vec![
            locked_task("a", &[], &["db"]),
            locked_task("b", &[], &["db", "cache"]),
            locked_task("c", &[], &["cache"]),
            task("d", &[]),
        ];
        let refs: Vec<&Task> = tasks.iter().collect();
        let groups = partition(&refs);

        assert_eq!(
            group_ids(&groups),
            vec![vec!["a", "c", "d"], vec!["b"]]
                .into_iter()
                .map(|g| g.into_iter().map(String::from).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        );
        for group in &groups {
            for (i, left) in group.iter().enumerate() {
                for right in &group[i + 1..] {
                    assert!(!left.shares_lock_with(right), "{} / {}", left.id, right.id);
                }
            }
        }
    }

    /// B and C become available together and, lock-free, share a group.
    #[test]
    fn independent_children_run_together() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a"])];
        let statuses = HashMap::from([("a".to_string(), TaskStatus::Done)]);
        let graph = TaskGraph::new(&tasks, &statuses);

        let plan = schedule(&graph, BlockPolicy::Halt);
        assert_eq!(plan.groups, vec![vec!["b".to_string(), "c".to_string()]]);
        assert_eq!(plan.startable(), ["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn halt_policy_stops_all_new_starts() {
        let tasks = vec![task("x", &[]), task("y", &[])];
        let statuses = HashMap::from([("x".to_string(), TaskStatus::Blocked)]);
        let graph = TaskGraph::new(&tasks, &statuses);

        let halted = schedule(&graph, BlockPolicy::Halt);
        assert!(halted.is_halted());
        assert!(halted.groups.is_empty());
        assert_eq!(halted.halted_by, vec!["x".to_string()]);

        let scoped = schedule(&graph, BlockPolicy::Descendants);
        assert!(!scoped.is_halted());
        assert_eq!(scoped.groups, vec![vec!["y".to_string()]]);
    }

    #[test]
    fn running_lock_holders_defer_conflicting_tasks() {
        let tasks = vec![
            locked_task("writer", &[], &["schema.sql"]),
            locked_task("migrate", &[], &["schema.sql"]),
            task("docs", &[]),
        ];
        let statuses = HashMap::from([("writer".to_string(), TaskStatus::InProgress)]);
        let graph = TaskGraph::new(&tasks, &statuses);

        let plan = schedule(&graph, BlockPolicy::Halt);
        assert_eq!(plan.groups, vec![vec!["docs".to_string()]]);
        assert_eq!(
            plan.deferred,
            vec![Deferred {
                task: "migrate".into(),
                lock: "schema.sql".into(),
                holder: "writer".into(),
            }]
        );
    }
}
