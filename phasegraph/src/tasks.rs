//! Status and graph verbs on the active phase's current iteration.

use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::core::graph::{TaskGraph, check_additions, check_reparent};
use crate::core::invariants::validate_iteration;
use crate::error::PhaseGraphError;
use crate::io::iteration_store::{load_iteration, write_iteration};
use crate::io::lock::FileLock;
use crate::io::paths::check_segment;
use crate::task::{Task, TaskRecord, TaskStatus};
use crate::workspace::{PlanHandle, statuses};

/// Confidence used by `low_confidence_tasks` when neither the caller nor the
/// active phase names a threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 3;

/// Task whose recorded confidence is below a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowConfidence {
    pub task: String,
    pub score: u8,
    pub rationale: String,
}

impl PlanHandle<'_> {
    pub fn get_status(&self, task_id: &str) -> Result<TaskRecord> {
        let current = self.current()?;
        current.require_task(task_id)?;
        current.store.load(task_id)
    }

    /// Move a task along a legal status edge.
    ///
    /// A claim (`todo -> in-progress`) additionally requires the task to be
    /// available: every parent must be done.
    #[instrument(skip_all, fields(plan = %self.id(), task = task_id, to = %next))]
    pub fn set_status(&self, task_id: &str, next: TaskStatus) -> Result<TaskRecord> {
        let current = self.current()?;
        let task = current.require_task(task_id)?;
        if next == TaskStatus::InProgress {
            let records = current.records()?;
            let statuses = statuses(&records);
            let graph = TaskGraph::new(current.tasks(), &statuses);
            let status = graph.status(task_id);
            if status == TaskStatus::Todo && !graph.is_available(task) {
                debug!(task = task_id, "claim refused: parents not done");
                return Err(PhaseGraphError::InvalidTransition {
                    task: task_id.to_string(),
                    from: status,
                    to: next,
                }
                .into());
            }
        }
        current.store.set_status(task_id, next, Utc::now())
    }

    pub fn append_log(&self, task_id: &str, message: &str) -> Result<TaskRecord> {
        let current = self.current()?;
        current.require_task(task_id)?;
        current.store.append_log(task_id, message, Utc::now())
    }

    pub fn record_confidence(&self, task_id: &str, score: u8, rationale: &str) -> Result<TaskRecord> {
        let current = self.current()?;
        current.require_task(task_id)?;
        current
            .store
            .record_confidence(task_id, score, rationale, Utc::now())
    }

    pub fn record_output(&self, task_id: &str, output: &str) -> Result<TaskRecord> {
        let current = self.current()?;
        current.require_task(task_id)?;
        current.store.record_output(task_id, output, Utc::now())
    }

    /// Tasks with a recorded confidence below `below`, lowest first.
    ///
    /// Without `below`, the active phase's `min_confidence` applies, then
    /// [`DEFAULT_CONFIDENCE_THRESHOLD`].
    pub fn low_confidence_tasks(&self, below: Option<u8>) -> Result<Vec<LowConfidence>> {
        let current = self.current()?;
        let threshold = match below {
            Some(threshold) => threshold,
            None => self
                .workspace()
                .config()
                .workflow()
                .phase(&current.plan.track.active)?
                .min_confidence
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };
        let records = current.records()?;
        let mut low: Vec<LowConfidence> = current
            .tasks()
            .iter()
            .filter_map(|task| {
                let confidence = records.get(&task.id)?.confidence.as_ref()?;
                (confidence.score < threshold).then(|| LowConfidence {
                    task: task.id.clone(),
                    score: confidence.score,
                    rationale: confidence.rationale.clone(),
                })
            })
            .collect();
        low.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.task.cmp(&b.task)));
        Ok(low)
    }

    /// Declared tasks of the current iteration in declaration order.
    pub fn tasks(&self) -> Result<Vec<Task>> {
        Ok(self.current()?.record.tasks)
    }

    pub fn available_tasks(&self) -> Result<Vec<Task>> {
        self.select(|graph| graph.available())
    }

    pub fn blocked_tasks(&self) -> Result<Vec<Task>> {
        self.select(|graph| graph.blocked())
    }

    pub fn in_progress_tasks(&self) -> Result<Vec<Task>> {
        self.select(|graph| graph.in_progress())
    }

    pub fn has_blockers(&self) -> Result<bool> {
        Ok(!self.blocked_tasks()?.is_empty())
    }

    fn select(
        &self,
        pick: impl for<'g> Fn(&TaskGraph<'g>) -> Vec<&'g Task>,
    ) -> Result<Vec<Task>> {
        let current = self.current()?;
        let records = current.records()?;
        let statuses = statuses(&records);
        let graph = TaskGraph::new(current.tasks(), &statuses);
        Ok(pick(&graph).into_iter().cloned().collect())
    }

    pub fn add_task(&self, task: Task) -> Result<Task> {
        let mut added = self.add_tasks(vec![task])?;
        Ok(added.remove(0))
    }

    /// Append a batch of tasks atomically: either all are added or none.
    #[instrument(skip_all, fields(plan = %self.id(), count = batch.len()))]
    pub fn add_tasks(&self, mut batch: Vec<Task>) -> Result<Vec<Task>> {
        for task in &mut batch {
            check_segment("task", &task.id)?;
            task.dedup_parents();
        }
        let current = self.current()?;
        let _lock = FileLock::acquire(&current.path)?;
        let mut record = load_iteration(&current.path)?;
        check_additions(&record.tasks, &batch)?;
        record.tasks.extend(batch.iter().cloned());
        write_iteration(&current.path, &record)?;
        info!(
            phase = %record.phase,
            iteration = record.iteration,
            added = batch.len(),
            "tasks added"
        );
        Ok(batch)
    }

    /// Replace the parents of a declared task.
    #[instrument(skip_all, fields(plan = %self.id(), task = task_id))]
    pub fn update_task_parents(&self, task_id: &str, parents: Vec<String>) -> Result<Task> {
        let current = self.current()?;
        let _lock = FileLock::acquire(&current.path)?;
        let mut record = load_iteration(&current.path)?;
        let mut parents = parents;
        let mut seen = HashSet::new();
        parents.retain(|parent| seen.insert(parent.clone()));
        check_reparent(&record.tasks, task_id, &parents)?;

        let task = record
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| PhaseGraphError::not_found("task", task_id))?;
        task.parents = parents;
        let updated = task.clone();
        write_iteration(&current.path, &record)?;
        info!(task = task_id, parents = ?updated.parents, "task parents updated");
        Ok(updated)
    }

    /// Semantic problems in the current iteration; empty means healthy.
    pub fn validate(&self) -> Result<Vec<String>> {
        let current = self.current()?;
        let records = current.records()?;
        Ok(validate_iteration(current.tasks(), &records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestWorkspace, task};

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    fn typed(err: anyhow::Error) -> PhaseGraphError {
        err.downcast::<PhaseGraphError>().expect("typed error")
    }

    /// A <- B, A <- C: only A is available until A is done.
    #[test]
    fn availability_follows_parent_completion() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        plan.add_tasks(vec![task("a", &[]), task("b", &["a"]), task("c", &["a"])])
            .expect("add");

        assert_eq!(ids(&plan.available_tasks().expect("available")), vec!["a"]);

        plan.set_status("a", TaskStatus::InProgress).expect("claim");
        assert!(plan.available_tasks().expect("available").is_empty());
        plan.set_status("a", TaskStatus::Done).expect("done");
        assert_eq!(
            ids(&plan.available_tasks().expect("available")),
            vec!["b", "c"]
        );
    }

    #[test]
    fn claim_requires_parents_done() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        plan.add_tasks(vec![task("a", &[]), task("b", &["a"])])
            .expect("add");

        let err = plan.set_status("b", TaskStatus::InProgress).unwrap_err();
        assert!(matches!(typed(err), PhaseGraphError::InvalidTransition { .. }));
        assert_eq!(plan.get_status("b").expect("status").status, TaskStatus::Todo);
    }

    /// Blocked X keeps its dependants unavailable and shows up as a blocker.
    #[test]
    fn blocked_task_is_reported() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        plan.add_tasks(vec![task("x", &[]), task("y", &["x"]), task("z", &[])])
            .expect("add");
        plan.set_status("x", TaskStatus::InProgress).expect("claim");
        plan.set_status("x", TaskStatus::Blocked).expect("block");

        assert_eq!(ids(&plan.blocked_tasks().expect("blocked")), vec!["x"]);
        assert!(plan.has_blockers().expect("blockers"));
        assert_eq!(ids(&plan.available_tasks().expect("available")), vec!["z"]);
    }

    /// A rejected batch leaves the iteration unchanged.
    #[test]
    fn add_tasks_is_all_or_nothing() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        plan.add_task(task("a", &[])).expect("add a");

        let err = plan
            .add_tasks(vec![task("b", &["a"]), task("c", &["ghost"])])
            .unwrap_err();
        assert_eq!(
            typed(err),
            PhaseGraphError::UnknownParent {
                task: "c".into(),
                parent: "ghost".into()
            }
        );
        let err = plan.add_task(task("a", &[])).unwrap_err();
        assert_eq!(typed(err), PhaseGraphError::DuplicateId("a".into()));
        let err = plan.add_task(task("s", &["s"])).unwrap_err();
        assert!(matches!(typed(err), PhaseGraphError::CycleDetected { .. }));

        assert_eq!(ids(&plan.tasks().expect("tasks")), vec!["a"]);
    }

    /// Rejected reparents leave every declared parent list as it was.
    #[test]
    fn update_parents_rejects_cycles() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        plan.add_tasks(vec![task("a", &[]), task("b", &["a"])])
            .expect("add");

        let err = plan
            .update_task_parents("a", vec!["b".into()])
            .unwrap_err();
        assert!(matches!(typed(err), PhaseGraphError::CycleDetected { .. }));
        let before = plan.tasks().expect("tasks");
        assert!(before[0].parents.is_empty());
        assert_eq!(before[1].parents, vec!["a".to_string()]);
        let err = plan
            .update_task_parents("a", vec!["ghost".into()])
            .unwrap_err();
        assert!(matches!(typed(err), PhaseGraphError::UnknownParent { .. }));
        assert_eq!(plan.tasks().expect("tasks"), before);
        let err = plan.update_task_parents("nope", Vec::new()).unwrap_err();
        assert!(matches!(typed(err), PhaseGraphError::NotFound { .. }));

        let updated = plan
            .update_task_parents("b", Vec::new())
            .expect("clear parents");
        assert!(updated.parents.is_empty());
        assert_eq!(
            ids(&plan.available_tasks().expect("available")),
            vec!["a", "b"]
        );
    }

    #[test]
    fn status_verbs_require_declared_task() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        let err = plan.append_log("ghost", "hello").unwrap_err();
        assert_eq!(
            typed(err),
            PhaseGraphError::NotFound {
                kind: "task",
                id: "ghost".into()
            }
        );
    }

    #[test]
    fn low_confidence_uses_threshold() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        plan.add_tasks(vec![task("a", &[]), task("b", &[]), task("c", &[])])
            .expect("add");
        plan.record_confidence("a", 2, "unsure").expect("a");
        plan.record_confidence("b", 5, "sure").expect("b");
        plan.record_confidence("c", 1, "guess").expect("c");

        let low = plan.low_confidence_tasks(None).expect("low");
        let tasks: Vec<&str> = low.iter().map(|l| l.task.as_str()).collect();
        assert_eq!(tasks, vec!["c", "a"]);
        assert!(plan.low_confidence_tasks(Some(1)).expect("low").is_empty());
    }
}
