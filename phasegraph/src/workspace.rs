//! Workspace-level entry points and the per-plan handle.
//!
//! A [`Workspace`] owns the paths and loaded workflow config of one
//! `.phasegraph/` directory. Every plan-level verb is a method on
//! [`PlanHandle`], which names its plan explicitly; the active-plan pointer is
//! only consulted when a caller asks for it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::phase_machine::PhaseTrack;
use crate::error::PhaseGraphError;
use crate::io::config::{WorkflowConfig, load_config};
use crate::io::iteration_store::{IterationRecord, ensure_iteration, load_iteration};
use crate::io::lock::FileLock;
use crate::io::paths::{StatePaths, check_segment};
use crate::io::plan_store::{
    ActivePointer, PlanRecord, list_plans, load_active, load_plan, switch_active, write_plan,
};
use crate::io::status_store::StatusStore;
use crate::task::{Task, TaskRecord, TaskStatus};

#[derive(Debug, Clone)]
pub struct Workspace {
    paths: StatePaths,
    config: WorkflowConfig,
}

impl Workspace {
    /// Open an initialized workspace rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = StatePaths::new(root);
        if !paths.state_dir.is_dir() {
            bail!(
                "no .phasegraph directory under {} (run `phasegraph init`)",
                root.display()
            );
        }
        let config = load_config(&paths.workflow_path)?;
        Ok(Self { paths, config })
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Create a plan and enter the workflow's initial phase.
    #[instrument(skip_all, fields(plan = id))]
    pub fn create_plan(&self, id: &str, reason: &str) -> Result<PlanHandle<'_>> {
        check_segment("plan", id)?;
        let plan_path = self.paths.plan_path(id);
        let _lock = FileLock::acquire(&plan_path)?;
        if plan_path.exists() {
            return Err(PhaseGraphError::PlanExists(id.to_string()).into());
        }

        let now = Utc::now();
        let (track, entered) = PhaseTrack::start(&self.config.workflow(), reason, now)?;
        ensure_iteration(
            &self
                .paths
                .iteration_path(id, &entered.phase, entered.iteration),
            &entered.phase,
            entered.iteration,
            now,
        )?;
        let plan = PlanRecord {
            id: id.to_string(),
            created_at: now,
            track,
            artifacts: Default::default(),
            dead_ends: Vec::new(),
        };
        write_plan(&plan_path, &plan)?;
        info!(plan = id, phase = %entered.phase, "plan created");
        Ok(PlanHandle::new(self, id))
    }

    pub fn list_plans(&self) -> Result<Vec<String>> {
        list_plans(&self.paths.plans_dir)
    }

    pub fn active_pointer(&self) -> Result<ActivePointer> {
        load_active(&self.paths.active_path)
    }

    /// Point the workspace at `plan_id`; `expected` is the last observed version.
    pub fn switch_active(&self, plan_id: &str, expected: Option<u64>) -> Result<ActivePointer> {
        self.plan(plan_id)?;
        switch_active(&self.paths.active_path, plan_id, expected)
    }

    /// Handle for an existing plan.
    pub fn plan(&self, id: &str) -> Result<PlanHandle<'_>> {
        check_segment("plan", id)?;
        if !self.paths.plan_path(id).is_file() {
            return Err(PhaseGraphError::not_found("plan", id).into());
        }
        Ok(PlanHandle::new(self, id))
    }

    /// Handle for the plan the active pointer names.
    pub fn active_plan(&self) -> Result<PlanHandle<'_>> {
        match self.active_pointer()?.plan_id {
            Some(id) => self.plan(&id),
            None => Err(PhaseGraphError::not_found("plan", "<active>").into()),
        }
    }
}

/// Summary of where a plan stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStatus {
    pub plan: String,
    pub active_phase: String,
    pub iteration: u32,
    pub finished: bool,
    pub completed: Vec<String>,
    pub tasks: usize,
    pub done: usize,
    pub blocked: usize,
}

/// Explicit handle on one plan of a workspace.
#[derive(Debug, Clone)]
pub struct PlanHandle<'w> {
    ws: &'w Workspace,
    id: String,
}

/// Loaded state of the active phase's current iteration.
#[derive(Debug, Clone)]
pub(crate) struct CurrentIteration {
    pub plan: PlanRecord,
    pub path: PathBuf,
    pub record: IterationRecord,
    pub store: StatusStore,
}

impl CurrentIteration {
    pub fn tasks(&self) -> &[Task] {
        &self.record.tasks
    }

    /// Declared task or `NotFound`.
    pub fn require_task(&self, id: &str) -> Result<&Task, PhaseGraphError> {
        self.record
            .task(id)
            .ok_or_else(|| PhaseGraphError::not_found("task", id))
    }

    pub fn records(&self) -> Result<HashMap<String, TaskRecord>> {
        self.store.load_all(&self.record.tasks)
    }
}

/// Status per declared task, as consumed by [`crate::core::graph::TaskGraph`].
pub(crate) fn statuses(records: &HashMap<String, TaskRecord>) -> HashMap<String, TaskStatus> {
    records
        .iter()
        .map(|(id, record)| (id.clone(), record.status))
        .collect()
}

impl<'w> PlanHandle<'w> {
    fn new(ws: &'w Workspace, id: &str) -> Self {
        Self {
            ws,
            id: id.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace(&self) -> &'w Workspace {
        self.ws
    }

    pub(crate) fn plan_path(&self) -> PathBuf {
        self.ws.paths.plan_path(&self.id)
    }

    pub fn load(&self) -> Result<PlanRecord> {
        load_plan(&self.plan_path())
    }

    pub(crate) fn write(&self, plan: &PlanRecord) -> Result<()> {
        write_plan(&self.plan_path(), plan)
    }

    pub(crate) fn iteration_path(&self, phase: &str, iteration: u32) -> PathBuf {
        self.ws.paths.iteration_path(&self.id, phase, iteration)
    }

    pub(crate) fn status_store(&self, phase: &str, iteration: u32) -> StatusStore {
        StatusStore::new(self.ws.paths.tasks_dir(&self.id, phase, iteration))
    }

    /// Load the active phase's current iteration.
    pub(crate) fn current(&self) -> Result<CurrentIteration> {
        let plan = self.load()?;
        let phase = plan.track.active.clone();
        let iteration = plan.track.current_iteration();
        let path = self.iteration_path(&phase, iteration);
        let record = load_iteration(&path)?;
        Ok(CurrentIteration {
            store: self.status_store(&phase, iteration),
            plan,
            path,
            record,
        })
    }

    pub fn status(&self) -> Result<PlanStatus> {
        let current = self.current()?;
        let records = current.records()?;
        let count = |status: TaskStatus| {
            records
                .values()
                .filter(|record| record.status == status)
                .count()
        };
        let mut completed = Vec::new();
        let mut seen = HashSet::new();
        for phase in &current.plan.track.completed {
            if seen.insert(phase.as_str()) {
                completed.push(phase.clone());
            }
        }
        Ok(PlanStatus {
            plan: self.id.clone(),
            active_phase: current.plan.track.active.clone(),
            iteration: current.plan.track.current_iteration(),
            finished: current.plan.track.finished,
            completed,
            tasks: current.record.tasks.len(),
            done: count(TaskStatus::Done),
            blocked: count(TaskStatus::Blocked),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorkspace;

    #[test]
    fn open_requires_initialized_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Workspace::open(temp.path()).unwrap_err();
        assert!(err.to_string().contains("phasegraph init"));
    }

    /// New plans start in the initial phase with an empty iteration 1 on disk.
    #[test]
    fn create_plan_enters_initial_phase() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("alpha", "kickoff").expect("create");

        let status = plan.status().expect("status");
        assert_eq!(status.active_phase, "discovery");
        assert_eq!(status.iteration, 1);
        assert_eq!(status.tasks, 0);
        assert!(tw.ws.paths().iteration_path("alpha", "discovery", 1).is_file());

        let err = tw.ws.create_plan("alpha", "again").unwrap_err();
        assert_eq!(
            err.downcast_ref::<PhaseGraphError>(),
            Some(&PhaseGraphError::PlanExists("alpha".into()))
        );
        assert_eq!(tw.ws.list_plans().expect("list"), vec!["alpha"]);
    }

    #[test]
    fn active_plan_follows_pointer() {
        let tw = TestWorkspace::new();
        assert!(tw.ws.active_plan().is_err());
        tw.ws.create_plan("alpha", "kickoff").expect("alpha");
        tw.ws.create_plan("beta", "kickoff").expect("beta");

        let pointer = tw.ws.switch_active("alpha", Some(0)).expect("switch");
        assert_eq!(tw.ws.active_plan().expect("active").id(), "alpha");

        tw.ws
            .switch_active("beta", Some(pointer.version))
            .expect("switch again");
        assert_eq!(tw.ws.active_plan().expect("active").id(), "beta");

        let err = tw.ws.switch_active("ghost", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PhaseGraphError>(),
            Some(PhaseGraphError::NotFound { kind: "plan", .. })
        ));
    }
}
