//! Canonical paths within `.phasegraph/` for a project root.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Name of the state directory created by `phasegraph init`.
pub const STATE_DIR: &str = ".phasegraph";

#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub workflow_path: PathBuf,
    pub active_path: PathBuf,
    pub schemas_dir: PathBuf,
    pub task_schema_path: PathBuf,
    pub plans_dir: PathBuf,
    pub research_dir: PathBuf,
    pub cache_path: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR);
        let schemas_dir = state_dir.join("schemas");
        let research_dir = state_dir.join("research");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            workflow_path: state_dir.join("workflow.toml"),
            active_path: state_dir.join("active.json"),
            task_schema_path: schemas_dir.join("task.schema.json"),
            schemas_dir,
            plans_dir: state_dir.join("plans"),
            cache_path: research_dir.join("cache.jsonl"),
            research_dir,
        }
    }

    pub fn plan_dir(&self, plan: &str) -> PathBuf {
        self.plans_dir.join(plan)
    }

    pub fn plan_path(&self, plan: &str) -> PathBuf {
        self.plan_dir(plan).join("plan.json")
    }

    pub fn iteration_dir(&self, plan: &str, phase: &str, iteration: u32) -> PathBuf {
        self.plan_dir(plan)
            .join("phases")
            .join(phase)
            .join(iteration.to_string())
    }

    pub fn iteration_path(&self, plan: &str, phase: &str, iteration: u32) -> PathBuf {
        self.iteration_dir(plan, phase, iteration)
            .join("iteration.json")
    }

    pub fn tasks_dir(&self, plan: &str, phase: &str, iteration: u32) -> PathBuf {
        self.iteration_dir(plan, phase, iteration).join("tasks")
    }
}

/// Lock file guarding read-modify-write of `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Reject ids that cannot be used verbatim as a single path component.
pub fn check_segment(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("{kind} id must be non-empty");
    }
    if id == "." || id == ".." || id.starts_with('.') {
        bail!("{kind} id '{id}' must not start with '.'");
    }
    if id
        .chars()
        .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
    {
        bail!("{kind} id '{id}' contains a path separator or control character");
    }
    Ok(())
}
