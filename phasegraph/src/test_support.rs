//! Test-only helpers for constructing tasks, phases and temp workspaces.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::phase_machine::PhaseSpec;
use crate::core::scheduler::BlockPolicy;
use crate::core::types::{Artifact, ArtifactLocator, ArtifactScope, CacheEntry, DeadEnd, Origin};
use crate::io::config::{ExecutorConfig, WorkflowConfig, load_config, write_config};
use crate::io::init::{InitOptions, init_workspace};
use crate::io::research_cache::entry_id;
use crate::task::Task;
use crate::workspace::Workspace;

/// Fixed timestamp so records compare equal across runs.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
        .single()
        .expect("valid fixed timestamp")
}

/// Create a deterministic task with the given parents and no locks.
pub fn task(id: &str, parents: &[&str]) -> Task {
    let mut task = Task::new(id, format!("{id} description"));
    task.parents = parents.iter().map(|p| p.to_string()).collect();
    task
}

/// Create a task holding `locks`.
pub fn locked_task(id: &str, parents: &[&str], locks: &[&str]) -> Task {
    let mut task = task(id, parents);
    task.locks = locks.iter().map(|l| l.to_string()).collect::<BTreeSet<_>>();
    task
}

/// Create a phase declaration with no confidence gate.
pub fn phase(
    id: &str,
    transitions: &[&str],
    max_iterations: u32,
    required_artifacts: &[&str],
) -> PhaseSpec {
    PhaseSpec {
        id: id.to_string(),
        description: String::new(),
        transitions: transitions.iter().map(|t| t.to_string()).collect(),
        max_iterations,
        required_artifacts: required_artifacts.iter().map(|a| a.to_string()).collect(),
        min_confidence: None,
    }
}

pub fn text_artifact(name: &str, scope: ArtifactScope, text: &str) -> Artifact {
    Artifact {
        name: name.to_string(),
        scope,
        locator: ArtifactLocator::Text(text.to_string()),
        recorded_at: fixed_now(),
    }
}

pub fn cache_entry(query: &str, findings: &str) -> CacheEntry {
    CacheEntry {
        id: entry_id("test", query, findings),
        query: query.to_string(),
        findings: findings.to_string(),
        source_type: "web".to_string(),
        source_url: None,
        plan_id: "test".to_string(),
        recorded_at: fixed_now(),
    }
}

pub fn dead_end(approach: &str, reason: &str) -> DeadEnd {
    DeadEnd {
        approach: approach.to_string(),
        reason: reason.to_string(),
        origin: Origin {
            phase: "design".to_string(),
            iteration: 1,
            task: None,
        },
        recorded_at: fixed_now(),
    }
}

/// Initialized workspace in a temp directory, removed on drop.
pub struct TestWorkspace {
    pub temp: TempDir,
    pub ws: Workspace,
}

impl TestWorkspace {
    /// Workspace with the default workflow.
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        init_workspace(temp.path(), &InitOptions { force: false }).expect("init workspace");
        let ws = Workspace::open(temp.path()).expect("open workspace");
        Self { temp, ws }
    }

    /// Workspace whose workflow declares exactly `phases`.
    pub fn with_phases(phases: Vec<PhaseSpec>) -> Self {
        let mut tw = Self::new();
        tw.edit_config(|cfg| cfg.phases = phases);
        tw
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn set_block_policy(&mut self, policy: BlockPolicy) {
        self.edit_config(|cfg| cfg.block_policy = policy);
    }

    pub fn set_executor_hint(&mut self, tag: &str, hint: &str) {
        self.edit_config(|cfg| {
            cfg.executors.insert(
                tag.to_string(),
                ExecutorConfig {
                    hint: hint.to_string(),
                },
            );
        });
    }

    /// Rewrite `workflow.toml` and reopen the workspace.
    pub fn edit_config(&mut self, edit: impl FnOnce(&mut WorkflowConfig)) {
        let path = self.ws.paths().workflow_path.clone();
        let mut cfg = load_config(&path).expect("load config");
        edit(&mut cfg);
        write_config(&path, &cfg).expect("write config");
        self.ws = Workspace::open(self.temp.path()).expect("reopen workspace");
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
