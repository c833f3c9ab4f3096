//! Task context assembly.
//!
//! Gathers everything a worker needs to execute one task: hint, description,
//! steps, parent outputs, prior progress and requested artifacts. Assembly is
//! a pure read over already-loaded state; artifacts are resolved through
//! [`ArtifactSource`] so nothing here touches the filesystem.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Serialize;

use crate::core::types::{Artifact, ArtifactLocator, ArtifactScope};
use crate::task::{EXECUTOR_PROMPT_HINT, Task, TaskRecord};

/// Name-to-artifact lookup used during context assembly.
pub trait ArtifactSource {
    fn resolve(&self, name: &str) -> Option<&Artifact>;
}

/// Two-level registry: phase scope shadows plan scope.
#[derive(Debug, Clone, Default)]
pub struct ScopedArtifacts<'a> {
    pub phase: Option<&'a BTreeMap<String, Artifact>>,
    pub plan: Option<&'a BTreeMap<String, Artifact>>,
}

impl ArtifactSource for ScopedArtifacts<'_> {
    fn resolve(&self, name: &str) -> Option<&Artifact> {
        self.phase
            .and_then(|artifacts| artifacts.get(name))
            .or_else(|| self.plan.and_then(|artifacts| artifacts.get(name)))
    }
}

impl ArtifactSource for BTreeMap<String, Artifact> {
    fn resolve(&self, name: &str) -> Option<&Artifact> {
        self.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentOutput {
    pub parent: String,
    pub output: String,
}

/// Requested artifact rendered for the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Injection {
    /// Inline content pasted into the prompt.
    Text {
        name: String,
        scope: ArtifactScope,
        text: String,
    },
    /// File the worker is told to read.
    Path {
        name: String,
        scope: ArtifactScope,
        path: PathBuf,
    },
}

/// Everything `build_task_prompt` renders, in render order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskContext {
    pub id: String,
    pub hint: Option<String>,
    pub description: String,
    pub steps: Vec<String>,
    pub parent_outputs: Vec<ParentOutput>,
    pub progress: Vec<String>,
    pub injections: Vec<Injection>,
}

/// Outputs of `task`'s parents in declaration order; parents without output are skipped.
pub fn parent_outputs(task: &Task, records: &HashMap<String, TaskRecord>) -> Vec<ParentOutput> {
    task.parents
        .iter()
        .filter_map(|parent| {
            let output = records.get(parent)?.output.as_deref()?;
            let trimmed = output.trim();
            (!trimmed.is_empty()).then(|| ParentOutput {
                parent: parent.clone(),
                output: trimmed.to_string(),
            })
        })
        .collect()
}

/// Resolve the executor hint: the task's own `executor_prompt` wins over the
/// workflow-level hint configured for its executor tag.
pub fn executor_hint(task: &Task, configured: &BTreeMap<String, String>) -> Option<String> {
    task.hints
        .get(EXECUTOR_PROMPT_HINT)
        .or_else(|| task.executor.as_ref().and_then(|tag| configured.get(tag)))
        .map(|hint| hint.trim().to_string())
        .filter(|hint| !hint.is_empty())
}

/// Assemble the context for `task`.
///
/// `records` holds status records of the iteration (the task's own record
/// supplies the progress log). Artifact names that are not yet recorded are
/// skipped.
pub fn assemble(
    task: &Task,
    records: &HashMap<String, TaskRecord>,
    artifacts: &impl ArtifactSource,
    configured_hints: &BTreeMap<String, String>,
) -> TaskContext {
    let progress: Vec<String> = records
        .get(&task.id)
        .map(|record| {
            record
                .log
                .iter()
                .map(|line| format!("[{}] {}", line.at.to_rfc3339(), line.message.trim()))
                .collect()
        })
        .unwrap_or_default();

    let injections: Vec<Injection> = task
        .context_artifacts
        .iter()
        .filter_map(|name| artifacts.resolve(name))
        .map(|artifact| match &artifact.locator {
            ArtifactLocator::Text(text) => Injection::Text {
                name: artifact.name.clone(),
                scope: artifact.scope,
                text: text.trim().to_string(),
            },
            ArtifactLocator::Path(path) => Injection::Path {
                name: artifact.name.clone(),
                scope: artifact.scope,
                path: path.clone(),
            },
        })
        .collect();

    TaskContext {
        id: task.id.clone(),
        hint: executor_hint(task, configured_hints),
        description: task.description.trim().to_string(),
        steps: task.steps.clone(),
        parent_outputs: parent_outputs(task, records),
        progress,
        injections,
    }
}
