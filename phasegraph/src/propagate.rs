//! Artifact registry and task prompt assembly for a plan.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::core::context::{ParentOutput, ScopedArtifacts, TaskContext, assemble, parent_outputs};
use crate::core::prompt::render_task_prompt;
use crate::core::types::{Artifact, ArtifactLocator, ArtifactScope};
use crate::io::iteration_store::{load_iteration, write_iteration};
use crate::io::lock::FileLock;
use crate::workspace::PlanHandle;

impl PlanHandle<'_> {
    /// Record (or overwrite) a named artifact.
    ///
    /// Phase scope lands in the active phase's current iteration; plan scope in
    /// the plan record.
    #[instrument(skip_all, fields(plan = %self.id(), scope = %scope, artifact = name))]
    pub fn record_artifact(
        &self,
        scope: ArtifactScope,
        name: &str,
        locator: ArtifactLocator,
    ) -> Result<Artifact> {
        if name.trim().is_empty() {
            bail!("artifact name must be non-empty");
        }
        let artifact = Artifact {
            name: name.to_string(),
            scope,
            locator,
            recorded_at: Utc::now(),
        };
        match scope {
            ArtifactScope::Plan => {
                let _lock = FileLock::acquire(&self.plan_path())?;
                let mut plan = self.load()?;
                plan.artifacts.insert(name.to_string(), artifact.clone());
                self.write(&plan)?;
            }
            ArtifactScope::Phase => {
                let current = self.current()?;
                let _lock = FileLock::acquire(&current.path)?;
                let mut record = load_iteration(&current.path)?;
                record.artifacts.insert(name.to_string(), artifact.clone());
                write_iteration(&current.path, &record)?;
            }
        }
        info!(artifact = name, %scope, "artifact recorded");
        Ok(artifact)
    }

    /// `(parent, output)` pairs of a task in parent declaration order.
    pub fn parent_outputs(&self, task_id: &str) -> Result<Vec<ParentOutput>> {
        let current = self.current()?;
        let task = current.require_task(task_id)?;
        let records = current.records()?;
        Ok(parent_outputs(task, &records))
    }

    /// Everything the prompt for `task_id` is rendered from.
    pub fn task_context(&self, task_id: &str) -> Result<TaskContext> {
        let current = self.current()?;
        let task = current.require_task(task_id)?;
        let records = current.records()?;
        let source = ScopedArtifacts {
            phase: Some(&current.record.artifacts),
            plan: Some(&current.plan.artifacts),
        };
        let hints = self.workspace().config().executor_hints();
        Ok(assemble(task, &records, &source, &hints))
    }

    /// Render the worker prompt for `task_id`. Reads only; repeated calls
    /// without intervening writes return identical text.
    pub fn build_task_prompt(&self, task_id: &str) -> Result<String> {
        let context = self.task_context(task_id)?;
        debug!(
            task = task_id,
            parents = context.parent_outputs.len(),
            injections = context.injections.len(),
            "rendering task prompt"
        );
        render_task_prompt(&context).with_context(|| format!("render prompt for task {task_id}"))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::task::TaskStatus;
    use crate::test_support::{TestWorkspace, task};

    /// Parent outputs and scoped artifacts flow into the child's prompt.
    #[test]
    fn prompt_carries_parent_outputs_and_artifacts() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        let mut child = task("child", &["parent"]);
        child.context_artifacts = vec!["notes".into(), "spec".into(), "later".into()];
        plan.add_tasks(vec![task("parent", &[]), child])
            .expect("add");

        plan.set_status("parent", TaskStatus::InProgress)
            .expect("claim");
        plan.record_output("parent", "schema: users(id, email)")
            .expect("output");
        plan.set_status("parent", TaskStatus::Done).expect("done");

        plan.record_artifact(
            ArtifactScope::Plan,
            "notes",
            ArtifactLocator::Text("plan-wide notes".into()),
        )
        .expect("plan notes");
        plan.record_artifact(
            ArtifactScope::Phase,
            "notes",
            ArtifactLocator::Text("phase notes".into()),
        )
        .expect("phase notes");
        plan.record_artifact(
            ArtifactScope::Phase,
            "spec",
            ArtifactLocator::Path(PathBuf::from("docs/spec.md")),
        )
        .expect("spec");

        let outputs = plan.parent_outputs("child").expect("outputs");
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].parent, "parent");

        let prompt = plan.build_task_prompt("child").expect("prompt");
        assert!(prompt.contains("schema: users(id, email)"));
        assert!(prompt.contains("phase notes"));
        assert!(!prompt.contains("plan-wide notes"));
        assert!(prompt.contains("`docs/spec.md`"));
        assert!(!prompt.contains("later"));
        assert_eq!(prompt, plan.build_task_prompt("child").expect("again"));
    }

    #[test]
    fn configured_executor_hint_leads_the_prompt() {
        let mut tw = TestWorkspace::new();
        tw.set_executor_hint("codex", "You are running inside codex.");
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        let mut t = task("t", &[]);
        t.executor = Some("codex".into());
        plan.add_task(t).expect("add");

        let prompt = plan.build_task_prompt("t").expect("prompt");
        assert!(prompt.starts_with("<executor>"));
        assert!(prompt.contains("You are running inside codex."));
    }

    #[test]
    fn resumed_task_prompt_includes_progress() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        plan.add_task(task("t", &[])).expect("add");
        let fresh = plan.build_task_prompt("t").expect("fresh");
        assert!(!fresh.contains("### Prior Progress"));

        plan.append_log("t", "wrote migrations").expect("log");
        let resumed = plan.build_task_prompt("t").expect("resumed");
        assert!(resumed.contains("### Prior Progress"));
        assert!(resumed.contains("wrote migrations"));
    }
}
