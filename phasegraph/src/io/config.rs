//! Workflow configuration stored under `.phasegraph/workflow.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::paths::check_segment;
use super::store::write_atomic;
use crate::core::phase_machine::{PhaseSpec, Workflow};
use crate::core::scheduler::BlockPolicy;

/// Workflow configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to the built-in workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// What a blocked task does to the rest of its iteration.
    pub block_policy: BlockPolicy,

    /// Keyword overlap (percent of the smaller set) at which `dead-end check`
    /// reports a prior entry.
    pub dead_end_min_overlap_percent: u8,

    /// Result count used by `cache search` when no limit is given.
    pub cache_search_limit: usize,

    /// Executor tag -> configured prompt preamble.
    pub executors: BTreeMap<String, ExecutorConfig>,

    /// Declared phases; the first one is where new plans start.
    pub phases: Vec<PhaseSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub hint: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            block_policy: BlockPolicy::Halt,
            dead_end_min_overlap_percent: 50,
            cache_search_limit: 10,
            executors: BTreeMap::new(),
            phases: default_phases(),
        }
    }
}

impl WorkflowConfig {
    pub fn workflow(&self) -> Workflow<'_> {
        Workflow::new(&self.phases)
    }

    /// Configured hint per executor tag, as consumed by prompt assembly.
    pub fn executor_hints(&self) -> BTreeMap<String, String> {
        self.executors
            .iter()
            .map(|(tag, executor)| (tag.clone(), executor.hint.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = self.workflow().validate();
        for phase in &self.phases {
            if let Err(err) = check_segment("phase", &phase.id) {
                errors.push(err.to_string());
            }
        }
        if !(1..=100).contains(&self.dead_end_min_overlap_percent) {
            errors.push("dead_end_min_overlap_percent must be within 1..=100".to_string());
        }
        if self.cache_search_limit == 0 {
            errors.push("cache_search_limit must be > 0".to_string());
        }
        for (tag, executor) in &self.executors {
            if executor.hint.trim().is_empty() {
                errors.push(format!("executors.{tag}.hint must be non-empty"));
            }
        }
        if !errors.is_empty() {
            bail!("invalid workflow config:\n- {}", errors.join("\n- "));
        }
        Ok(())
    }
}

fn phase(
    id: &str,
    description: &str,
    transitions: &[&str],
    max_iterations: u32,
    required_artifacts: &[&str],
    min_confidence: Option<u8>,
) -> PhaseSpec {
    PhaseSpec {
        id: id.to_string(),
        description: description.to_string(),
        transitions: transitions.iter().map(|t| t.to_string()).collect(),
        max_iterations,
        required_artifacts: required_artifacts.iter().map(|a| a.to_string()).collect(),
        min_confidence,
    }
}

/// discovery -> design -> implement -> review -> complete, with loopbacks.
fn default_phases() -> Vec<PhaseSpec> {
    vec![
        phase(
            "discovery",
            "Research the problem space and record findings.",
            &["design"],
            2,
            &["findings"],
            None,
        ),
        phase(
            "design",
            "Decide the approach and break it into tasks.",
            &["implement", "discovery"],
            2,
            &["design"],
            None,
        ),
        phase(
            "implement",
            "Execute the task graph.",
            &["implement", "review"],
            3,
            &[],
            None,
        ),
        phase(
            "review",
            "Verify the result before closing the plan.",
            &["complete", "implement", "design"],
            2,
            &[],
            Some(3),
        ),
        phase("complete", "Plan finished.", &[], 0, &[], None),
    ]
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WorkflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<WorkflowConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "workflow config missing, using defaults");
        let cfg = WorkflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WorkflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), phases = cfg.phases.len(), "workflow config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WorkflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize workflow toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, WorkflowConfig::default());
        assert_eq!(cfg.workflow().initial().expect("initial").id, "discovery");
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("workflow.toml");
        let mut cfg = WorkflowConfig::default();
        cfg.block_policy = BlockPolicy::Descendants;
        cfg.executors.insert(
            "codex".to_string(),
            ExecutorConfig {
                hint: "You are running inside codex.".to_string(),
            },
        );
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    /// Partial files fill the rest from defaults.
    #[test]
    fn partial_file_uses_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("workflow.toml");
        fs::write(
            &path,
            r#"
block_policy = "descendants"

[[phases]]
id = "only"
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.block_policy, BlockPolicy::Descendants);
        assert_eq!(cfg.cache_search_limit, 10);
        assert_eq!(cfg.phases.len(), 1);
        assert_eq!(cfg.phases[0].max_iterations, 3);
        assert!(cfg.phases[0].is_terminal());
    }

    #[test]
    fn validate_rejects_unknown_transition_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("workflow.toml");
        fs::write(
            &path,
            r#"
[[phases]]
id = "a"
transitions = ["ghost"]
"#,
        )
        .expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("unknown phase 'ghost'"));
    }
}
