//! Initialization helpers for `.phasegraph/` scaffolding.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{WorkflowConfig, write_config};
use super::paths::StatePaths;
use super::plan_store::ActivePointer;
use super::store::{write_atomic, write_json_atomic};
use super::task_file::TASK_SCHEMA;

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite the workflow config and task schema.
    pub force: bool,
}

/// Create `.phasegraph/` scaffolding in `root`.
///
/// Fails if `.phasegraph/` already exists unless `options.force` is set.
/// Plans, the research cache and an existing active pointer are never
/// touched by a forced re-init, so pointer versions keep increasing.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<StatePaths> {
    let paths = StatePaths::new(root);
    if paths.state_dir.exists() && !options.force {
        return Err(anyhow!(
            "phasegraph init: .phasegraph already exists (use --force to overwrite)"
        ));
    }
    if paths.state_dir.exists() && !paths.state_dir.is_dir() {
        return Err(anyhow!(
            "phasegraph init: .phasegraph exists but is not a directory"
        ));
    }

    create_dir(&paths.state_dir)?;
    create_dir(&paths.schemas_dir)?;
    create_dir(&paths.plans_dir)?;
    create_dir(&paths.research_dir)?;

    write_config(&paths.workflow_path, &WorkflowConfig::default())?;
    write_atomic(&paths.task_schema_path, TASK_SCHEMA)?;
    if !paths.active_path.exists() {
        write_json_atomic(&paths.active_path, &ActivePointer::default())?;
    }

    info!(root = %root.display(), "workspace initialized");
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}
