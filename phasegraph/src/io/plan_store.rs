//! Plan records and the workspace's active-plan pointer.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::lock::FileLock;
use super::store::{read_json, read_json_opt, write_json_atomic};
use crate::core::phase_machine::PhaseTrack;
use crate::core::types::{Artifact, DeadEnd};
use crate::error::PhaseGraphError;

/// Persisted plan (`plans/<plan>/plan.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub track: PhaseTrack,
    /// Plan-scope artifacts.
    #[serde(default)]
    pub artifacts: BTreeMap<String, Artifact>,
    /// Dead-end ledger, append-only.
    #[serde(default)]
    pub dead_ends: Vec<DeadEnd>,
}

pub fn load_plan(path: &Path) -> Result<PlanRecord> {
    debug!(path = %path.display(), "loading plan");
    read_json(path)
}

pub fn write_plan(path: &Path, plan: &PlanRecord) -> Result<()> {
    debug!(
        path = %path.display(),
        active = %plan.track.active,
        seq = plan.track.next_seq,
        "writing plan"
    );
    write_json_atomic(path, plan)
}

/// Plan ids under `plans_dir` that hold a plan record, sorted.
pub fn list_plans(plans_dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(plans_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("list plans {}", plans_dir.display()));
        }
    };
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list plans {}", plans_dir.display()))?;
        if entry.path().join("plan.json").is_file() {
            ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Versioned pointer to the workspace's active plan (`active.json`).
///
/// Every successful switch bumps `version`; a switch naming a stale version
/// is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ActivePointer {
    pub plan_id: Option<String>,
    pub version: u64,
}

/// Load the pointer; a missing file means no active plan yet.
pub fn load_active(path: &Path) -> Result<ActivePointer> {
    Ok(read_json_opt(path)?.unwrap_or_default())
}

/// Compare-and-swap the active plan.
///
/// `expected` is the version the caller last observed; `None` skips the
/// comparison. The pointer file is locked for the duration of the swap and a
/// held lock fails fast.
pub fn switch_active(path: &Path, plan_id: &str, expected: Option<u64>) -> Result<ActivePointer> {
    let _lock = FileLock::acquire(path)?;
    let current = load_active(path)?;
    if let Some(expected) = expected {
        if expected != current.version {
            return Err(PhaseGraphError::StaleActivePointer {
                expected,
                actual: current.version,
            }
            .into());
        }
    }
    let next = ActivePointer {
        plan_id: Some(plan_id.to_string()),
        version: current.version + 1,
    };
    write_json_atomic(path, &next)?;
    info!(plan = plan_id, version = next.version, "active plan switched");
    Ok(next)
}
