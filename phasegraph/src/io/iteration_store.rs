//! Iteration records: the tasks and phase-scope artifacts of one phase iteration.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::{read_json, write_json_atomic};
use crate::core::types::Artifact;
use crate::task::Task;

/// Persisted iteration (`phases/<phase>/<n>/iteration.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub phase: String,
    pub iteration: u32,
    /// Declared tasks in declaration order; append-only.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Phase-scope artifacts of this iteration.
    #[serde(default)]
    pub artifacts: BTreeMap<String, Artifact>,
    pub created_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn empty(phase: impl Into<String>, iteration: u32, now: DateTime<Utc>) -> Self {
        Self {
            phase: phase.into(),
            iteration,
            tasks: Vec::new(),
            artifacts: BTreeMap::new(),
            created_at: now,
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

pub fn load_iteration(path: &Path) -> Result<IterationRecord> {
    debug!(path = %path.display(), "loading iteration");
    read_json(path)
}

pub fn write_iteration(path: &Path, iteration: &IterationRecord) -> Result<()> {
    debug!(
        path = %path.display(),
        phase = %iteration.phase,
        iteration = iteration.iteration,
        tasks = iteration.tasks.len(),
        "writing iteration"
    );
    write_json_atomic(path, iteration)
}

/// Write an empty iteration unless one already exists at `path`.
///
/// Returns true when a new record was written.
pub fn ensure_iteration(
    path: &Path,
    phase: &str,
    iteration: u32,
    now: DateTime<Utc>,
) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_iteration(path, &IterationRecord::empty(phase, iteration, now))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixed_now, task};

    /// An existing iteration is never replaced by an empty one.
    #[test]
    fn ensure_keeps_existing_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("design/1/iteration.json");

        assert!(ensure_iteration(&path, "design", 1, fixed_now()).expect("create"));
        let mut record = load_iteration(&path).expect("load");
        record.tasks.push(task("a", &[]));
        write_iteration(&path, &record).expect("write");

        assert!(!ensure_iteration(&path, "design", 1, fixed_now()).expect("ensure"));
        assert_eq!(load_iteration(&path).expect("reload").tasks.len(), 1);
    }
}
