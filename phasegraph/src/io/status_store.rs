//! Per-task status records of one iteration.
//!
//! Each record lives in its own file (`tasks/<task>.json`) so a write touches
//! exactly one task. Claims (`todo -> in-progress`) happen under the record
//! lock and leave a `<task>.claim` marker naming the claimant's pid. A marker
//! found next to a record that still reads `todo` belongs to a claimant that
//! died before writing its record and is replaced.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::lock::FileLock;
use super::store::{read_json_opt, write_json_atomic};
use crate::error::PhaseGraphError;
use crate::task::{Confidence, LogLine, Task, TaskRecord, TaskStatus};

#[derive(Debug, Clone)]
pub struct StatusStore {
    tasks_dir: PathBuf,
}

impl StatusStore {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
        }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{id}.json"))
    }

    fn claim_path(&self, id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{id}.claim"))
    }

    /// Stored record for `id`, or a fresh `todo` record if none was written yet.
    pub fn load(&self, id: &str) -> Result<TaskRecord> {
        Ok(read_json_opt(&self.record_path(id))?.unwrap_or_else(|| TaskRecord::fresh(id)))
    }

    /// Records for every declared task, keyed by id.
    pub fn load_all(&self, tasks: &[Task]) -> Result<HashMap<String, TaskRecord>> {
        tasks
            .iter()
            .map(|task| Ok((task.id.clone(), self.load(&task.id)?)))
            .collect()
    }

    /// Apply a status edge; illegal edges and lost claims leave the record untouched.
    pub fn set_status(&self, id: &str, next: TaskStatus, now: DateTime<Utc>) -> Result<TaskRecord> {
        let _lock = FileLock::acquire(&self.record_path(id))?;
        let mut record = self.load(id)?;
        let from = record.status;
        if !from.can_transition_to(next) {
            return Err(PhaseGraphError::InvalidTransition {
                task: id.to_string(),
                from,
                to: next,
            }
            .into());
        }

        let claiming = from == TaskStatus::Todo && next == TaskStatus::InProgress;
        if claiming {
            self.claim(id)?;
        }

        record.status = next;
        record.updated_at = Some(now);
        if let Err(err) = self.write(&record) {
            if claiming {
                self.release(id)?;
            }
            return Err(err);
        }
        if from == TaskStatus::Blocked && next == TaskStatus::Todo {
            self.release(id)?;
        }
        info!(task = id, %from, to = %next, "task status changed");
        Ok(record)
    }

    pub fn append_log(&self, id: &str, message: &str, now: DateTime<Utc>) -> Result<TaskRecord> {
        self.update(id, now, |record| {
            record.log.push(LogLine {
                at: now,
                message: message.to_string(),
            });
        })
    }

    pub fn record_confidence(
        &self,
        id: &str,
        score: u8,
        rationale: &str,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord> {
        if !(1..=5).contains(&score) {
            return Err(PhaseGraphError::InvalidConfidence(score).into());
        }
        self.update(id, now, |record| {
            record.confidence = Some(Confidence {
                score,
                rationale: rationale.to_string(),
            });
        })
    }

    pub fn record_output(&self, id: &str, output: &str, now: DateTime<Utc>) -> Result<TaskRecord> {
        self.update(id, now, |record| record.output = Some(output.to_string()))
    }

    fn update(
        &self,
        id: &str,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut TaskRecord),
    ) -> Result<TaskRecord> {
        let _lock = FileLock::acquire(&self.record_path(id))?;
        let mut record = self.load(id)?;
        apply(&mut record);
        record.updated_at = Some(now);
        self.write(&record)?;
        Ok(record)
    }

    fn write(&self, record: &TaskRecord) -> Result<()> {
        debug!(task = %record.id, status = %record.status, "writing task record");
        write_json_atomic(&self.record_path(&record.id), record)
    }

    /// Write the claim marker. Callers hold the record lock and have just read
    /// the record as `todo`.
    fn claim(&self, id: &str) -> Result<()> {
        let path = self.claim_path(id);
        fs::create_dir_all(&self.tasks_dir)
            .with_context(|| format!("create directory {}", self.tasks_dir.display()))?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                warn!(
                    task = id,
                    holder = holder.trim(),
                    "replacing stale claim marker of a todo task"
                );
                OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(&path)
                    .with_context(|| format!("replace claim {}", path.display()))?
            }
            Err(err) => {
                return Err(err).with_context(|| format!("create claim {}", path.display()));
            }
        };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("write claim {}", path.display()))?;
        Ok(())
    }

    fn release(&self, id: &str) -> Result<()> {
        remove_if_present(&self.claim_path(id))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixed_now;

    fn store() -> (tempfile::TempDir, StatusStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = StatusStore::new(temp.path().join("tasks"));
        (temp, store)
    }

    fn rejected(err: anyhow::Error) -> PhaseGraphError {
        err.downcast::<PhaseGraphError>().expect("typed error")
    }

    #[test]
    fn unknown_record_reads_as_todo() {
        let (_temp, store) = store();
        assert_eq!(store.load("a").expect("load"), TaskRecord::fresh("a"));
    }

    /// Only the four legal edges are accepted; a rejected edge leaves the record as is.
    #[test]
    fn illegal_edges_are_rejected() {
        let (_temp, store) = store();
        let err = store
            .set_status("a", TaskStatus::Done, fixed_now())
            .unwrap_err();
        assert_eq!(
            rejected(err),
            PhaseGraphError::InvalidTransition {
                task: "a".into(),
                from: TaskStatus::Todo,
                to: TaskStatus::Done
            }
        );
        assert_eq!(store.load("a").expect("load").status, TaskStatus::Todo);

        store
            .set_status("a", TaskStatus::InProgress, fixed_now())
            .expect("claim");
        store
            .set_status("a", TaskStatus::Done, fixed_now())
            .expect("done");
        assert!(
            store
                .set_status("a", TaskStatus::Todo, fixed_now())
                .is_err()
        );
        assert_eq!(store.load("a").expect("load").status, TaskStatus::Done);
    }

    /// A second claimant loses once the first has written `in-progress`.
    #[test]
    fn second_claim_is_rejected() {
        let (_temp, store) = store();
        store
            .set_status("a", TaskStatus::InProgress, fixed_now())
            .expect("first claim");

        let err = store
            .set_status("a", TaskStatus::InProgress, fixed_now())
            .unwrap_err();
        assert_eq!(
            rejected(err),
            PhaseGraphError::InvalidTransition {
                task: "a".into(),
                from: TaskStatus::InProgress,
                to: TaskStatus::InProgress
            }
        );
    }

    /// A claimant that died between marker and record write does not wedge the task.
    #[test]
    fn stale_claim_marker_is_replaced() {
        let (_temp, store) = store();
        store.claim("a").expect("orphaned marker");
        assert_eq!(store.load("a").expect("load").status, TaskStatus::Todo);

        let record = store
            .set_status("a", TaskStatus::InProgress, fixed_now())
            .expect("claim over stale marker");
        assert_eq!(record.status, TaskStatus::InProgress);
        let holder = fs::read_to_string(store.claim_path("a")).expect("marker");
        assert_eq!(holder.trim(), std::process::id().to_string());
    }

    /// A claim racing a held record lock fails fast and writes nothing.
    #[test]
    fn held_record_lock_fails_fast() {
        let (_temp, store) = store();
        fs::create_dir_all(&store.tasks_dir).expect("mkdir");
        let _held = FileLock::acquire(&store.record_path("a")).expect("lock");

        let err = store
            .set_status("a", TaskStatus::InProgress, fixed_now())
            .unwrap_err();
        assert!(err.to_string().contains("busy"));
        assert!(!store.claim_path("a").exists());
    }

    /// Blocked -> todo releases the claim so the task can be picked up again.
    #[test]
    fn reset_releases_claim() {
        let (_temp, store) = store();
        store
            .set_status("a", TaskStatus::InProgress, fixed_now())
            .expect("claim");
        store
            .set_status("a", TaskStatus::Blocked, fixed_now())
            .expect("block");
        store
            .set_status("a", TaskStatus::Todo, fixed_now())
            .expect("reset");
        store
            .set_status("a", TaskStatus::InProgress, fixed_now())
            .expect("reclaim");
    }

    #[test]
    fn log_confidence_and_output_do_not_touch_status() {
        let (_temp, store) = store();
        store.append_log("a", "first", fixed_now()).expect("log");
        store.append_log("a", "second", fixed_now()).expect("log");
        store
            .record_confidence("a", 4, "tests pass", fixed_now())
            .expect("confidence");
        let record = store.record_output("a", "done: x", fixed_now()).expect("output");

        assert_eq!(record.status, TaskStatus::Todo);
        let messages: Vec<&str> = record.log.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(record.confidence.as_ref().map(|c| c.score), Some(4));
        assert_eq!(record.output.as_deref(), Some("done: x"));

        let err = store
            .record_confidence("a", 6, "too sure", fixed_now())
            .unwrap_err();
        assert_eq!(rejected(err), PhaseGraphError::InvalidConfidence(6));
        assert_eq!(
            store.load("a").expect("load").confidence.map(|c| c.score),
            Some(4)
        );
    }
}
