//! Phase transitions for a plan.
//!
//! Each verb locks the plan record, applies the transition to the in-memory
//! [`PhaseTrack`], creates the entered iteration on disk when it is new and
//! only then replaces `plan.json`. A rejected transition writes nothing.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument};

use crate::core::phase_machine::{Entered, ExitGate, PhaseTrack};
use crate::core::types::HistoryEntry;
use crate::io::iteration_store::{ensure_iteration, load_iteration};
use crate::io::lock::FileLock;
use crate::io::plan_store::PlanRecord;
use crate::workspace::PlanHandle;

impl PlanHandle<'_> {
    /// Leave the active phase along a declared transition.
    #[instrument(skip_all, fields(plan = %self.id(), to = target))]
    pub fn advance(&self, target: &str, reason: &str) -> Result<Entered> {
        self.transition(|plan, handle| {
            let gate = handle.exit_gate(plan)?;
            let workflow = handle.workspace().config().workflow();
            Ok(plan
                .track
                .advance(&workflow, target, &gate, reason, Utc::now())?)
        })
    }

    /// Start a fresh iteration of the active phase.
    #[instrument(skip_all, fields(plan = %self.id()))]
    pub fn loop_phase(&self, reason: &str) -> Result<Entered> {
        self.transition(|plan, handle| {
            let workflow = handle.workspace().config().workflow();
            Ok(plan.track.loop_phase(&workflow, reason, Utc::now())?)
        })
    }

    /// Return to `target` in a fresh iteration. An unvisited target must pass
    /// the active phase's exit gate.
    #[instrument(skip_all, fields(plan = %self.id(), to = target))]
    pub fn loop_to_phase(&self, target: &str, reason: &str) -> Result<Entered> {
        self.transition(|plan, handle| {
            let gate = handle.exit_gate(plan)?;
            let workflow = handle.workspace().config().workflow();
            Ok(plan
                .track
                .loop_to(&workflow, target, &gate, reason, Utc::now())?)
        })
    }

    /// Every transition of the plan in sequence order.
    pub fn phase_history(&self) -> Result<Vec<HistoryEntry>> {
        let plan = self.load()?;
        Ok(plan.track.history().into_iter().cloned().collect())
    }

    /// Phase pointer and iteration counters of the plan.
    pub fn phase_track(&self) -> Result<PhaseTrack> {
        Ok(self.load()?.track)
    }

    fn transition(
        &self,
        apply: impl FnOnce(&mut PlanRecord, &Self) -> Result<Entered>,
    ) -> Result<Entered> {
        let plan_path = self.plan_path();
        let _lock = FileLock::acquire(&plan_path)?;
        let mut plan = self.load()?;
        let from = plan.track.active.clone();
        let entered = apply(&mut plan, self)?;

        if entered.fresh {
            ensure_iteration(
                &self.iteration_path(&entered.phase, entered.iteration),
                &entered.phase,
                entered.iteration,
                Utc::now(),
            )?;
        }
        self.write(&plan)?;
        info!(
            from = %from,
            to = %entered.phase,
            iteration = entered.iteration,
            kind = ?entered.kind,
            finished = plan.track.finished,
            "phase transition"
        );
        Ok(entered)
    }

    /// Artifacts and confidences that decide whether the active phase may be left.
    fn exit_gate(&self, plan: &PlanRecord) -> Result<ExitGate> {
        let phase = &plan.track.active;
        let iteration = plan.track.current_iteration();
        let record = load_iteration(&self.iteration_path(phase, iteration))?;
        let records = self
            .status_store(phase, iteration)
            .load_all(&record.tasks)?;

        let mut recorded_artifacts: BTreeSet<String> = record.artifacts.keys().cloned().collect();
        recorded_artifacts.extend(plan.artifacts.keys().cloned());
        let confidences = record
            .tasks
            .iter()
            .filter_map(|task| {
                let score = records.get(&task.id)?.confidence.as_ref()?.score;
                Some((task.id.clone(), score))
            })
            .collect();
        Ok(ExitGate {
            recorded_artifacts,
            confidences,
        })
    }
}
