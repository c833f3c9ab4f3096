//! Scheduling helpers for `phasegraph schedule` and `phasegraph next`.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::core::graph::TaskGraph;
use crate::core::scheduler::{Schedule, schedule};
use crate::workspace::{PlanHandle, statuses};

/// Structured answer to "what should workers do now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum WorkOutcome {
    /// At least one task may start.
    Ready { phase: String, iteration: u32, schedule: Schedule },
    /// Nothing may start yet, but tasks are running or waiting on locks.
    Waiting {
        phase: String,
        iteration: u32,
        in_progress: Vec<String>,
        schedule: Schedule,
    },
    /// A blocked task halts new starts in the iteration.
    Halted { phase: String, iteration: u32, blocked: Vec<String> },
    /// Every task of the iteration is done; the phase is ready to transition.
    IterationComplete { phase: String, iteration: u32 },
    /// The iteration declares no tasks yet.
    Empty { phase: String, iteration: u32 },
    /// The plan sits in a terminal phase.
    PlanFinished { phase: String },
}

impl PlanHandle<'_> {
    /// Concurrency groups for the current iteration under the configured policy.
    pub fn schedule(&self) -> Result<Schedule> {
        let current = self.current()?;
        let records = current.records()?;
        let statuses = statuses(&records);
        let graph = TaskGraph::new(current.tasks(), &statuses);
        Ok(schedule(&graph, self.workspace().config().block_policy))
    }

    /// Classify the current iteration into a [`WorkOutcome`].
    pub fn next_work(&self) -> Result<WorkOutcome> {
        let current = self.current()?;
        let phase = current.plan.track.active.clone();
        let iteration = current.plan.track.current_iteration();
        if current.plan.track.finished {
            return Ok(WorkOutcome::PlanFinished { phase });
        }
        if current.tasks().is_empty() {
            return Ok(WorkOutcome::Empty { phase, iteration });
        }

        let records = current.records()?;
        let statuses = statuses(&records);
        let graph = TaskGraph::new(current.tasks(), &statuses);
        if graph.is_complete() {
            return Ok(WorkOutcome::IterationComplete { phase, iteration });
        }

        let schedule = schedule(&graph, self.workspace().config().block_policy);
        debug!(
            groups = schedule.groups.len(),
            deferred = schedule.deferred.len(),
            halted = schedule.is_halted(),
            "schedule computed"
        );
        if schedule.is_halted() {
            return Ok(WorkOutcome::Halted {
                phase,
                iteration,
                blocked: schedule.halted_by,
            });
        }
        if !schedule.startable().is_empty() {
            return Ok(WorkOutcome::Ready {
                phase,
                iteration,
                schedule,
            });
        }
        let in_progress = graph
            .in_progress()
            .into_iter()
            .map(|task| task.id.clone())
            .collect();
        Ok(WorkOutcome::Waiting {
            phase,
            iteration,
            in_progress,
            schedule,
        })
    }
}
