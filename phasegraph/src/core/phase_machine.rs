//! Phase-level state machine.
//!
//! A plan moves through the phases declared in its workflow. Each phase owns
//! numbered iterations; a self-loop or a loop back from a later phase starts a
//! fresh iteration instead of rewriting the old one. Every method validates
//! first and mutates only when the whole transition is legal.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{HistoryEntry, TransitionKind};
use crate::error::PhaseGraphError;

fn default_max_iterations() -> u32 {
    3
}

/// Workflow declaration of a single phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Declared outgoing targets; may include the phase itself. Empty means terminal.
    #[serde(default)]
    pub transitions: Vec<String>,
    /// How many times the phase may be looped (self or cross-phase).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub required_artifacts: Vec<String>,
    /// Lowest recorded task confidence tolerated when leaving the phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<u8>,
}

impl PhaseSpec {
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn allows(&self, target: &str) -> bool {
        self.transitions.iter().any(|t| t == target)
    }
}

/// Borrowed view over the declared phases. The first phase is the entry point.
#[derive(Debug, Clone, Copy)]
pub struct Workflow<'a> {
    phases: &'a [PhaseSpec],
}

impl<'a> Workflow<'a> {
    pub fn new(phases: &'a [PhaseSpec]) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &'a [PhaseSpec] {
        self.phases
    }

    pub fn initial(&self) -> Result<&'a PhaseSpec, PhaseGraphError> {
        self.phases
            .first()
            .ok_or_else(|| PhaseGraphError::not_found("phase", "<initial>"))
    }

    pub fn phase(&self, id: &str) -> Result<&'a PhaseSpec, PhaseGraphError> {
        self.phases
            .iter()
            .find(|phase| phase.id == id)
            .ok_or_else(|| PhaseGraphError::not_found("phase", id))
    }

    /// Structural problems in the declaration, as stable messages.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.phases.is_empty() {
            errors.push("workflow declares no phases".to_string());
        }
        let mut seen = BTreeSet::new();
        for phase in self.phases {
            if phase.id.trim().is_empty() {
                errors.push("phase id must be non-empty".to_string());
            }
            if !seen.insert(phase.id.as_str()) {
                errors.push(format!("duplicate phase id '{}'", phase.id));
            }
            for target in &phase.transitions {
                if !self.phases.iter().any(|p| &p.id == target) {
                    errors.push(format!(
                        "phase '{}' transitions to unknown phase '{}'",
                        phase.id, target
                    ));
                }
            }
            if let Some(min) = phase.min_confidence {
                if !(1..=5).contains(&min) {
                    errors.push(format!(
                        "phase '{}': min_confidence {} outside 1..=5",
                        phase.id, min
                    ));
                }
            }
        }
        errors
    }
}

/// Per-plan state of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Number of the phase's current iteration (1-based).
    pub iteration: u32,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl PhaseState {
    /// Loops consumed so far; only loops create iterations past the first.
    pub fn loops(&self) -> u32 {
        self.iteration.saturating_sub(1)
    }
}

/// Where the plan ended up after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entered {
    pub phase: String,
    pub iteration: u32,
    pub kind: TransitionKind,
    /// True when `iteration` did not exist before and must be created empty.
    pub fresh: bool,
}

/// Inputs checked before the active phase may be left by `advance`.
#[derive(Debug, Clone, Default)]
pub struct ExitGate {
    /// Artifact names recorded at phase scope (current iteration) or plan scope.
    pub recorded_artifacts: BTreeSet<String>,
    /// `(task id, score)` for every task of the current iteration with a recorded confidence.
    pub confidences: Vec<(String, u8)>,
}

/// Phase pointer, per-phase iterations and transition history of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTrack {
    pub active: String,
    #[serde(default)]
    pub finished: bool,
    pub phases: BTreeMap<String, PhaseState>,
    /// Phases left through `advance`, in order.
    #[serde(default)]
    pub completed: Vec<String>,
    pub next_seq: u64,
}

impl PhaseTrack {
    /// Enter the workflow's initial phase at iteration 1.
    pub fn start(
        workflow: &Workflow<'_>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(Self, Entered), PhaseGraphError> {
        let initial = workflow.initial()?;
        let mut track = Self {
            active: initial.id.clone(),
            finished: false,
            phases: BTreeMap::new(),
            completed: Vec::new(),
            next_seq: 0,
        };
        let entered = track.enter(
            workflow,
            &initial.id,
            None,
            TransitionKind::Start,
            reason,
            now,
        );
        Ok((track, entered))
    }

    pub fn active_state(&self) -> Result<&PhaseState, PhaseGraphError> {
        self.phases
            .get(&self.active)
            .ok_or_else(|| PhaseGraphError::not_found("phase", self.active.clone()))
    }

    pub fn current_iteration(&self) -> u32 {
        self.phases
            .get(&self.active)
            .map(|state| state.iteration)
            .unwrap_or(0)
    }

    /// Move forward along a declared transition once the exit gate passes.
    pub fn advance(
        &mut self,
        workflow: &Workflow<'_>,
        target: &str,
        gate: &ExitGate,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Entered, PhaseGraphError> {
        let current = self.guard_open(workflow)?;
        workflow.phase(target)?;
        if !current.allows(target) {
            return Err(PhaseGraphError::IllegalPhaseTransition {
                from: current.id.clone(),
                to: target.to_string(),
            });
        }

        check_exit_gate(current, gate)?;

        if target == current.id {
            // Advancing onto itself is a self-loop through a declared edge.
            return self.loop_phase(workflow, reason, now);
        }

        let from = current.id.clone();
        self.completed.push(from.clone());
        Ok(self.enter(
            workflow,
            target,
            Some(from),
            TransitionKind::Advance,
            reason,
            now,
        ))
    }

    /// Start a fresh iteration of the active phase.
    pub fn loop_phase(
        &mut self,
        workflow: &Workflow<'_>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Entered, PhaseGraphError> {
        let current = self.guard_open(workflow)?;
        self.check_loop_budget(current)?;
        let id = current.id.clone();
        Ok(self.enter(
            workflow,
            &id,
            Some(id.clone()),
            TransitionKind::SelfLoop,
            reason,
            now,
        ))
    }

    /// Return to an earlier (or declared) phase, always in a fresh iteration.
    ///
    /// A visited phase is re-entered without checking the exit gate. An
    /// unvisited target is only reachable through a declared edge and must
    /// pass the same gate as `advance`. Terminal phases are never entered
    /// this way.
    pub fn loop_to(
        &mut self,
        workflow: &Workflow<'_>,
        target: &str,
        gate: &ExitGate,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Entered, PhaseGraphError> {
        let current = self.guard_open(workflow)?;
        let target_spec = workflow.phase(target)?;
        let visited = self.phases.contains_key(target);
        if target == current.id
            || target_spec.is_terminal()
            || !(visited || current.allows(target))
        {
            return Err(PhaseGraphError::IllegalPhaseTransition {
                from: current.id.clone(),
                to: target.to_string(),
            });
        }
        if visited {
            self.check_loop_budget(target_spec)?;
        } else {
            check_exit_gate(current, gate)?;
        }
        let from = current.id.clone();
        Ok(self.enter(
            workflow,
            target,
            Some(from),
            TransitionKind::LoopBack,
            reason,
            now,
        ))
    }

    /// Every history entry of the plan, ordered by sequence number.
    pub fn history(&self) -> Vec<&HistoryEntry> {
        let mut entries: Vec<&HistoryEntry> = self
            .phases
            .values()
            .flat_map(|state| state.history.iter())
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }

    fn guard_open<'w>(&self, workflow: &Workflow<'w>) -> Result<&'w PhaseSpec, PhaseGraphError> {
        if self.finished {
            return Err(PhaseGraphError::PlanFinished(self.active.clone()));
        }
        workflow.phase(&self.active)
    }

    fn check_loop_budget(&self, spec: &PhaseSpec) -> Result<(), PhaseGraphError> {
        let loops = self.phases.get(&spec.id).map(PhaseState::loops).unwrap_or(0);
        if loops >= spec.max_iterations {
            return Err(PhaseGraphError::IterationLimitExceeded {
                phase: spec.id.clone(),
                max_iterations: spec.max_iterations,
            });
        }
        Ok(())
    }

    /// Apply an already-validated transition.
    fn enter(
        &mut self,
        workflow: &Workflow<'_>,
        target: &str,
        from: Option<String>,
        kind: TransitionKind,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Entered {
        let new_iteration = matches!(kind, TransitionKind::SelfLoop | TransitionKind::LoopBack);
        let seq = self.next_seq;
        self.next_seq += 1;

        let state = self
            .phases
            .entry(target.to_string())
            .or_insert(PhaseState {
                iteration: 0,
                history: Vec::new(),
            });
        let fresh = state.iteration == 0 || new_iteration;
        if fresh {
            state.iteration += 1;
        }
        state.history.push(HistoryEntry {
            seq,
            kind,
            from,
            to: target.to_string(),
            iteration: state.iteration,
            reason: reason.to_string(),
            at: now,
        });
        let iteration = state.iteration;

        self.active = target.to_string();
        self.finished = workflow
            .phase(target)
            .map(PhaseSpec::is_terminal)
            .unwrap_or(false);

        Entered {
            phase: target.to_string(),
            iteration,
            kind,
            fresh,
        }
    }
}

/// Required artifacts and the confidence floor of `current`, checked before it is left.
fn check_exit_gate(current: &PhaseSpec, gate: &ExitGate) -> Result<(), PhaseGraphError> {
    let missing: Vec<String> = current
        .required_artifacts
        .iter()
        .filter(|name| !gate.recorded_artifacts.contains(*name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PhaseGraphError::MissingArtifacts {
            phase: current.id.clone(),
            missing,
        });
    }

    if let Some(min) = current.min_confidence {
        let mut low: Vec<String> = gate
            .confidences
            .iter()
            .filter(|(_, score)| *score < min)
            .map(|(id, _)| id.clone())
            .collect();
        if !low.is_empty() {
            low.sort();
            return Err(PhaseGraphError::ConfidenceGate {
                phase: current.id.clone(),
                min,
                tasks: low,
            });
        }
    }
    Ok(())
}
