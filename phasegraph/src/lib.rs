//! Phased task orchestration core.
//!
//! A plan moves through the phases of a declared workflow. Each phase
//! iteration holds a task graph whose statuses, logs, confidences and outputs
//! live in per-task records; artifacts and research findings flow between
//! tasks and phases. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (availability, scheduling, phase
//!   transitions, context assembly, lexical matching). No I/O, fully testable
//!   in isolation.
//! - **[`io`]**: Side-effecting operations on `.phasegraph/` (config, records,
//!   locks, the research cache).
//!
//! Orchestration modules ([`workspace`], [`tasks`], [`phases`], [`propagate`],
//! [`research`], [`schedule`]) coordinate core logic with I/O and expose the
//! verbs of a [`PlanHandle`].

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod phases;
pub mod propagate;
pub mod research;
pub mod schedule;
pub mod task;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspace;

pub use error::PhaseGraphError;
pub use workspace::{PlanHandle, Workspace};
