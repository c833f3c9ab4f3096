//! Deterministic, pure logic shared by the orchestration layer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod context;
pub mod graph;
pub mod invariants;
pub mod ledger;
pub mod lexical;
pub mod phase_machine;
pub mod prompt;
pub mod scheduler;
pub mod types;
