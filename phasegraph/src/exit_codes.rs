//! Stable exit codes for phasegraph CLI commands.

/// Command succeeded (or returned a non-empty result).
pub const OK: i32 = 0;
/// Command failed: rejected operation, invalid workspace/config or I/O error.
pub const INVALID: i32 = 1;
/// Nothing left to do: the iteration is complete or the plan is finished.
pub const COMPLETE: i32 = 2;
/// New starts are halted because a task in the iteration is blocked.
pub const HALTED: i32 = 3;
/// A loop would exceed the phase's iteration budget.
pub const LIMIT: i32 = 4;
