//! I/O helpers for phasegraph commands.
//!
//! Everything that touches `.phasegraph/` lives here. Stores read and write
//! whole records; validation of the requested change happens in `core`
//! before any store is asked to write.

pub mod config;
pub mod init;
pub mod iteration_store;
pub mod lock;
pub mod paths;
pub mod plan_store;
pub mod research_cache;
pub mod status_store;
pub mod store;
pub mod task_file;
