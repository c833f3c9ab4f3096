//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between core components and the
//! on-disk records. They carry no behaviour that depends on external state.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an artifact is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactScope {
    /// Current iteration of the active phase.
    Phase,
    /// Whole plan, across phases and iterations.
    Plan,
}

impl fmt::Display for ArtifactScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactScope::Phase => f.write_str("phase"),
            ArtifactScope::Plan => f.write_str("plan"),
        }
    }
}

/// Content pointer held by an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactLocator {
    Path(PathBuf),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub scope: ArtifactScope,
    pub locator: ArtifactLocator,
    pub recorded_at: DateTime<Utc>,
}

/// How a phase was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    /// Initial entry when the plan was created.
    Start,
    Advance,
    SelfLoop,
    LoopBack,
}

/// One line of a phase's transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Plan-wide sequence number; orders entries across phases.
    pub seq: u64,
    pub kind: TransitionKind,
    pub from: Option<String>,
    pub to: String,
    /// Iteration of `to` that was entered.
    pub iteration: u32,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Phase/task that produced a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub phase: String,
    pub iteration: u32,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadEnd {
    pub approach: String,
    pub reason: String,
    pub origin: Origin,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Content hash of `(plan_id, query, findings)`.
    pub id: String,
    pub query: String,
    pub findings: String,
    pub source_type: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub plan_id: String,
    pub recorded_at: DateTime<Utc>,
}
