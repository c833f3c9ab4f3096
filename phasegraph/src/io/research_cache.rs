//! Plan-independent research cache stored as JSON lines.
//!
//! Entries are write-once: appending never rewrites earlier lines, and two
//! entries with the same query are both kept. File order is insertion order,
//! which search relies on for its most-recent-first tie break.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::types::CacheEntry;

/// Short content hash used as a cache entry id.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Id of an entry: hash over plan, query and findings.
pub fn entry_id(plan_id: &str, query: &str, findings: &str) -> String {
    content_hash(&format!("{plan_id}\u{0}{query}\u{0}{findings}"))
}

/// All entries in insertion order. A missing file is an empty cache.
///
/// Lines that do not parse (a torn append, a hand edit) are skipped with a
/// warning so one bad line never hides the rest of the shared cache.
pub fn load_entries(path: &Path) -> Result<Vec<CacheEntry>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read cache {}", path.display())),
    };
    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CacheEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                skipped += 1;
                warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %err,
                    "skipping unreadable cache line"
                );
            }
        }
    }
    debug!(
        path = %path.display(),
        entries = entries.len(),
        skipped,
        "research cache loaded"
    );
    Ok(entries)
}

/// Append one entry as a single line.
pub fn append_entry(path: &Path, entry: &CacheEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create cache dir {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry).context("serialize cache entry")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open cache {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append cache {}", path.display()))?;
    debug!(path = %path.display(), id = %entry.id, "research cache entry appended");
    Ok(())
}
