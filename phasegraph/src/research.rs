//! Research cache and dead-end ledger verbs.
//!
//! Both are soft signals for workers: a cache hit or a similar dead end is
//! reported, never enforced.

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::core::ledger::{DeadEndMatch, RankedEntry, search, similar_dead_ends};
use crate::core::types::{CacheEntry, DeadEnd, Origin};
use crate::io::lock::FileLock;
use crate::io::research_cache::{append_entry, entry_id, load_entries};
use crate::workspace::{PlanHandle, Workspace};

/// New research cache entry as supplied by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub query: String,
    pub findings: String,
    pub source_type: String,
    pub source_url: Option<String>,
}

impl Workspace {
    /// Rank cached research for `query` across every plan.
    pub fn cache_search(&self, query: &str, limit: Option<usize>) -> Result<Vec<RankedEntry>> {
        let entries = load_entries(&self.paths().cache_path)?;
        let limit = limit.unwrap_or(self.config().cache_search_limit);
        let results = search(&entries, query, limit);
        debug!(query, hits = results.len(), "cache search");
        Ok(results)
    }
}

impl PlanHandle<'_> {
    pub fn cache_search(&self, query: &str, limit: Option<usize>) -> Result<Vec<RankedEntry>> {
        self.workspace().cache_search(query, limit)
    }

    /// Append a finding to the shared cache, attributed to this plan.
    #[instrument(skip_all, fields(plan = %self.id()))]
    pub fn cache_add(&self, finding: Finding) -> Result<CacheEntry> {
        if finding.query.trim().is_empty() {
            bail!("cache query must be non-empty");
        }
        let entry = CacheEntry {
            id: entry_id(self.id(), &finding.query, &finding.findings),
            query: finding.query,
            findings: finding.findings,
            source_type: finding.source_type,
            source_url: finding.source_url,
            plan_id: self.id().to_string(),
            recorded_at: Utc::now(),
        };
        append_entry(&self.workspace().paths().cache_path, &entry)?;
        info!(id = %entry.id, "research cached");
        Ok(entry)
    }

    /// Record an approach that did not work, attributed to the active phase.
    #[instrument(skip_all, fields(plan = %self.id()))]
    pub fn dead_end_add(&self, approach: &str, reason: &str, task: Option<&str>) -> Result<DeadEnd> {
        if approach.trim().is_empty() {
            bail!("dead-end approach must be non-empty");
        }
        let _lock = FileLock::acquire(&self.plan_path())?;
        let mut plan = self.load()?;
        let entry = DeadEnd {
            approach: approach.to_string(),
            reason: reason.to_string(),
            origin: Origin {
                phase: plan.track.active.clone(),
                iteration: plan.track.current_iteration(),
                task: task.map(str::to_string),
            },
            recorded_at: Utc::now(),
        };
        plan.dead_ends.push(entry.clone());
        self.write(&plan)?;
        info!(phase = %entry.origin.phase, "dead end recorded");
        Ok(entry)
    }

    /// Prior dead ends resembling `approach`, best match first.
    pub fn dead_end_check(&self, approach: &str) -> Result<Vec<DeadEndMatch>> {
        let plan = self.load()?;
        let threshold = self.workspace().config().dead_end_min_overlap_percent;
        Ok(similar_dead_ends(&plan.dead_ends, approach, threshold))
    }

    pub fn dead_ends(&self) -> Result<Vec<DeadEnd>> {
        Ok(self.load()?.dead_ends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorkspace;

    fn finding(query: &str, findings: &str) -> Finding {
        Finding {
            query: query.to_string(),
            findings: findings.to_string(),
            source_type: "web".to_string(),
            source_url: None,
        }
    }

    /// Cached research is shared across plans and ranked lexically.
    #[test]
    fn cache_is_plan_independent() {
        let tw = TestWorkspace::new();
        let alpha = tw.ws.create_plan("alpha", "kickoff").expect("alpha");
        let beta = tw.ws.create_plan("beta", "kickoff").expect("beta");

        alpha
            .cache_add(finding("rust async runtimes", "tokio is the default"))
            .expect("add");
        alpha
            .cache_add(finding("sqlite fts5", "FTS5 supports bm25 ranking"))
            .expect("add");

        let hits = beta.cache_search("fts5 search", None).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.query, "sqlite fts5");
        assert_eq!(hits[0].entry.plan_id, "alpha");
    }

    #[test]
    fn dead_ends_carry_origin_and_match_by_overlap() {
        let tw = TestWorkspace::new();
        let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
        let entry = plan
            .dead_end_add(
                "mock payment gateway with wiremock",
                "tls handshake fails",
                Some("pay-1"),
            )
            .expect("record");
        assert_eq!(entry.origin.phase, "discovery");
        assert_eq!(entry.origin.iteration, 1);
        assert_eq!(entry.origin.task.as_deref(), Some("pay-1"));

        let hits = plan
            .dead_end_check("stub the payment gateway using wiremock")
            .expect("check");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].overlap_percent >= 50);
        assert!(
            plan.dead_end_check("tune postgres vacuum")
                .expect("check")
                .is_empty()
        );
        assert_eq!(plan.dead_ends().expect("ledger").len(), 1);
    }
}
