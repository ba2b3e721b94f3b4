//! In-memory index of visits whose declared opener tab has not yet been
//! seen (§4.5). Indexed by `opener_tab_id`; owned exclusively by the
//! single engine actor and never shared across threads (§5), following
//! the teacher's `DiscoveryState` idiom: private fields, `pub(crate)`-style
//! mutators (here `pub` since this crate's only API surface is the
//! manager), `Entry` API for insert-or-update, lazy pruning on every read.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use wayline_primitives::{Visit, VisitId};

/// `max_retries = 3` bounds worst-case work per missing parent.
/// `max_age_ms = 60_000`: orphans older than this are abandoned, the
/// parent presumed lost.
#[derive(Clone, Copy, Debug)]
pub struct OrphanPolicy {
    pub max_retries: u32,
    pub max_age: Duration,
}

impl Default for OrphanPolicy {
    fn default() -> Self {
        Self { max_retries: 3, max_age: Duration::from_millis(60_000) }
    }
}

/// A visit waiting for its opener tab's root visit to arrive. Carries its
/// raw page body alongside the persisted row (§3: "visit (full payload incl.
/// raw body)") so the Workflow Dispatcher can still run analysis on it once
/// its opener is found, without a second read of the producer's payload.
#[derive(Clone, Debug)]
pub struct OrphanEntry {
    pub visit: Visit,
    pub body: String,
    /// The orphan's own tab, if the producer reported one. Carried so a
    /// flush can itself drain any further orphans chained onto *this*
    /// visit's tab once it is reparented.
    pub tab_id: Option<String>,
    pub opener_tab_id: String,
    pub arrival_time: Instant,
    pub retry_count: u32,
}

/// Snapshot returned by [`OrphanManager::stats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrphanStats {
    pub total: usize,
    pub distinct_openers: usize,
    pub oldest_age_ms: Option<u64>,
}

#[derive(Debug)]
pub struct OrphanManager {
    policy: OrphanPolicy,
    by_opener: BTreeMap<String, Vec<OrphanEntry>>,
}

impl OrphanManager {
    #[must_use]
    pub fn new(policy: OrphanPolicy) -> Self {
        Self { policy, by_opener: BTreeMap::new() }
    }

    /// Appends to the opener's list. Re-adding the same `visit_id` is not
    /// deduplicated; entries are processed in arrival order (§4.5).
    pub fn add(&mut self, visit: Visit, body: String, tab_id: Option<String>, opener_tab_id: String) {
        self.prune_expired();
        let entry = OrphanEntry {
            visit,
            body,
            tab_id,
            opener_tab_id: opener_tab_id.clone(),
            arrival_time: Instant::now(),
            retry_count: 0,
        };
        self.by_opener.entry(opener_tab_id).or_default().push(entry);
    }

    /// Removes and returns every entry queued for `opener_tab_id`.
    pub fn drain_for_opener(&mut self, opener_tab_id: &str) -> Vec<OrphanEntry> {
        self.prune_expired();
        self.by_opener.remove(opener_tab_id).unwrap_or_default()
    }

    /// Snapshot of every entry still eligible for a retry pass: under the
    /// retry cap and within the age window.
    pub fn take_due_for_retry(&mut self) -> Vec<OrphanEntry> {
        self.prune_expired();
        self.by_opener
            .values()
            .flatten()
            .filter(|entry| entry.retry_count < self.policy.max_retries)
            .cloned()
            .collect()
    }

    /// Increments the retry counter for one entry, identified by its
    /// opener and visit id. Removes it outright once it reaches
    /// `max_retries`.
    pub fn increment_retry_count(&mut self, opener_tab_id: &str, visit_id: VisitId) {
        let Some(entries) = self.by_opener.get_mut(opener_tab_id) else { return };
        if let Some(pos) = entries.iter().position(|e| e.visit.visit_id == visit_id) {
            entries[pos].retry_count += 1;
            if entries[pos].retry_count >= self.policy.max_retries {
                entries.remove(pos);
            }
        }
        if entries.is_empty() {
            self.by_opener.remove(opener_tab_id);
        }
    }

    /// Removes and returns one entry outright, identified by its opener and
    /// visit id — used when a retry pass resolves an orphan without it
    /// having gone through [`Self::drain_for_opener`].
    pub fn remove(&mut self, opener_tab_id: &str, visit_id: VisitId) -> Option<OrphanEntry> {
        let entries = self.by_opener.get_mut(opener_tab_id)?;
        let pos = entries.iter().position(|e| e.visit.visit_id == visit_id)?;
        let entry = entries.remove(pos);
        if entries.is_empty() {
            self.by_opener.remove(opener_tab_id);
        }
        Some(entry)
    }

    #[must_use]
    pub fn stats(&mut self) -> OrphanStats {
        self.prune_expired();
        let total: usize = self.by_opener.values().map(Vec::len).sum();
        let oldest_age_ms = self
            .by_opener
            .values()
            .flatten()
            .map(|entry| entry.arrival_time.elapsed().as_millis() as u64)
            .max();
        OrphanStats { total, distinct_openers: self.by_opener.len(), oldest_age_ms }
    }

    /// Drops entries past `max_retries` or `max_age`; called on every read
    /// and on every `add` (§4.5).
    fn prune_expired(&mut self) {
        let max_retries = self.policy.max_retries;
        let max_age = self.policy.max_age;
        self.by_opener.retain(|_, entries| {
            entries.retain(|e| e.retry_count < max_retries && e.arrival_time.elapsed() < max_age);
            !entries.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wayline_primitives::{Digest, TreeId};

    use super::*;

    fn visit(seed: u8) -> Visit {
        let id = wayline_primitives::VisitId::from_digest(Digest::from_bytes([seed; 32]));
        Visit {
            visit_id: id,
            url: "https://a.com/x".into(),
            referrer_url: None,
            referrer_visit_id: None,
            page_loaded_at: Utc::now(),
            tree_id: TreeId::from_root_visit(id),
        }
    }

    #[test]
    fn add_then_drain_preserves_arrival_order() {
        let mut manager = OrphanManager::new(OrphanPolicy::default());
        manager.add(visit(1), "body-1".into(), None, "tab-1".into());
        manager.add(visit(2), "body-2".into(), None, "tab-1".into());

        let drained = manager.drain_for_opener("tab-1");
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].visit.visit_id, visit(1).visit_id);
        assert_eq!(drained[1].visit.visit_id, visit(2).visit_id);
    }

    #[test]
    fn drain_removes_entries_for_that_opener_only() {
        let mut manager = OrphanManager::new(OrphanPolicy::default());
        manager.add(visit(1), "body-1".into(), None, "tab-1".into());
        manager.add(visit(2), "body-2".into(), None, "tab-2".into());

        let _ = manager.drain_for_opener("tab-1");
        assert_eq!(manager.stats().total, 1);
    }

    #[test]
    fn increment_retry_count_evicts_at_max() {
        let mut manager = OrphanManager::new(OrphanPolicy { max_retries: 2, ..OrphanPolicy::default() });
        let v = visit(3);
        manager.add(v.clone(), "body".into(), None, "tab-1".into());

        manager.increment_retry_count("tab-1", v.visit_id);
        assert_eq!(manager.stats().total, 1);
        manager.increment_retry_count("tab-1", v.visit_id);
        assert_eq!(manager.stats().total, 0);
    }

    #[test]
    fn take_due_for_retry_excludes_exhausted_entries() {
        let mut manager = OrphanManager::new(OrphanPolicy { max_retries: 1, ..OrphanPolicy::default() });
        manager.add(visit(4), "body-4".into(), None, "tab-1".into());
        manager.increment_retry_count("tab-1", visit(4).visit_id);

        assert!(manager.take_due_for_retry().is_empty());
    }

    #[test]
    fn remove_takes_one_entry_without_touching_siblings() {
        let mut manager = OrphanManager::new(OrphanPolicy::default());
        manager.add(visit(6), "body-6".into(), None, "tab-1".into());
        manager.add(visit(7), "body-7".into(), None, "tab-1".into());

        let removed = manager.remove("tab-1", visit(6).visit_id).expect("present");
        assert_eq!(removed.visit.visit_id, visit(6).visit_id);
        assert_eq!(manager.stats().total, 1);
        assert!(manager.remove("tab-1", visit(6).visit_id).is_none());
    }

    #[test]
    fn expired_entries_are_pruned_on_read() {
        let mut manager = OrphanManager::new(OrphanPolicy { max_age: Duration::from_millis(0), ..OrphanPolicy::default() });
        manager.add(visit(5), "body-5".into(), None, "tab-1".into());
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(manager.stats().total, 0);
    }
}
