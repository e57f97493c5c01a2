//! Status Ledger — original vs current decision status per candidate, scoped
//! to one round template instance.
//!
//! `diff` drives the "N changed" counter only; persistence and advancement
//! always act on the full `snapshot_all` map, because template activation must
//! set an explicit status for every candidate, including those left at the
//! default.

use std::collections::HashMap;

use uuid::Uuid;

use crate::gateway::StatusUpdate;
use crate::models::candidate::{Candidate, RoundStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LedgerEntry {
    original: RoundStatus,
    current: RoundStatus,
}

#[derive(Debug, Default)]
pub struct StatusLedger {
    entries: HashMap<Uuid, LedgerEntry>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale reseed: discards everything and reads each candidate's
    /// server-confirmed status for the round. Used on round switch / refresh.
    pub fn seed(&mut self, candidates: &[Candidate], round_template_id: Uuid) {
        self.entries.clear();
        self.seed_page(candidates, round_template_id);
    }

    /// Incremental seed for "load more": only unknown candidates are added,
    /// so pending local edits on already-loaded rows survive the page append.
    pub fn seed_page(&mut self, candidates: &[Candidate], round_template_id: Uuid) {
        for candidate in candidates {
            self.entries.entry(candidate.id).or_insert_with(|| {
                let status = candidate.status_for(round_template_id);
                LedgerEntry {
                    original: status,
                    current: status,
                }
            });
        }
    }

    /// Overwrites `current` only. `original` is never touched after seeding.
    /// Returns false for candidates the ledger does not know.
    pub fn set_current(&mut self, candidate_id: Uuid, status: RoundStatus) -> bool {
        match self.entries.get_mut(&candidate_id) {
            Some(entry) => {
                entry.current = status;
                true
            }
            None => false,
        }
    }

    pub fn current(&self, candidate_id: Uuid) -> Option<RoundStatus> {
        self.entries.get(&candidate_id).map(|e| e.current)
    }

    /// Candidates whose current status differs from the seeded original.
    pub fn diff(&self) -> Vec<StatusUpdate> {
        self.entries
            .iter()
            .filter(|(_, e)| e.current != e.original)
            .map(|(id, e)| StatusUpdate {
                candidate_id: *id,
                status: e.current,
            })
            .collect()
    }

    pub fn changed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.current != e.original)
            .count()
    }

    /// One entry per known candidate, changed or not.
    pub fn snapshot_all(&self) -> Vec<StatusUpdate> {
        self.entries
            .iter()
            .map(|(id, e)| StatusUpdate {
                candidate_id: *id,
                status: e.current,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
