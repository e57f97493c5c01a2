//! Pagination Cache — accumulated candidate roster plus page bookkeeping for
//! one round-template selection.
//!
//! This is the synchronous half: applying pages, dedup, the re-entrancy
//! guard. The async drivers (fetch, load more, load all) live on
//! `RoundSession`, which checks the selection's cancellation token before
//! writing anything here.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::gateway::CandidatePage;
use crate::models::candidate::Candidate;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageState {
    pub current_page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub has_next: bool,
}

impl PageState {
    fn empty(page_size: u32) -> Self {
        Self {
            current_page: 0,
            page_size,
            total_count: 0,
            has_next: false,
        }
    }
}

#[derive(Debug)]
pub struct PaginationCache {
    state: PageState,
    candidates: Vec<Candidate>,
    loading: bool,
}

impl PaginationCache {
    pub fn new(page_size: u32) -> Self {
        Self {
            state: PageState::empty(page_size),
            candidates: Vec::new(),
            loading: false,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut Vec<Candidate> {
        &mut self.candidates
    }

    pub fn has_next(&self) -> bool {
        self.state.has_next
    }

    pub fn next_page(&self) -> u32 {
        self.state.current_page + 1
    }

    /// Re-entrancy guard: returns false if a load is already in flight.
    pub fn begin_load(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    pub fn end_load(&mut self) {
        self.loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Replaces the roster with page 1 of a fresh load.
    pub fn apply_first_page(&mut self, page: CandidatePage) {
        self.candidates = page.candidates;
        self.state = PageState {
            current_page: page.pagination.current_page,
            page_size: page.pagination.page_size,
            total_count: page.pagination.total_count,
            has_next: page.pagination.has_next,
        };
    }

    /// Appends a "load more" page, deduplicating by candidate id in case the
    /// gateway shifted rows between requests.
    pub fn append_page(&mut self, page: CandidatePage) {
        let known: HashSet<Uuid> = self.candidates.iter().map(|c| c.id).collect();
        self.candidates
            .extend(page.candidates.into_iter().filter(|c| !known.contains(&c.id)));
        self.state = PageState {
            current_page: page.pagination.current_page,
            page_size: page.pagination.page_size,
            total_count: page.pagination.total_count,
            has_next: page.pagination.has_next,
        };
    }
}
