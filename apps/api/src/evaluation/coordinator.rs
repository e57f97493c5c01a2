//! Batch Evaluation Coordinator — decides which candidates still need an AI
//! evaluation and guarantees each is issued exactly once per round session.
//!
//! The coordinator is a pure state machine: `plan` computes the batch and
//! marks every planned candidate as processed *before* any network call is
//! issued, so a second trigger firing while the batch is in flight plans
//! nothing. Failures are terminal for the session — a candidate whose
//! evaluation failed is only ever retried through the explicit re-evaluation
//! tracker, never by this coordinator.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::candidate::Candidate;
use crate::models::round::RoundType;

/// Named roster-change events. Each carries its own idempotency semantics
/// instead of relying on list identity diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterEvent {
    /// A different round template was selected; the session restarts.
    RoundChanged,
    /// "Load more" appended a page. Known candidates keep their processed
    /// marks; only genuinely new ids become eligible.
    PageAppended,
    /// A forced refresh discarded local state, including unpersisted
    /// evaluation records. Everything becomes eligible again.
    Refreshed,
}

/// One evaluation to issue: the candidate and its round record for the
/// current template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub candidate_id: Uuid,
    pub candidate_round_id: Uuid,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct BatchCoordinator {
    /// Candidates already queued this session. Monotonically non-shrinking
    /// between roster resets; written before any call is issued.
    processed: HashSet<Uuid>,
    /// Candidates currently showing an evaluation spinner.
    evaluating: HashSet<Uuid>,
    progress: BatchProgress,
    /// Bumped on every reset. Completions tagged with an older generation
    /// belong to a superseded batch and are dropped.
    generation: u64,
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.progress.total > 0 && self.progress.completed < self.progress.total
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress
    }

    /// Identifies the roster epoch the current batch belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn evaluating(&self) -> &HashSet<Uuid> {
        &self.evaluating
    }

    pub fn apply_roster_event(&mut self, event: RosterEvent) {
        match event {
            RosterEvent::RoundChanged | RosterEvent::Refreshed => {
                debug!("Batch coordinator reset ({event:?})");
                self.processed.clear();
                self.evaluating.clear();
                self.progress = BatchProgress::default();
                self.generation += 1;
            }
            RosterEvent::PageAppended => {
                // Processed marks survive: failed evaluations stay terminal
                // within the session; only new ids become eligible.
            }
        }
    }

    /// Computes the batch for the current roster. Only SCREENING rounds get
    /// background evaluation. Every returned candidate is marked processed
    /// here, before the caller issues any call.
    pub fn plan(
        &mut self,
        round_type: RoundType,
        round_template_id: Uuid,
        candidates: &[Candidate],
    ) -> Vec<BatchItem> {
        if round_type != RoundType::Screening || self.is_active() {
            return Vec::new();
        }

        let mut batch = Vec::new();
        for candidate in candidates {
            if candidate.has_scored_evaluation(round_template_id)
                || self.processed.contains(&candidate.id)
            {
                continue;
            }
            let Some(round) = candidate.round(round_template_id) else {
                warn!(
                    "Candidate {} has no round record for template {round_template_id}, skipping",
                    candidate.id
                );
                continue;
            };
            batch.push(BatchItem {
                candidate_id: candidate.id,
                candidate_round_id: round.id,
            });
        }

        if batch.is_empty() {
            return batch;
        }

        // Write-before-call: mark processed before any network activity so a
        // re-trigger during the batch plans nothing, and a failure is never
        // re-queued.
        for item in &batch {
            self.processed.insert(item.candidate_id);
            self.evaluating.insert(item.candidate_id);
        }
        self.progress = BatchProgress {
            completed: 0,
            total: batch.len(),
        };
        debug!("Planned evaluation batch of {}", batch.len());
        batch
    }

    /// Records one completion (success or failure alike) for the batch
    /// planned at `generation`. A completion from a superseded batch is
    /// dropped, so a roster reset mid-flight cannot inflate the counters of
    /// whatever batch runs next. Returns the updated progress; when
    /// `completed == total` the batch returns to idle.
    pub fn record_completion(&mut self, candidate_id: Uuid, generation: u64) -> BatchProgress {
        if generation != self.generation {
            debug!("Dropped completion for {candidate_id} from a superseded batch");
            return self.progress;
        }
        self.evaluating.remove(&candidate_id);
        self.progress.completed += 1;
        let progress = self.progress;
        if progress.completed >= progress.total {
            self.progress = BatchProgress::default();
        }
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::{
        CandidateRound, EvaluationFailureKind, EvaluationRecord, RoundStatus,
    };

    fn make_candidate(template_id: Uuid, evaluation: Option<EvaluationRecord>) -> Candidate {
        let id = Uuid::new_v4();
        Candidate {
            id,
            name: "Grace Hopper".to_string(),
            email: "grace@example.com".to_string(),
            phone: None,
            profile: serde_json::json!({}),
            candidate_rounds: vec![CandidateRound {
                id: Uuid::new_v4(),
                candidate_id: id,
                round_template_id: template_id,
                status: RoundStatus::ActionPending,
                evaluation,
                criteria_override: None,
                created_at: None,
            }],
            round_status: None,
        }
    }

    fn success_record() -> EvaluationRecord {
        EvaluationRecord::Success {
            overall_percentage_score: 82.0,
            competency_scores: vec![],
            summary: "solid".to_string(),
            extracted_skills: vec![],
        }
    }

    #[test]
    fn test_plan_issues_each_unscored_candidate_exactly_once() {
        let template = Uuid::new_v4();
        let candidates: Vec<_> = (0..3).map(|_| make_candidate(template, None)).collect();
        let mut coordinator = BatchCoordinator::new();

        let batch = coordinator.plan(RoundType::Screening, template, &candidates);
        assert_eq!(batch.len(), 3);

        // Re-triggering while the batch is in flight plans nothing.
        for _ in 0..5 {
            let again = coordinator.plan(RoundType::Screening, template, &candidates);
            assert!(again.is_empty());
        }
    }

    #[test]
    fn test_scored_candidates_are_skipped() {
        let template = Uuid::new_v4();
        let candidates = vec![
            make_candidate(template, Some(success_record())),
            make_candidate(template, None),
        ];
        let mut coordinator = BatchCoordinator::new();
        let batch = coordinator.plan(RoundType::Screening, template, &candidates);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].candidate_id, candidates[1].id);
    }

    #[test]
    fn test_non_screening_rounds_plan_nothing() {
        let template = Uuid::new_v4();
        let candidates = vec![make_candidate(template, None)];
        let mut coordinator = BatchCoordinator::new();
        assert!(coordinator
            .plan(RoundType::Interview, template, &candidates)
            .is_empty());
        assert!(coordinator
            .plan(RoundType::Project, template, &candidates)
            .is_empty());
    }

    #[test]
    fn test_failed_candidate_is_never_requeued_in_session() {
        let template = Uuid::new_v4();
        let mut candidates = vec![make_candidate(template, None)];
        let mut coordinator = BatchCoordinator::new();

        let batch = coordinator.plan(RoundType::Screening, template, &candidates);
        assert_eq!(batch.len(), 1);

        // Evaluation comes back as a typed failure; the record is written and
        // the completion counted.
        candidates[0].candidate_rounds[0].evaluation = Some(EvaluationRecord::failure(
            EvaluationFailureKind::EvaluationError,
            "upstream timeout",
        ));
        let generation = coordinator.generation();
        coordinator.record_completion(candidates[0].id, generation);
        assert!(!coordinator.is_active());

        // A failure record has no usable score, but processed keeps it out of
        // every subsequent trigger.
        for _ in 0..3 {
            assert!(coordinator
                .plan(RoundType::Screening, template, &candidates)
                .is_empty());
        }
    }

    #[test]
    fn test_page_append_keeps_processed_marks() {
        let template = Uuid::new_v4();
        let mut candidates = vec![make_candidate(template, None)];
        let mut coordinator = BatchCoordinator::new();

        let first = coordinator.plan(RoundType::Screening, template, &candidates);
        assert_eq!(first.len(), 1);
        let generation = coordinator.generation();
        coordinator.record_completion(candidates[0].id, generation);

        // Page 2 arrives with one new candidate.
        candidates.push(make_candidate(template, None));
        coordinator.apply_roster_event(RosterEvent::PageAppended);

        let second = coordinator.plan(RoundType::Screening, template, &candidates);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].candidate_id, candidates[1].id);
    }

    #[test]
    fn test_round_change_resets_everything() {
        let template = Uuid::new_v4();
        let candidates = vec![make_candidate(template, None)];
        let mut coordinator = BatchCoordinator::new();
        coordinator.plan(RoundType::Screening, template, &candidates);

        coordinator.apply_roster_event(RosterEvent::RoundChanged);
        assert!(!coordinator.is_active());
        assert!(coordinator.evaluating().is_empty());

        let batch = coordinator.plan(RoundType::Screening, template, &candidates);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_progress_counts_and_returns_to_idle() {
        let template = Uuid::new_v4();
        let candidates: Vec<_> = (0..2).map(|_| make_candidate(template, None)).collect();
        let mut coordinator = BatchCoordinator::new();
        let batch = coordinator.plan(RoundType::Screening, template, &candidates);
        let generation = coordinator.generation();
        assert_eq!(coordinator.progress().total, 2);
        assert!(coordinator.is_active());

        // Completions may arrive in any order relative to issue order.
        let progress = coordinator.record_completion(batch[1].candidate_id, generation);
        assert_eq!(progress.completed, 1);
        assert!(coordinator.is_active());

        let progress = coordinator.record_completion(batch[0].candidate_id, generation);
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.total, 2);
        assert!(!coordinator.is_active());
        assert_eq!(coordinator.progress().total, 0);
    }

    #[test]
    fn test_completion_from_superseded_batch_is_ignored() {
        let template = Uuid::new_v4();
        let candidates = vec![make_candidate(template, None)];
        let mut coordinator = BatchCoordinator::new();

        let old_batch = coordinator.plan(RoundType::Screening, template, &candidates);
        let old_generation = coordinator.generation();

        // A refresh lands while the batch is in flight and a new one starts.
        coordinator.apply_roster_event(RosterEvent::Refreshed);
        let new_batch = coordinator.plan(RoundType::Screening, template, &candidates);
        assert_eq!(new_batch.len(), 1);
        let new_generation = coordinator.generation();
        assert_ne!(old_generation, new_generation);

        // The stale completion neither counts nor finishes the new batch.
        let progress = coordinator.record_completion(old_batch[0].candidate_id, old_generation);
        assert_eq!(progress.completed, 0);
        assert!(coordinator.is_active());

        let progress = coordinator.record_completion(new_batch[0].candidate_id, new_generation);
        assert_eq!(progress.completed, 1);
        assert!(!coordinator.is_active());
    }

    #[test]
    fn test_candidate_without_round_record_is_skipped() {
        let template = Uuid::new_v4();
        let mut candidate = make_candidate(template, None);
        candidate.candidate_rounds.clear();
        let mut coordinator = BatchCoordinator::new();
        assert!(coordinator
            .plan(RoundType::Screening, template, &[candidate])
            .is_empty());
    }
}
