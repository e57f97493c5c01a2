//! Stage Advancement Protocol — moves the whole cohort from the current round
//! template to the next one.
//!
//! Steps, strictly in order: fetch the full cohort (never a partial page),
//! persist the full status map for the current round, activate the next
//! template, then bulk-create next-stage candidate-rounds carrying each
//! candidate's exact current status — including `rejected` and
//! `action_pending`; filtering by outcome is the caller's product decision.
//! Any failure aborts the sequence and clears the progressing flag; a retry
//! re-runs every step, which is safe because the writes are idempotent
//! overwrites/upserts.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::gateway::StatusUpdate;
use crate::models::remote::Remote;
use crate::models::round::{next_template, RoundTemplate};
use crate::pipeline::RoundSession;

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Advanced {
        next_round_template_id: Uuid,
        moved: usize,
        /// Next-stage rows, each resolved from `Pending` to `Confirmed` with
        /// the server-assigned candidate-round id.
        roster: Vec<Remote<StatusUpdate>>,
    },
    /// The current template is the last stage; nothing to advance into.
    NoNextStage,
}

impl RoundSession {
    /// Runs the full advancement sequence for the currently selected round.
    pub async fn advance_stage(&self, created_by: &str) -> Result<AdvanceOutcome, AppError> {
        let (current, next) = {
            let mut state = self.state();
            let current = Self::selected_round(&state)?;
            if state.progressing {
                return Err(AppError::Validation(
                    "Stage advancement already in progress".to_string(),
                ));
            }
            let Some(next) = next_template(&state.templates, &current).cloned() else {
                info!(
                    "Round template {} is the final stage, advancement is a no-op",
                    current.id
                );
                return Ok(AdvanceOutcome::NoNextStage);
            };
            state.progressing = true;
            (current, next)
        };

        let result = self.advance_steps(&current, &next, created_by).await;
        // Cleared on success and failure alike so the caller can retry from
        // the top.
        self.state().progressing = false;
        result
    }

    async fn advance_steps(
        &self,
        current: &RoundTemplate,
        next: &RoundTemplate,
        created_by: &str,
    ) -> Result<AdvanceOutcome, AppError> {
        // Step 1: full cohort. Mandatory even if the view only rendered one
        // page — persistence and the next-stage roster cover every candidate.
        let cohort = self
            .load_all(|page, total_pages, accumulated| {
                info!("Advancement cohort fetch: page {page}/{total_pages} ({accumulated} candidates)");
            })
            .await?;

        // Step 2: persist the full current-round status map, not the diff.
        let snapshot = self.state().ledger.snapshot_all();
        self.gateway.bulk_update_status(current.id, &snapshot).await?;
        info!(
            "Persisted {} statuses for round {} ({} total candidates)",
            snapshot.len(),
            current.id,
            cohort.len()
        );

        // Step 3: activate the next template before creating rows under it.
        self.gateway.confirm_round_template(next.id).await?;
        info!("Activated round template {}", next.id);

        // Step 4: every candidate carries forward its exact current status.
        let roster: Vec<Remote<StatusUpdate>> = snapshot
            .iter()
            .cloned()
            .map(|update| Remote::pending(update.candidate_id, update))
            .collect();

        // Step 5: bulk-create next-stage candidate-rounds.
        let created = self
            .gateway
            .bulk_create_candidate_rounds(next.id, &snapshot, created_by)
            .await?;
        let assigned: HashMap<Uuid, Uuid> = created
            .into_iter()
            .map(|c| (c.candidate_id, c.candidate_round_id))
            .collect();
        let roster: Vec<Remote<StatusUpdate>> = roster
            .into_iter()
            .map(|row| match assigned.get(&row.record().candidate_id) {
                Some(id) => row.confirm(*id),
                None => row,
            })
            .collect();

        // Step 6: signal completion; the view layer moves focus to `next`.
        info!(
            "Advanced {} candidates from round {} to {}",
            roster.len(),
            current.id,
            next.id
        );
        Ok(AdvanceOutcome::Advanced {
            next_round_template_id: next.id,
            moved: roster.len(),
            roster,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::models::candidate::{Candidate, RoundStatus};
    use crate::models::round::RoundType;
    use crate::pipeline::test_support::*;

    struct Setup {
        gateway: Arc<MockGateway>,
        session: RoundSession,
        interview_id: Uuid,
        candidates: Vec<Candidate>,
    }

    async fn setup(candidate_count: usize, page_size: u32) -> Setup {
        let job = Uuid::new_v4();
        let screening = make_template(job, 1, RoundType::Screening);
        let interview = make_template(job, 2, RoundType::Interview);
        let screening_id = screening.id;
        let interview_id = interview.id;
        let candidates: Vec<_> = (0..candidate_count)
            .map(|_| make_candidate(screening_id, RoundStatus::ActionPending))
            .collect();
        let gateway = Arc::new(MockGateway::new(vec![screening, interview]));
        gateway.set_pages(screening_id, paginate(&candidates, page_size));
        let session = RoundSession::open(
            Arc::clone(&gateway) as Arc<dyn crate::gateway::PipelineGateway>,
            Arc::new(MockEvaluator::default()),
            job,
            page_size,
        )
        .await
        .unwrap();
        session.select_round(screening_id).unwrap();
        Setup {
            gateway,
            session,
            interview_id,
            candidates,
        }
    }

    fn find_bulk_create(calls: &[GatewayCall]) -> Option<(Uuid, Vec<crate::gateway::StatusUpdate>, String)> {
        calls.iter().find_map(|c| match c {
            GatewayCall::BulkCreate {
                template,
                updates,
                created_by,
            } => Some((*template, updates.clone(), created_by.clone())),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_every_candidate_carries_its_exact_status_forward() {
        let s = setup(3, 10).await;
        s.session.load_first_page(false).await.unwrap();

        // X: selected, Y: action_pending (untouched), Z: rejected.
        s.session
            .set_status(s.candidates[0].id, RoundStatus::Selected)
            .unwrap();
        s.session
            .set_status(s.candidates[2].id, RoundStatus::Rejected)
            .unwrap();

        let outcome = s.session.advance_stage("recruiter-7").await.unwrap();
        let AdvanceOutcome::Advanced {
            next_round_template_id,
            moved,
            roster,
        } = outcome
        else {
            panic!("expected advancement");
        };
        assert_eq!(next_round_template_id, s.interview_id);
        assert_eq!(moved, 3);
        assert!(roster.iter().all(|r| r.is_confirmed()));

        let (template, updates, created_by) = find_bulk_create(&s.gateway.calls()).unwrap();
        assert_eq!(template, s.interview_id);
        assert_eq!(created_by, "recruiter-7");
        assert_eq!(updates.len(), 3, "rejected and pending rows are created too");

        let status_of = |id: Uuid| updates.iter().find(|u| u.candidate_id == id).unwrap().status;
        assert_eq!(status_of(s.candidates[0].id), RoundStatus::Selected);
        assert_eq!(status_of(s.candidates[1].id), RoundStatus::ActionPending);
        assert_eq!(status_of(s.candidates[2].id), RoundStatus::Rejected);
    }

    #[tokio::test]
    async fn test_steps_run_in_protocol_order() {
        let s = setup(2, 10).await;
        s.session.load_first_page(false).await.unwrap();
        s.session.advance_stage("recruiter-1").await.unwrap();

        let calls = s.gateway.calls();
        let pos = |pred: &dyn Fn(&GatewayCall) -> bool| calls.iter().position(|c| pred(c)).unwrap();
        let last_fetch = calls
            .iter()
            .rposition(|c| matches!(c, GatewayCall::FetchPage { .. }))
            .unwrap();
        let update = pos(&|c| matches!(c, GatewayCall::BulkUpdate { .. }));
        let confirm = pos(&|c| matches!(c, GatewayCall::Confirm(_)));
        let create = pos(&|c| matches!(c, GatewayCall::BulkCreate { .. }));

        assert!(last_fetch < update, "cohort fetched before persisting");
        assert!(update < confirm, "statuses persisted before activation");
        assert!(confirm < create, "activation precedes row creation");
    }

    #[tokio::test]
    async fn test_full_cohort_spans_all_pages_with_matching_cardinality() {
        let s = setup(5, 2).await;
        // Only the first page is visible in the UI before advancing.
        s.session.load_first_page(false).await.unwrap();
        assert_eq!(s.session.view().candidates.len(), 2);

        s.session.advance_stage("recruiter-1").await.unwrap();

        let calls = s.gateway.calls();
        let bulk_update = calls
            .iter()
            .find_map(|c| match c {
                GatewayCall::BulkUpdate { updates, .. } => Some(updates.clone()),
                _ => None,
            })
            .unwrap();
        let (_, created, _) = find_bulk_create(&calls).unwrap();

        assert_eq!(bulk_update.len(), 5, "persist covers the full cohort");
        assert_eq!(created.len(), bulk_update.len());
        let mut persisted: Vec<_> = bulk_update.iter().map(|u| u.candidate_id).collect();
        let mut seeded: Vec<_> = created.iter().map(|u| u.candidate_id).collect();
        persisted.sort();
        seeded.sort();
        assert_eq!(persisted, seeded);
    }

    #[tokio::test]
    async fn test_last_stage_is_a_reported_noop() {
        let s = setup(1, 10).await;
        s.session.select_round(s.interview_id).unwrap();
        // No pages configured for interview, but no fetch should happen.
        let outcome = s.session.advance_stage("recruiter-1").await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::NoNextStage));
        assert!(!s
            .gateway
            .calls()
            .iter()
            .any(|c| matches!(c, GatewayCall::BulkUpdate { .. } | GatewayCall::Confirm(_))));
    }

    #[tokio::test]
    async fn test_activation_failure_aborts_before_row_creation() {
        let s = setup(2, 10).await;
        s.session.load_first_page(false).await.unwrap();
        s.gateway.fail_confirm.store(true, Ordering::SeqCst);

        let result = s.session.advance_stage("recruiter-1").await;
        assert!(matches!(result, Err(AppError::Activation(_))));
        assert!(find_bulk_create(&s.gateway.calls()).is_none());
        assert!(!s.session.view().progressing, "flag cleared for retry");
    }

    #[tokio::test]
    async fn test_persist_failure_aborts_before_activation() {
        let s = setup(2, 10).await;
        s.session.load_first_page(false).await.unwrap();
        s.gateway.fail_bulk_update.store(true, Ordering::SeqCst);

        let result = s.session.advance_stage("recruiter-1").await;
        assert!(matches!(result, Err(AppError::Persist(_))));
        assert!(!s
            .gateway
            .calls()
            .iter()
            .any(|c| matches!(c, GatewayCall::Confirm(_))));
    }

    #[tokio::test]
    async fn test_retry_after_failure_reruns_all_steps() {
        let s = setup(2, 10).await;
        s.session.load_first_page(false).await.unwrap();
        s.gateway.fail_confirm.store(true, Ordering::SeqCst);
        assert!(s.session.advance_stage("recruiter-1").await.is_err());

        s.gateway.fail_confirm.store(false, Ordering::SeqCst);
        let outcome = s.session.advance_stage("recruiter-1").await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Advanced { .. }));

        // Idempotent overwrites: the retry issued a second full bulk update.
        let updates = s
            .gateway
            .calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::BulkUpdate { .. }))
            .count();
        assert_eq!(updates, 2);
    }
}
