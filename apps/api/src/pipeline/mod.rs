//! Round session — one coordinator per open round-detail view.
//!
//! Owns the Status Ledger, Pagination Cache, Batch Evaluation Coordinator and
//! Re-evaluation Tracker for the currently selected round template. All state
//! lives behind a single mutex that is never held across an await point: async
//! drivers read what they need under the lock, perform I/O, then re-acquire
//! the lock and check the selection's cancellation token before writing.
//! Switching round templates rotates the token, so stale completions are
//! discarded instead of overwriting the new selection's state.

pub mod advancement;
pub mod handlers;
pub mod ledger;
pub mod pagination;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::client::EvaluationClient;
use crate::evaluation::coordinator::{BatchCoordinator, BatchProgress, RosterEvent};
use crate::evaluation::session::{ReEvalSource, ReEvalState, ReEvaluationTracker};
use crate::gateway::{CandidatePage, PipelineGateway};
use crate::models::candidate::{Candidate, EvaluationFailureKind, EvaluationRecord, RoundStatus};
use crate::models::round::RoundTemplate;
use crate::pipeline::ledger::StatusLedger;
use crate::pipeline::pagination::{PageState, PaginationCache};

// ────────────────────────────────────────────────────────────────────────────
// View types — the signals exposed to the surrounding view layer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CandidateView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Resolved per-round status: the local edit if one exists, else the
    /// server-confirmed value.
    pub status: RoundStatus,
    pub evaluation: Option<EvaluationRecord>,
    pub is_evaluating: bool,
    pub re_evaluation: ReEvalState,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub round_template_id: Option<Uuid>,
    pub candidates: Vec<CandidateView>,
    pub changed_count: usize,
    pub progressing: bool,
    pub evaluating: Vec<Uuid>,
    pub has_more: bool,
    pub loading: bool,
    pub batch_progress: BatchProgress,
    pub pagination: PageState,
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

struct SessionState {
    templates: Vec<RoundTemplate>,
    round: Option<RoundTemplate>,
    cache: PaginationCache,
    ledger: StatusLedger,
    batch: BatchCoordinator,
    reeval: ReEvaluationTracker,
    progressing: bool,
    cancel: CancellationToken,
}

pub struct RoundSession {
    job_opening_id: Uuid,
    page_size: u32,
    gateway: Arc<dyn PipelineGateway>,
    evaluator: Arc<dyn EvaluationClient>,
    state: Mutex<SessionState>,
}

impl RoundSession {
    /// Opens a session for a job, loading its ordered round templates.
    pub async fn open(
        gateway: Arc<dyn PipelineGateway>,
        evaluator: Arc<dyn EvaluationClient>,
        job_opening_id: Uuid,
        page_size: u32,
    ) -> Result<Self, AppError> {
        let templates = gateway.fetch_round_templates(job_opening_id).await?;
        info!(
            "Opened round session for job {job_opening_id} ({} templates)",
            templates.len()
        );
        Ok(Self {
            job_opening_id,
            page_size,
            gateway,
            evaluator,
            state: Mutex::new(SessionState {
                templates,
                round: None,
                cache: PaginationCache::new(page_size),
                ledger: StatusLedger::new(),
                batch: BatchCoordinator::new(),
                reeval: ReEvaluationTracker::new(),
                progressing: false,
                cancel: CancellationToken::new(),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Selects a round template: cancels in-flight fetches for the previous
    /// selection and discards its ledger, roster, and batch state wholesale.
    pub fn select_round(&self, round_template_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state();
        let template = state
            .templates
            .iter()
            .find(|t| t.id == round_template_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Round template {round_template_id} not found"))
            })?;

        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.cache = PaginationCache::new(self.page_size);
        state.ledger = StatusLedger::new();
        state.batch.apply_roster_event(RosterEvent::RoundChanged);
        state.reeval = ReEvaluationTracker::new();
        debug!("Selected round template {round_template_id}");
        state.round = Some(template);
        Ok(())
    }

    fn selected_round(state: &SessionState) -> Result<RoundTemplate, AppError> {
        state
            .round
            .clone()
            .ok_or_else(|| AppError::Validation("No round template selected".to_string()))
    }

    /// Fetches one page, racing the selection's cancellation token. A
    /// cancelled fetch resolves to `AppError::Cancelled` and must not be
    /// written into state by the caller.
    async fn fetch_page(
        &self,
        round_template_id: Uuid,
        page: u32,
        token: &CancellationToken,
    ) -> Result<CandidatePage, AppError> {
        tokio::select! {
            _ = token.cancelled() => Err(AppError::Cancelled),
            page = self
                .gateway
                .fetch_candidate_page(round_template_id, page, self.page_size) => page,
        }
    }

    /// Loads page 1 for the current selection. A plain reload re-syncs the
    /// roster but keeps the coordinator's processed marks, pending status
    /// edits, and locally-written evaluation records; a forced refresh
    /// invalidates the gateway's cache first and discards local state
    /// wholesale. No-ops while another load is in flight.
    pub async fn load_first_page(&self, force_refresh: bool) -> Result<(), AppError> {
        let (round_id, token) = {
            let mut state = self.state();
            let round = Self::selected_round(&state)?;
            if !state.cache.begin_load() {
                return Ok(());
            }
            (round.id, state.cancel.clone())
        };

        if force_refresh {
            if let Err(e) = self.gateway.invalidate_candidate_cache(round_id).await {
                self.state().cache.end_load();
                return Err(e);
            }
        }

        let fetched = self.fetch_page(round_id, 1, &token).await;

        let mut state = self.state();
        if token.is_cancelled() {
            // The selection moved on; its fresh cache was never marked loading.
            return Err(AppError::Cancelled);
        }
        state.cache.end_load();
        let page = fetched?;
        if force_refresh {
            state.cache.apply_first_page(page);
            let candidates = state.cache.candidates().to_vec();
            state.ledger.seed(&candidates, round_id);
            state.batch.apply_roster_event(RosterEvent::Refreshed);
        } else {
            // Evaluation records written this session only live in the cache;
            // the gateway's rows do not carry them back. Collect them before
            // the page replaces the roster, then restore them for ids the
            // fresh rows left blank. Failures stay terminal that way.
            let local_records: HashMap<Uuid, EvaluationRecord> = state
                .cache
                .candidates()
                .iter()
                .filter_map(|c| {
                    c.round(round_id)
                        .and_then(|cr| cr.evaluation.clone())
                        .map(|record| (c.id, record))
                })
                .collect();
            state.cache.apply_first_page(page);
            carry_local_records(&mut state.cache, local_records, round_id);
            let candidates = state.cache.candidates().to_vec();
            state.ledger.seed_page(&candidates, round_id);
            state.batch.apply_roster_event(RosterEvent::PageAppended);
        }
        debug!(
            "Loaded page 1 for round {round_id}: {} candidates, total {}",
            state.cache.candidates().len(),
            state.cache.state().total_count
        );
        Ok(())
    }

    /// Fetches `current_page + 1`. No-ops when there is no next page or a
    /// load is already in flight. A failed load-more keeps already-loaded
    /// pages intact.
    pub async fn load_more(&self) -> Result<(), AppError> {
        let (round_id, page, token) = {
            let mut state = self.state();
            let round = Self::selected_round(&state)?;
            if !state.cache.has_next() || !state.cache.begin_load() {
                return Ok(());
            }
            (round.id, state.cache.next_page(), state.cancel.clone())
        };

        let fetched = self.fetch_page(round_id, page, &token).await;

        let mut state = self.state();
        if token.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        state.cache.end_load();
        let page = fetched?;
        state.cache.append_page(page);
        let candidates = state.cache.candidates().to_vec();
        state.ledger.seed_page(&candidates, round_id);
        state.batch.apply_roster_event(RosterEvent::PageAppended);
        Ok(())
    }

    /// Sequentially fetches every page for the current selection, seeding the
    /// ledger as pages land so `snapshot_all` covers the complete cohort.
    /// Holds the cache's load guard for the whole sweep, so a concurrent
    /// "load more" no-ops instead of interleaving page writes. Reports
    /// `(page, total_pages, accumulated)` after each page.
    pub async fn load_all(
        &self,
        mut on_progress: impl FnMut(u32, u32, usize),
    ) -> Result<Vec<Candidate>, AppError> {
        let (round_id, token) = {
            let mut state = self.state();
            let round = Self::selected_round(&state)?;
            if !state.cache.begin_load() {
                return Err(AppError::Validation(
                    "A roster load is already in flight".to_string(),
                ));
            }
            (round.id, state.cancel.clone())
        };

        let mut page_no = 1u32;
        let result = loop {
            let page = match self.fetch_page(round_id, page_no, &token).await {
                Ok(page) => page,
                Err(e) => break Err(e),
            };

            let mut state = self.state();
            if token.is_cancelled() {
                // The selection moved on; its fresh cache was never marked
                // loading.
                return Err(AppError::Cancelled);
            }
            let total_pages = total_pages(page.pagination.total_count, self.page_size);
            if page_no == 1 {
                state.cache.apply_first_page(page);
            } else {
                state.cache.append_page(page);
            }
            let candidates = state.cache.candidates().to_vec();
            state.ledger.seed_page(&candidates, round_id);
            on_progress(page_no, total_pages, candidates.len());

            if !state.cache.has_next() {
                break Ok(candidates);
            }
            page_no += 1;
        };

        let mut state = self.state();
        if !token.is_cancelled() {
            state.cache.end_load();
        }
        result
    }

    /// Records a local status edit. The server value is untouched until the
    /// stage advancement protocol persists the full map.
    pub fn set_status(&self, candidate_id: Uuid, status: RoundStatus) -> Result<(), AppError> {
        let mut state = self.state();
        Self::selected_round(&state)?;
        if !state.ledger.set_current(candidate_id, status) {
            return Err(AppError::NotFound(format!(
                "Candidate {candidate_id} is not part of this round"
            )));
        }
        Ok(())
    }

    // ── Batch evaluation ───────────────────────────────────────────────────

    /// Runs background evaluation for every screening candidate that lacks a
    /// usable score. Idempotent: planned candidates are marked processed
    /// before any call is issued, so concurrent or repeated triggers issue
    /// each evaluation exactly once. Failures land as failure-typed records;
    /// they never abort the batch and are never retried here.
    pub async fn run_pending_evaluations(&self) -> Result<BatchProgress, AppError> {
        let (batch, generation, token) = {
            let mut state = self.state();
            let round = Self::selected_round(&state)?;
            let candidates = state.cache.candidates().to_vec();
            let batch = state.batch.plan(round.round_type, round.id, &candidates);
            (batch, state.batch.generation(), state.cancel.clone())
        };

        if batch.is_empty() {
            return Ok(BatchProgress::default());
        }

        let total = batch.len();
        info!("Starting evaluation batch of {total} candidates");

        let mut tasks = JoinSet::new();
        for item in batch {
            let evaluator = Arc::clone(&self.evaluator);
            let job_opening_id = self.job_opening_id;
            tasks.spawn(async move {
                let outcome = evaluator
                    .evaluate(item.candidate_round_id, job_opening_id)
                    .await;
                (item.candidate_id, outcome)
            });
        }

        let mut progress = BatchProgress::default();
        // Completions arrive in network order, not issue order.
        while let Some(joined) = tasks.join_next().await {
            let (candidate_id, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("Evaluation task panicked: {e}");
                    continue;
                }
            };
            let record = match outcome {
                Ok(record) => record,
                // Transport failure: terminal for the session, recorded as data.
                Err(e) => EvaluationRecord::failure(
                    EvaluationFailureKind::EvaluationError,
                    format!("Evaluation failed: {e}"),
                ),
            };

            let mut state = self.state();
            if token.is_cancelled() || state.batch.generation() != generation {
                // The round was switched or refreshed mid-batch; results for
                // the superseded roster are dropped.
                continue;
            }
            let round_id = state.round.as_ref().map(|r| r.id);
            if let Some(round_id) = round_id {
                write_evaluation(&mut state.cache, candidate_id, round_id, record);
            }
            progress = state.batch.record_completion(candidate_id, generation);
        }

        info!(
            "Evaluation batch finished: {}/{}",
            progress.completed, progress.total
        );
        Ok(progress)
    }

    // ── Re-evaluation ──────────────────────────────────────────────────────

    pub fn show_re_evaluation_options(&self, candidate_id: Uuid) {
        self.state().reeval.show_options(candidate_id);
    }

    pub fn hide_re_evaluation_options(&self, candidate_id: Uuid) {
        self.state().reeval.hide_options(candidate_id);
    }

    /// Explicit single-candidate re-evaluation. Independent of the batch
    /// coordinator's processed set; on success the new record replaces the
    /// old one wholesale.
    pub async fn re_evaluate(
        &self,
        candidate_id: Uuid,
        source: ReEvalSource,
        transcript: Option<String>,
    ) -> Result<EvaluationRecord, AppError> {
        let (candidate_round_id, round_id) = {
            let mut state = self.state();
            let round = Self::selected_round(&state)?;
            let candidate_round_id = state
                .cache
                .candidates()
                .iter()
                .find(|c| c.id == candidate_id)
                .and_then(|c| c.round(round.id))
                .map(|cr| cr.id)
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "Candidate {candidate_id} has no round record in this round"
                    ))
                })?;
            state.reeval.begin(candidate_id, source)?;
            (candidate_round_id, round.id)
        };

        let outcome = match source {
            ReEvalSource::Transcript => {
                let Some(transcript) = transcript.as_deref() else {
                    self.state()
                        .reeval
                        .fail(candidate_id, "No transcript provided");
                    return Err(AppError::Validation(
                        "Transcript re-evaluation requires an uploaded transcript".to_string(),
                    ));
                };
                self.evaluator
                    .evaluate_transcript(candidate_round_id, self.job_opening_id, transcript)
                    .await
            }
            ReEvalSource::ExternalAssessment => {
                self.evaluator
                    .pull_assessment(candidate_round_id, self.job_opening_id)
                    .await
            }
            ReEvalSource::SalesAssessment => {
                self.evaluator
                    .evaluate_sales_assessment(candidate_round_id, self.job_opening_id)
                    .await
            }
        };

        let mut state = self.state();
        match outcome {
            Ok(record) => {
                write_evaluation(&mut state.cache, candidate_id, round_id, record.clone());
                state.reeval.complete(candidate_id);
                Ok(record)
            }
            Err(e) => {
                state.reeval.fail(candidate_id, e.to_string());
                Err(e)
            }
        }
    }

    // ── View snapshot ──────────────────────────────────────────────────────

    pub fn view(&self) -> SessionView {
        let state = self.state();
        let round_id = state.round.as_ref().map(|r| r.id);
        let candidates = state
            .cache
            .candidates()
            .iter()
            .map(|c| {
                let status = round_id
                    .and_then(|rid| state.ledger.current(c.id).or(Some(c.status_for(rid))))
                    .unwrap_or_default();
                CandidateView {
                    id: c.id,
                    name: c.name.clone(),
                    email: c.email.clone(),
                    status,
                    evaluation: round_id.and_then(|rid| c.round(rid)).and_then(|cr| cr.evaluation.clone()),
                    is_evaluating: state.batch.evaluating().contains(&c.id),
                    re_evaluation: state.reeval.state(c.id),
                }
            })
            .collect();

        SessionView {
            round_template_id: round_id,
            candidates,
            changed_count: state.ledger.changed_count(),
            progressing: state.progressing,
            evaluating: state.batch.evaluating().iter().copied().collect(),
            has_more: state.cache.has_next(),
            loading: state.cache.is_loading(),
            batch_progress: state.batch.progress(),
            pagination: state.cache.state(),
        }
    }
}

fn total_pages(total_count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total_count.div_ceil(page_size as u64) as u32
}

/// Restores locally-written evaluation records after a non-forced reload
/// replaced the roster. Records the fresh rows already carry win.
fn carry_local_records(
    cache: &mut PaginationCache,
    local_records: HashMap<Uuid, EvaluationRecord>,
    round_template_id: Uuid,
) {
    for (candidate_id, record) in local_records {
        let Some(candidate) = cache
            .candidates_mut()
            .iter_mut()
            .find(|c| c.id == candidate_id)
        else {
            continue;
        };
        if let Some(round) = candidate.round_mut(round_template_id) {
            if round.evaluation.is_none() {
                round.evaluation = Some(record);
            }
        }
    }
}

/// Replaces (never merges) the evaluation record on a candidate's round.
fn write_evaluation(
    cache: &mut PaginationCache,
    candidate_id: Uuid,
    round_template_id: Uuid,
    record: EvaluationRecord,
) {
    let Some(candidate) = cache
        .candidates_mut()
        .iter_mut()
        .find(|c| c.id == candidate_id)
    else {
        debug!("Evaluation result for {candidate_id} arrived after roster change, dropped");
        return;
    };
    match candidate.round_mut(round_template_id) {
        Some(round) => round.evaluation = Some(record),
        None => warn!("Candidate {candidate_id} lost its round record for {round_template_id}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Test support — mock gateway and evaluator shared by the pipeline tests
// ────────────────────────────────────────────────────────────────────────────


// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
