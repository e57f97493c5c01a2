use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::coordinator::BatchProgress;
use crate::evaluation::session::ReEvalSource;
use crate::models::candidate::{EvaluationRecord, RoundStatus};
use crate::pipeline::advancement::AdvanceOutcome;
use crate::pipeline::{RoundSession, SessionView};
use crate::state::AppState;

async fn lookup(state: &AppState, session_id: Uuid) -> Result<Arc<RoundSession>, AppError> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))
}

/// Kicks the background batch without blocking the response. Failures are
/// logged; per-candidate outcomes land as records on the roster either way.
fn trigger_batch(session: Arc<RoundSession>) {
    tokio::spawn(async move {
        if let Err(e) = session.run_pending_evaluations().await {
            warn!("Background evaluation batch failed: {e}");
        }
    });
}

#[derive(Deserialize)]
pub struct OpenSessionRequest {
    pub job_opening_id: Uuid,
}

#[derive(Serialize)]
pub struct OpenSessionResponse {
    pub session_id: Uuid,
}

/// POST /api/v1/sessions
pub async fn handle_open_session(
    State(state): State<AppState>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<Json<OpenSessionResponse>, AppError> {
    let session = RoundSession::open(
        Arc::clone(&state.gateway),
        Arc::clone(&state.evaluator),
        req.job_opening_id,
        state.config.page_size,
    )
    .await?;
    let session_id = state.sessions.insert(session).await;
    Ok(Json(OpenSessionResponse { session_id }))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.sessions.remove(id).await {
        return Err(AppError::NotFound(format!("Session {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SelectRoundRequest {
    pub round_template_id: Uuid,
}

/// POST /api/v1/sessions/:id/round
///
/// Selects a round template, loads its first page, and triggers the
/// background batch for screening rounds.
pub async fn handle_select_round(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectRoundRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = lookup(&state, id).await?;
    session.select_round(req.round_template_id)?;
    session.load_first_page(false).await?;
    trigger_batch(Arc::clone(&session));
    Ok(Json(session.view()))
}

#[derive(Deserialize, Default)]
pub struct LoadQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

/// POST /api/v1/sessions/:id/load
pub async fn handle_load(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<SessionView>, AppError> {
    let session = lookup(&state, id).await?;
    session.load_first_page(query.force_refresh).await?;
    trigger_batch(Arc::clone(&session));
    Ok(Json(session.view()))
}

/// POST /api/v1/sessions/:id/load-more
pub async fn handle_load_more(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = lookup(&state, id).await?;
    session.load_more().await?;
    trigger_batch(Arc::clone(&session));
    Ok(Json(session.view()))
}

#[derive(Deserialize)]
pub struct StatusEdit {
    pub status: RoundStatus,
}

/// PATCH /api/v1/sessions/:id/candidates/:cid/status
pub async fn handle_set_status(
    State(state): State<AppState>,
    Path((id, candidate_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<StatusEdit>,
) -> Result<Json<SessionView>, AppError> {
    let session = lookup(&state, id).await?;
    session.set_status(candidate_id, req.status)?;
    Ok(Json(session.view()))
}

/// POST /api/v1/sessions/:id/evaluate
///
/// Synchronous batch trigger: waits for the batch to drain and returns the
/// final progress. Idempotent under repeated calls.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchProgress>, AppError> {
    let session = lookup(&state, id).await?;
    let progress = session.run_pending_evaluations().await?;
    Ok(Json(progress))
}

/// POST /api/v1/sessions/:id/candidates/:cid/re-evaluate/options
pub async fn handle_show_re_evaluate_options(
    State(state): State<AppState>,
    Path((id, candidate_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SessionView>, AppError> {
    let session = lookup(&state, id).await?;
    session.show_re_evaluation_options(candidate_id);
    Ok(Json(session.view()))
}

/// DELETE /api/v1/sessions/:id/candidates/:cid/re-evaluate/options
pub async fn handle_hide_re_evaluate_options(
    State(state): State<AppState>,
    Path((id, candidate_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SessionView>, AppError> {
    let session = lookup(&state, id).await?;
    session.hide_re_evaluation_options(candidate_id);
    Ok(Json(session.view()))
}

#[derive(Deserialize)]
pub struct ReEvaluateRequest {
    pub source: ReEvalSource,
}

/// POST /api/v1/sessions/:id/candidates/:cid/re-evaluate
pub async fn handle_re_evaluate(
    State(state): State<AppState>,
    Path((id, candidate_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReEvaluateRequest>,
) -> Result<Json<EvaluationRecord>, AppError> {
    if req.source == ReEvalSource::Transcript {
        return Err(AppError::Validation(
            "Transcript re-evaluation requires the multipart transcript endpoint".to_string(),
        ));
    }
    let session = lookup(&state, id).await?;
    let record = session.re_evaluate(candidate_id, req.source, None).await?;
    Ok(Json(record))
}

/// POST /api/v1/sessions/:id/candidates/:cid/transcript
pub async fn handle_transcript_re_evaluate(
    State(state): State<AppState>,
    Path((id, candidate_id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> Result<Json<EvaluationRecord>, AppError> {
    let mut transcript: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("transcript") {
            let data: bytes::Bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read transcript: {e}")))?;
            transcript = Some(
                String::from_utf8(data.to_vec())
                    .map_err(|_| AppError::Validation("Transcript must be UTF-8 text".to_string()))?,
            );
        }
    }
    let transcript = transcript.ok_or_else(|| {
        AppError::Validation("Missing 'transcript' field in multipart body".to_string())
    })?;

    let session = lookup(&state, id).await?;
    let record = session
        .re_evaluate(candidate_id, ReEvalSource::Transcript, Some(transcript))
        .await?;
    Ok(Json(record))
}

/// GET /api/v1/sessions/:id/view
pub async fn handle_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = lookup(&state, id).await?;
    Ok(Json(session.view()))
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub created_by: String,
}

/// POST /api/v1/sessions/:id/advance
pub async fn handle_advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdvanceRequest>,
) -> Result<Json<AdvanceOutcome>, AppError> {
    let session = lookup(&state, id).await?;
    let outcome = session.advance_stage(&req.created_by).await?;
    Ok(Json(outcome))
}
