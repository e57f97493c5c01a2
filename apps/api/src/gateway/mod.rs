//! Pipeline Data Gateway — the recruiting API behind the round views.
//!
//! The core never talks to a database or wire format directly; everything
//! flows through this trait. `AppState` holds an `Arc<dyn PipelineGateway>`,
//! swapped for a mock in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::{Candidate, RoundStatus};
use crate::models::round::RoundTemplate;

pub mod http;

/// Pagination metadata as the gateway reports it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub has_next: bool,
}

/// One page of candidates for a round template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePage {
    pub candidates: Vec<Candidate>,
    pub pagination: Pagination,
}

/// One row of a bulk status write or next-stage seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub candidate_id: Uuid,
    pub status: RoundStatus,
}

/// Server-assigned id for one bulk-created candidate-round row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedRound {
    pub candidate_id: Uuid,
    pub candidate_round_id: Uuid,
}

#[async_trait]
pub trait PipelineGateway: Send + Sync {
    /// Ordered stage definitions for a job opening.
    async fn fetch_round_templates(
        &self,
        job_opening_id: Uuid,
    ) -> Result<Vec<RoundTemplate>, AppError>;

    async fn fetch_candidate_page(
        &self,
        round_template_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<CandidatePage, AppError>;

    /// Full-overwrite status write for a round template. Idempotent for
    /// unchanged candidates.
    async fn bulk_update_status(
        &self,
        round_template_id: Uuid,
        updates: &[StatusUpdate],
    ) -> Result<(), AppError>;

    /// Activates ("confirms") a round template so navigation can land on it.
    async fn confirm_round_template(&self, round_template_id: Uuid) -> Result<(), AppError>;

    /// Creates one candidate-round row per update for the given template,
    /// carrying each candidate's seeded status. Upsert semantics on retry.
    async fn bulk_create_candidate_rounds(
        &self,
        round_template_id: Uuid,
        updates: &[StatusUpdate],
        created_by: &str,
    ) -> Result<Vec<CreatedRound>, AppError>;

    /// Drops any server-side listing cache for the template so the next fetch
    /// starts cold. Called before a forced refresh.
    async fn invalidate_candidate_cache(&self, round_template_id: Uuid) -> Result<(), AppError>;
}
