use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-round decision status for a candidate.
///
/// Every candidate-round starts at `ActionPending`; recruiters flip rows to
/// `Selected`/`Rejected` locally and the full map is persisted on advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Selected,
    Rejected,
    #[default]
    ActionPending,
}

/// Typed reason an evaluation attempt produced no usable score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationFailureKind {
    NoResume,
    EvaluationError,
}

/// One competency dimension scored by the evaluation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetencyScore {
    pub name: String,
    pub score: f64,
    pub rationale: Option<String>,
}

/// Result of one evaluation attempt for a candidate-round.
///
/// A candidate-round holds at most one record; re-evaluation replaces it
/// wholesale. Failures are data, not errors — they carry a zero score and a
/// human-readable summary so the table can render a failure badge inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationRecord {
    Success {
        overall_percentage_score: f64,
        competency_scores: Vec<CompetencyScore>,
        summary: String,
        #[serde(default)]
        extracted_skills: Vec<String>,
    },
    Failure {
        kind: EvaluationFailureKind,
        overall_percentage_score: f64,
        summary: String,
    },
}

impl EvaluationRecord {
    pub fn failure(kind: EvaluationFailureKind, summary: impl Into<String>) -> Self {
        EvaluationRecord::Failure {
            kind,
            overall_percentage_score: 0.0,
            summary: summary.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationRecord::Success { .. })
    }

    pub fn score(&self) -> f64 {
        match self {
            EvaluationRecord::Success {
                overall_percentage_score,
                ..
            }
            | EvaluationRecord::Failure {
                overall_percentage_score,
                ..
            } => *overall_percentage_score,
        }
    }

    /// Whether this record satisfies the "has a usable score" check that keeps
    /// the background batch from re-queuing the candidate.
    pub fn has_usable_score(&self) -> bool {
        self.is_success()
    }
}

/// Association record of one candidate at one round template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRound {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub round_template_id: Uuid,
    pub status: RoundStatus,
    #[serde(default)]
    pub evaluation: Option<EvaluationRecord>,
    /// Optional per-round competency criteria override.
    #[serde(default)]
    pub criteria_override: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A candidate as the gateway returns it: immutable value, refreshed
/// wholesale on fetch, with one `CandidateRound` per pipeline stage entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile: serde_json::Value,
    #[serde(default)]
    pub candidate_rounds: Vec<CandidateRound>,
    /// Legacy top-level status some gateway responses still carry.
    #[serde(default)]
    pub round_status: Option<RoundStatus>,
}

impl Candidate {
    pub fn round(&self, round_template_id: Uuid) -> Option<&CandidateRound> {
        self.candidate_rounds
            .iter()
            .find(|cr| cr.round_template_id == round_template_id)
    }

    pub fn round_mut(&mut self, round_template_id: Uuid) -> Option<&mut CandidateRound> {
        self.candidate_rounds
            .iter_mut()
            .find(|cr| cr.round_template_id == round_template_id)
    }

    /// Resolves the candidate's status for a round: the candidate-round's
    /// status, falling back to the legacy top-level field, then the default.
    pub fn status_for(&self, round_template_id: Uuid) -> RoundStatus {
        self.round(round_template_id)
            .map(|cr| cr.status)
            .or(self.round_status)
            .unwrap_or_default()
    }

    /// Whether this candidate already carries a usable evaluation for the round.
    pub fn has_scored_evaluation(&self, round_template_id: Uuid) -> bool {
        self.round(round_template_id)
            .and_then(|cr| cr.evaluation.as_ref())
            .map(|e| e.has_usable_score())
            .unwrap_or(false)
    }
}
