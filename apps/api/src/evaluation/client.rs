//! Evaluation Client — the single point of entry for all AI-evaluation calls.
//!
//! The scoring internals are opaque: this module only knows the request shape
//! and the outcome shape. Typed failures (`no_resume`, `evaluation_error`)
//! come back as `EvaluationRecord::Failure` data, never as `Err` — only
//! transport-level problems surface as `AppError::Evaluation`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::{CompetencyScore, EvaluationFailureKind, EvaluationRecord};

const MAX_RETRIES: u32 = 3;

#[async_trait]
pub trait EvaluationClient: Send + Sync {
    /// Evaluates a candidate-round from the resume on file.
    async fn evaluate(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
    ) -> Result<EvaluationRecord, AppError>;

    /// Re-evaluates from an uploaded interview transcript.
    async fn evaluate_transcript(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
        transcript: &str,
    ) -> Result<EvaluationRecord, AppError>;

    /// Re-evaluates by pulling results from the external assessment provider.
    async fn pull_assessment(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
    ) -> Result<EvaluationRecord, AppError>;

    /// Domain-specific sales-assessment evaluation.
    async fn evaluate_sales_assessment(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
    ) -> Result<EvaluationRecord, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

/// Raw evaluation service response. `error_type` present means a typed
/// failure; otherwise the success fields are populated.
#[derive(Debug, Deserialize)]
struct EvaluationResponse {
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    overall_percentage_score: Option<f64>,
    #[serde(default)]
    competency_scores: Vec<CompetencyWire>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    extracted_skills: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CompetencyWire {
    name: String,
    score: f64,
    #[serde(default)]
    rationale: Option<String>,
}

impl EvaluationResponse {
    fn into_record(self) -> EvaluationRecord {
        match self.error_type.as_deref() {
            Some("no_resume") => EvaluationRecord::failure(
                EvaluationFailureKind::NoResume,
                self.summary
                    .unwrap_or_else(|| "No resume available for evaluation".to_string()),
            ),
            Some(_) => EvaluationRecord::failure(
                EvaluationFailureKind::EvaluationError,
                self.summary
                    .unwrap_or_else(|| "Evaluation failed".to_string()),
            ),
            None => EvaluationRecord::Success {
                overall_percentage_score: self.overall_percentage_score.unwrap_or(0.0),
                competency_scores: self
                    .competency_scores
                    .into_iter()
                    .map(|c| CompetencyScore {
                        name: c.name,
                        score: c.score,
                        rationale: c.rationale,
                    })
                    .collect(),
                summary: self.summary.unwrap_or_default(),
                extracted_skills: self.extracted_skills,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

pub struct HttpEvaluationClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpEvaluationClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// POST with retry on 429/5xx and exponential backoff (1s, 2s, 4s).
    async fn post_with_retry(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<EvaluationRecord, AppError> {
        let url = format!("{}{path}", self.base_url);
        let mut last_error: Option<AppError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Evaluation call attempt {attempt} failed, retrying after {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(AppError::Evaluation(format!("request failed: {e}")));
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error =
                    Some(AppError::Evaluation(format!("service returned {status}: {body}")));
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Evaluation(format!(
                    "service returned {status}: {body}"
                )));
            }

            let parsed: EvaluationResponse = response
                .json()
                .await
                .map_err(|e| AppError::Evaluation(format!("malformed response: {e}")))?;
            let record = parsed.into_record();
            debug!(
                "Evaluation completed: success={}, score={}",
                record.is_success(),
                record.score()
            );
            return Ok(record);
        }

        Err(last_error.unwrap_or_else(|| AppError::Evaluation("evaluation failed".to_string())))
    }
}

#[async_trait]
impl EvaluationClient for HttpEvaluationClient {
    async fn evaluate(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
    ) -> Result<EvaluationRecord, AppError> {
        self.post_with_retry(
            "/api/evaluations",
            json!({
                "candidate_round_id": candidate_round_id,
                "job_opening_id": job_opening_id,
            }),
        )
        .await
    }

    async fn evaluate_transcript(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
        transcript: &str,
    ) -> Result<EvaluationRecord, AppError> {
        self.post_with_retry(
            "/api/evaluations/transcript",
            json!({
                "candidate_round_id": candidate_round_id,
                "job_opening_id": job_opening_id,
                "transcript": transcript,
            }),
        )
        .await
    }

    async fn pull_assessment(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
    ) -> Result<EvaluationRecord, AppError> {
        self.post_with_retry(
            "/api/evaluations/assessment-pull",
            json!({
                "candidate_round_id": candidate_round_id,
                "job_opening_id": job_opening_id,
            }),
        )
        .await
    }

    async fn evaluate_sales_assessment(
        &self,
        candidate_round_id: Uuid,
        job_opening_id: Uuid,
    ) -> Result<EvaluationRecord, AppError> {
        self.post_with_retry(
            "/api/evaluations/sales-assessment",
            json!({
                "candidate_round_id": candidate_round_id,
                "job_opening_id": job_opening_id,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_resume_response_maps_to_typed_failure() {
        let response: EvaluationResponse = serde_json::from_value(json!({
            "error_type": "no_resume",
            "summary": "Candidate has not uploaded a resume"
        }))
        .unwrap();
        let record = response.into_record();
        assert_eq!(record.score(), 0.0);
        match record {
            EvaluationRecord::Failure { kind, summary, .. } => {
                assert_eq!(kind, EvaluationFailureKind::NoResume);
                assert!(summary.contains("resume"));
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_unknown_error_type_maps_to_evaluation_error() {
        let response: EvaluationResponse = serde_json::from_value(json!({
            "error_type": "model_overloaded"
        }))
        .unwrap();
        match response.into_record() {
            EvaluationRecord::Failure { kind, .. } => {
                assert_eq!(kind, EvaluationFailureKind::EvaluationError)
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_success_response_maps_scores_and_skills() {
        let response: EvaluationResponse = serde_json::from_value(json!({
            "overall_percentage_score": 78.5,
            "competency_scores": [
                {"name": "Rust", "score": 0.9, "rationale": "deep systems work"},
                {"name": "Communication", "score": 0.6}
            ],
            "summary": "Strong systems background",
            "extracted_skills": ["rust", "tokio"]
        }))
        .unwrap();
        let record = response.into_record();
        assert!(record.has_usable_score());
        match record {
            EvaluationRecord::Success {
                overall_percentage_score,
                competency_scores,
                extracted_skills,
                ..
            } => {
                assert_eq!(overall_percentage_score, 78.5);
                assert_eq!(competency_scores.len(), 2);
                assert_eq!(extracted_skills, vec!["rust", "tokio"]);
            }
            _ => panic!("expected success"),
        }
    }
}
