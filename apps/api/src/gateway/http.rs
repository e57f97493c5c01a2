//! HTTP implementation of the Pipeline Data Gateway.
//!
//! Wraps the recruiting API with retry logic for transient failures. Page
//! fetches retry on 429/5xx; writes (status updates, confirms, bulk creates)
//! are issued exactly once and surface the failure to the caller — the stage
//! advancement protocol owns retry-from-the-top semantics.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::gateway::{CandidatePage, CreatedRound, PipelineGateway, StatusUpdate};
use crate::models::round::RoundTemplate;

const MAX_FETCH_RETRIES: u32 = 3;

pub struct HttpPipelineGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpPipelineGateway {
    pub fn new(base_url: String, api_key: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET with retry on 429/5xx and exponential backoff (1s, 2s, 4s).
    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let mut last_error: Option<AppError> = None;

        for attempt in 0..MAX_FETCH_RETRIES {
            if attempt > 0 {
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!("Gateway fetch attempt {attempt} failed, retrying after {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .get(url)
                .bearer_auth(&self.api_key)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(AppError::Fetch(format!("request to {url} failed: {e}")));
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = Some(AppError::Fetch(format!("gateway returned {status}: {body}")));
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Fetch(format!("gateway returned {status}: {body}")));
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::Fetch(format!("malformed gateway response: {e}")));
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Fetch(format!("gateway fetch failed: {url}"))))
    }

    /// Single-shot write request; maps failures through `err`.
    async fn write<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        err: fn(String) -> AppError,
    ) -> Result<T, AppError> {
        let response = self
            .client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| err(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(err(format!("gateway returned {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| err(format!("malformed gateway response: {e}")))
    }
}

#[derive(serde::Deserialize)]
struct Ack {}

#[derive(serde::Deserialize)]
struct CreatedRounds {
    created: Vec<CreatedRound>,
}

#[async_trait]
impl PipelineGateway for HttpPipelineGateway {
    async fn fetch_round_templates(
        &self,
        job_opening_id: Uuid,
    ) -> Result<Vec<RoundTemplate>, AppError> {
        let url = self.url(&format!("/api/job-openings/{job_opening_id}/round-templates"));
        self.get_with_retry(&url).await
    }

    async fn fetch_candidate_page(
        &self,
        round_template_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<CandidatePage, AppError> {
        let url = self.url(&format!(
            "/api/round-templates/{round_template_id}/candidates?page={page}&page_size={page_size}"
        ));
        let page: CandidatePage = self.get_with_retry(&url).await?;
        debug!(
            "Fetched candidate page {} ({} rows, total {})",
            page.pagination.current_page,
            page.candidates.len(),
            page.pagination.total_count
        );
        Ok(page)
    }

    async fn bulk_update_status(
        &self,
        round_template_id: Uuid,
        updates: &[StatusUpdate],
    ) -> Result<(), AppError> {
        let url = self.url(&format!("/api/round-templates/{round_template_id}/statuses"));
        let _: Ack = self
            .write(Method::PUT, &url, &json!({ "updates": updates }), AppError::Persist)
            .await?;
        Ok(())
    }

    async fn confirm_round_template(&self, round_template_id: Uuid) -> Result<(), AppError> {
        let url = self.url(&format!("/api/round-templates/{round_template_id}/confirm"));
        let _: Ack = self
            .write(Method::POST, &url, &json!({}), AppError::Activation)
            .await?;
        Ok(())
    }

    async fn bulk_create_candidate_rounds(
        &self,
        round_template_id: Uuid,
        updates: &[StatusUpdate],
        created_by: &str,
    ) -> Result<Vec<CreatedRound>, AppError> {
        let url = self.url(&format!(
            "/api/round-templates/{round_template_id}/candidate-rounds"
        ));
        let body = json!({ "candidate_updates": updates, "created_by": created_by });
        let created: CreatedRounds = self
            .write(Method::POST, &url, &body, AppError::Persist)
            .await?;
        Ok(created.created)
    }

    async fn invalidate_candidate_cache(&self, round_template_id: Uuid) -> Result<(), AppError> {
        let url = self.url(&format!(
            "/api/round-templates/{round_template_id}/candidates/cache"
        ));
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("cache invalidation failed: {e}")))?;
        // 404 means the gateway keeps no cache for this template.
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(AppError::Fetch(format!(
                "cache invalidation returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
