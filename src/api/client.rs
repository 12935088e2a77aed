//! HTTP client for the tournament scoring API.
//!
//! One typed method per endpoint the cache layer reads or mutates. Fetch
//! endpoints return either a bare collection or an envelope with a
//! well-known field; mutation endpoints return void or the authoritative
//! server entity.

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::SyncError;
use crate::models::{
    Award, ChampionshipId, Cluster, ClusterId, ClusterJudgesResponse, Coach, Contest, ContestId,
    Judge, JudgeId, NewJudge, NewTeam, Scoresheet, ScoresheetKey, SubmissionStatus, Team, TeamId,
    TeamTotal,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the scoring backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given bearer token, sharing the
    /// connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, SyncError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| SyncError::InvalidResponse(e.to_string()))?,
            );
        }
        Ok(headers)
    }

    /// Send a request, retrying with exponential backoff on 429 and mapping
    /// any non-success status through `SyncError::from_status`.
    async fn send_checked(&self, req: RequestBuilder) -> Result<reqwest::Response, SyncError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let attempt = req.try_clone().ok_or(SyncError::InvalidResponse(
                "request body is not retryable".to_string(),
            ))?;
            let response = attempt.headers(self.auth_headers()?).send().await?;

            if response.status().is_success() {
                return Ok(response);
            }

            if response.status().as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(SyncError::RateLimited);
                }
                warn!(retry = retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::from_status(status, &body));
        }
    }

    async fn parse_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SyncError> {
        let url = response.url().to_string();
        response
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(format!("from {}: {}", url, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let response = self.send_checked(self.client.get(self.url(path))).await?;
        Self::parse_json(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let response = self
            .send_checked(self.client.post(self.url(path)).json(body))
            .await?;
        Self::parse_json(response).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let response = self
            .send_checked(self.client.put(self.url(path)).json(body))
            .await?;
        Self::parse_json(response).await
    }

    /// POST with no response body expected.
    async fn post_void<B: Serialize>(&self, path: &str, body: &B) -> Result<(), SyncError> {
        self.send_checked(self.client.post(self.url(path)).json(body))
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), SyncError> {
        self.send_checked(self.client.delete(self.url(path)))
            .await?;
        Ok(())
    }

    // ===== Judges =====

    /// Fetch the judges assigned to a cluster.
    pub async fn fetch_cluster_judges(
        &self,
        cluster_id: ClusterId,
    ) -> Result<Vec<Judge>, SyncError> {
        let response: ClusterJudgesResponse = self
            .get(&format!("/clusters/{}/judges", cluster_id))
            .await?;
        Ok(response.judges)
    }

    pub async fn create_judge(
        &self,
        cluster_id: ClusterId,
        judge: &NewJudge,
    ) -> Result<Judge, SyncError> {
        self.post(&format!("/clusters/{}/judges", cluster_id), judge)
            .await
    }

    pub async fn update_judge(&self, judge: &Judge) -> Result<Judge, SyncError> {
        self.put(&format!("/judges/{}", judge.id), judge).await
    }

    pub async fn delete_judge(&self, judge_id: JudgeId) -> Result<(), SyncError> {
        self.delete(&format!("/judges/{}", judge_id)).await
    }

    /// Move a judge between clusters.
    pub async fn move_judge(
        &self,
        judge_id: JudgeId,
        from: ClusterId,
        to: ClusterId,
    ) -> Result<(), SyncError> {
        let body = serde_json::json!({
            "fromClusterId": from,
            "toClusterId": to,
        });
        self.post_void(&format!("/judges/{}/move", judge_id), &body)
            .await
    }

    // ===== Teams =====

    pub async fn fetch_cluster_teams(
        &self,
        cluster_id: ClusterId,
    ) -> Result<Vec<Team>, SyncError> {
        self.get(&format!("/clusters/{}/teams", cluster_id)).await
    }

    pub async fn create_team(
        &self,
        cluster_id: ClusterId,
        team: &NewTeam,
    ) -> Result<Team, SyncError> {
        self.post(&format!("/clusters/{}/teams", cluster_id), team)
            .await
    }

    pub async fn update_team(&self, team: &Team) -> Result<Team, SyncError> {
        self.put(&format!("/teams/{}", team.id), team).await
    }

    pub async fn delete_team(&self, team_id: TeamId) -> Result<(), SyncError> {
        self.delete(&format!("/teams/{}", team_id)).await
    }

    pub async fn fetch_team_contest(&self, team_id: TeamId) -> Result<Contest, SyncError> {
        self.get(&format!("/teams/{}/contest", team_id)).await
    }

    pub async fn fetch_team_coach(&self, team_id: TeamId) -> Result<Coach, SyncError> {
        self.get(&format!("/teams/{}/coach", team_id)).await
    }

    pub async fn fetch_team_awards(&self, team_id: TeamId) -> Result<Vec<Award>, SyncError> {
        self.get(&format!("/teams/{}/awards", team_id)).await
    }

    pub async fn fetch_team_total(&self, team_id: TeamId) -> Result<TeamTotal, SyncError> {
        self.get(&format!("/teams/{}/total", team_id)).await
    }

    // ===== Tournament structure =====

    pub async fn fetch_contest_clusters(
        &self,
        contest_id: ContestId,
    ) -> Result<Vec<Cluster>, SyncError> {
        self.get(&format!("/contests/{}/clusters", contest_id))
            .await
    }

    pub async fn fetch_championship_contests(
        &self,
        championship_id: ChampionshipId,
    ) -> Result<Vec<Contest>, SyncError> {
        self.get(&format!("/championships/{}/contests", championship_id))
            .await
    }

    // ===== Scoresheets =====

    fn scoresheet_path(key: &ScoresheetKey) -> String {
        format!(
            "/teams/{}/judges/{}/scoresheets/{}",
            key.team_id, key.judge_id, key.sheet_type
        )
    }

    pub async fn fetch_scoresheet(&self, key: &ScoresheetKey) -> Result<Scoresheet, SyncError> {
        self.get(&Self::scoresheet_path(key)).await
    }

    /// Save a scoresheet draft. The server recomputes the total and returns
    /// the authoritative sheet.
    pub async fn save_scoresheet(&self, sheet: &Scoresheet) -> Result<Scoresheet, SyncError> {
        self.put(&Self::scoresheet_path(&sheet.key()), sheet).await
    }

    pub async fn submit_scoresheet(&self, key: &ScoresheetKey) -> Result<(), SyncError> {
        let path = format!("{}/submit", Self::scoresheet_path(key));
        self.post_void(&path, &serde_json::json!({})).await
    }

    pub async fn fetch_submission_status(
        &self,
        cluster_id: ClusterId,
    ) -> Result<SubmissionStatus, SyncError> {
        self.get(&format!("/clusters/{}/submissionStatus", cluster_id))
            .await
    }
}
