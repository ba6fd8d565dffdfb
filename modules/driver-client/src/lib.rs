pub mod error;

pub use error::{DriverError, Result};

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use outreach_common::{ActionType, Candidate, ObservedActivity};

/// Client for the browser-driver sidecar.
///
/// The sidecar owns the anti-detect browser profile, navigation and DOM
/// scraping. This client only moves already-parsed JSON across the wire.
pub struct DriverClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// An open browser session on the driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionHandle {
    pub session_id: String,
}

/// What the driver reports after attempting an action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionReport {
    Done,
    /// The page lacked the expected control; nothing was sent.
    Rejected { reason: String },
}

#[derive(Debug, Serialize)]
struct CandidateRequest<'a> {
    action: ActionType,
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    action: ActionType,
    candidate_id: &'a str,
    target_url: &'a str,
    content: &'a str,
}

impl DriverClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}{path}", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DriverError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    /// Open a browser session bound to an anti-detect profile.
    pub async fn start_session(&self, profile_id: &str) -> Result<SessionHandle> {
        let resp = self
            .client
            .post(self.endpoint("/sessions"))
            .json(&json!({ "profile_id": profile_id }))
            .send()
            .await?;

        let handle: SessionHandle = Self::check(resp).await?.json().await?;
        debug!(session_id = %handle.session_id, "Driver session started");
        Ok(handle)
    }

    /// Scrape candidates for `query`: feed posts for comments, people search
    /// results for connections.
    pub async fn list_candidates(
        &self,
        session: &SessionHandle,
        action: ActionType,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let path = format!("/sessions/{}/candidates", session.session_id);
        let resp = self
            .client
            .post(self.endpoint(&path))
            .json(&CandidateRequest {
                action,
                query,
                limit,
            })
            .send()
            .await?;

        Ok(Self::check(resp).await?.json().await?)
    }

    /// Post a comment or send a connection request.
    pub async fn perform_action(
        &self,
        session: &SessionHandle,
        action: ActionType,
        candidate: &Candidate,
        content: &str,
    ) -> Result<ActionReport> {
        let path = format!("/sessions/{}/actions", session.session_id);
        let resp = self
            .client
            .post(self.endpoint(&path))
            .json(&ActionRequest {
                action,
                candidate_id: &candidate.id,
                target_url: &candidate.url,
                content,
            })
            .send()
            .await?;

        Ok(Self::check(resp).await?.json().await?)
    }

    /// Scrape the account's own recent activity with engagement counters.
    pub async fn recent_activity(
        &self,
        session: &SessionHandle,
        limit: usize,
    ) -> Result<Vec<ObservedActivity>> {
        let path = format!("/sessions/{}/activity", session.session_id);
        let resp = self
            .client
            .post(self.endpoint(&path))
            .json(&json!({ "limit": limit }))
            .send()
            .await?;

        Ok(Self::check(resp).await?.json().await?)
    }

    /// Close the browser session. Closing an unknown session is not an error.
    pub async fn close_session(&self, session: &SessionHandle) -> Result<()> {
        let path = format!("/sessions/{}", session.session_id);
        let resp = self.client.delete(self.endpoint(&path)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp).await?;
        debug!(session_id = %session.session_id, "Driver session closed");
        Ok(())
    }
}
