//! Clients for the project directory and per-project alert sources.
//!
//! [`ProjectDirectory`] and [`AlertSource`] are the seams the aggregator is
//! built on. [`ApiClient`] implements both against the DriftGuard HTTP API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DirectoryError, QueryError, QueryErrorKind};
use crate::filter::AlertFilter;
use crate::model::{Alert, Project};

/// Default base URL of the DriftGuard API.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Default per-call timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of an acknowledge request the source accepted or recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    Acknowledged,
    AlreadyAcknowledged,
    NotFound,
}

impl AckOutcome {
    /// Whether the alert is now acknowledged at the source.
    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::AlreadyAcknowledged)
    }
}

/// Authoritative list of known projects.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, DirectoryError>;
}

/// Alerts of one project at a time.
#[async_trait]
pub trait AlertSource: Send + Sync {
    /// Alerts of `project_id` matching `filter`.
    async fn list_alerts(
        &self,
        project_id: &str,
        filter: &AlertFilter,
    ) -> Result<Vec<Alert>, QueryError>;

    /// Acknowledge one alert. Idempotent at the source.
    async fn acknowledge(&self, project_id: &str, alert_id: &str)
        -> Result<AckOutcome, QueryError>;
}

/// HTTP client for the DriftGuard API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a client with a per-call `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn projects_url(&self) -> String {
        format!("{}/api/projects", self.base_url)
    }

    fn alerts_url(&self, project_id: &str) -> String {
        format!(
            "{}/api/projects/{}/alerts",
            self.base_url,
            urlencoding::encode(project_id)
        )
    }

    fn ack_url(&self, project_id: &str, alert_id: &str) -> String {
        format!(
            "{}/api/projects/{}/alerts/{}/ack",
            self.base_url,
            urlencoding::encode(project_id),
            urlencoding::encode(alert_id)
        )
    }

    fn transport_error(&self, project_id: &str, err: &reqwest::Error) -> QueryError {
        if err.is_timeout() {
            QueryError::timeout(project_id, self.timeout)
        } else {
            QueryError::new(project_id, QueryErrorKind::TransportError, err.to_string())
        }
    }
}

/// Map a non-success status to a query error classification.
fn classify_status(status: reqwest::StatusCode) -> QueryErrorKind {
    if status == reqwest::StatusCode::NOT_FOUND {
        QueryErrorKind::NotFound
    } else {
        QueryErrorKind::ServerError
    }
}

fn require_project_id(project_id: &str) -> Result<(), QueryError> {
    if project_id.trim().is_empty() {
        return Err(QueryError::new(
            project_id,
            QueryErrorKind::NotFound,
            "empty project id",
        ));
    }
    Ok(())
}

#[async_trait]
impl ProjectDirectory for ApiClient {
    async fn list_projects(&self) -> Result<Vec<Project>, DirectoryError> {
        let url = self.projects_url();
        debug!(url = %url, "Listing projects");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                DirectoryError::Timeout
            } else {
                DirectoryError::Unavailable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status { status, body });
        }

        response
            .json::<Vec<Project>>()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("invalid project list: {e}")))
    }
}

#[async_trait]
impl AlertSource for ApiClient {
    async fn list_alerts(
        &self,
        project_id: &str,
        filter: &AlertFilter,
    ) -> Result<Vec<Alert>, QueryError> {
        require_project_id(project_id)?;
        let url = self.alerts_url(project_id);
        let query = filter.to_query();
        debug!(project_id = %project_id, params = query.len(), "Querying project alerts");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.transport_error(project_id, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::new(
                project_id,
                classify_status(status),
                format!("status {status}: {body}"),
            ));
        }

        let mut alerts: Vec<Alert> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                QueryError::timeout(project_id, self.timeout)
            } else {
                QueryError::new(
                    project_id,
                    QueryErrorKind::TransportError,
                    format!("invalid alert list: {e}"),
                )
            }
        })?;

        for alert in &mut alerts {
            if alert.normalize() {
                warn!(
                    project_id = %project_id,
                    alert_id = %alert.alert_id,
                    "Dropped feature_name from PREDICTION_SHIFT alert"
                );
            }
        }

        Ok(alerts)
    }

    async fn acknowledge(
        &self,
        project_id: &str,
        alert_id: &str,
    ) -> Result<AckOutcome, QueryError> {
        require_project_id(project_id)?;
        let url = self.ack_url(project_id, alert_id);
        debug!(project_id = %project_id, alert_id = %alert_id, "Acknowledging alert");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| self.transport_error(project_id, &e))?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(AckOutcome::Acknowledged),
            reqwest::StatusCode::NOT_FOUND => Ok(AckOutcome::NotFound),
            reqwest::StatusCode::CONFLICT => Ok(AckOutcome::AlreadyAcknowledged),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(QueryError::new(
                    project_id,
                    QueryErrorKind::ServerError,
                    format!("status {status}: {body}"),
                ))
            }
        }
    }
}
