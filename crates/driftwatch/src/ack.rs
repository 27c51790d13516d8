//! Acknowledge requests with a provisional local view.
//!
//! A successful acknowledge marks the alert as provisionally acknowledged in
//! the tracker. Snapshots are never modified; [`AckTracker::view`] overlays
//! the provisional flags on top of them, and [`AckTracker::reconcile`] drops
//! flags once a later snapshot has spoken for the alert.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::aggregator::AggregateSnapshot;
use crate::client::{AckOutcome, AlertSource};
use crate::error::QueryError;
use crate::model::{Alert, AlertStatus};

type AlertKey = (String, String);

/// An authoritative alert plus its local provisional state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertView {
    pub alert: Alert,
    pub provisional_ack: bool,
}

impl AlertView {
    /// Status to display: `Ack` while an acknowledge awaits confirmation.
    #[must_use]
    pub fn effective_status(&self) -> AlertStatus {
        if self.provisional_ack {
            AlertStatus::Ack
        } else {
            self.alert.status
        }
    }
}

/// Issues acknowledge requests and remembers them until reconciled.
pub struct AckTracker {
    source: Arc<dyn AlertSource>,
    provisional: RwLock<HashMap<AlertKey, DateTime<Utc>>>,
}

impl AckTracker {
    pub fn new(source: Arc<dyn AlertSource>) -> Self {
        Self {
            source,
            provisional: RwLock::new(HashMap::new()),
        }
    }

    /// Acknowledge an alert at its source.
    ///
    /// Only an acknowledged outcome records a provisional flag; not-found is
    /// returned as-is and transport failures propagate.
    pub async fn acknowledge(
        &self,
        project_id: &str,
        alert_id: &str,
    ) -> Result<AckOutcome, QueryError> {
        let outcome = self.source.acknowledge(project_id, alert_id).await?;

        if outcome.is_acknowledged() {
            info!(project_id = %project_id, alert_id = %alert_id, ?outcome, "Alert acknowledged");
            self.provisional
                .write()
                .await
                .insert((project_id.to_string(), alert_id.to_string()), Utc::now());
        } else {
            warn!(project_id = %project_id, alert_id = %alert_id, "Alert to acknowledge not found");
        }

        Ok(outcome)
    }

    pub async fn is_provisional(&self, project_id: &str, alert_id: &str) -> bool {
        self.provisional
            .read()
            .await
            .contains_key(&(project_id.to_string(), alert_id.to_string()))
    }

    pub async fn pending(&self) -> usize {
        self.provisional.read().await.len()
    }

    /// Alerts of `snapshot` with provisional flags applied.
    pub async fn view(&self, snapshot: &AggregateSnapshot) -> Vec<AlertView> {
        let provisional = self.provisional.read().await;
        snapshot
            .alerts
            .iter()
            .map(|alert| AlertView {
                provisional_ack: alert.status == AlertStatus::Open
                    && provisional
                        .contains_key(&(alert.project_id.clone(), alert.alert_id.clone())),
                alert: alert.clone(),
            })
            .collect()
    }

    /// Drop provisional flags that `snapshot` supersedes.
    ///
    /// A flag is superseded when the snapshot's cycle started after the
    /// acknowledge and its project answered. Flags of projects that failed
    /// this cycle, or acknowledged while it was running, are kept. Returns
    /// the number of flags dropped.
    pub async fn reconcile(&self, snapshot: &AggregateSnapshot) -> usize {
        let failed: HashSet<&str> = snapshot
            .failed_projects
            .iter()
            .map(|f| f.project_id.as_str())
            .collect();

        let mut provisional = self.provisional.write().await;
        let before = provisional.len();
        provisional.retain(|(project_id, alert_id), acked_at| {
            let keep = failed.contains(project_id.as_str()) || *acked_at >= snapshot.started_at;
            if !keep {
                debug!(project_id = %project_id, alert_id = %alert_id, "Provisional ack reconciled");
            }
            keep
        });
        before - provisional.len()
    }
}
