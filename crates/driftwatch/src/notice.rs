//! User-facing notices for refresh and acknowledge outcomes.

use serde::{Deserialize, Serialize};

use crate::aggregator::AggregateSnapshot;
use crate::client::AckOutcome;
use crate::error::Error;

/// How prominently a notice should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// An action the user asked for went through
    Success,
    /// Normal operation
    Info,
    /// Data is incomplete
    Warning,
    /// Nothing could be loaded
    Error,
}

impl NoticeLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    /// Notice for a completed aggregation. Partial data is never silent.
    #[must_use]
    pub fn for_snapshot(snapshot: &AggregateSnapshot) -> Self {
        if snapshot.is_partial() {
            let unreachable = snapshot.failed_project_ids().join(", ");
            return Self {
                level: NoticeLevel::Warning,
                message: format!(
                    "Partial data, {} projects unreachable ({unreachable}); {} open alerts",
                    snapshot.failed_projects.len(),
                    snapshot.open_count()
                ),
            };
        }
        Self {
            level: NoticeLevel::Info,
            message: format!(
                "{} open alerts across {} projects",
                snapshot.open_count(),
                snapshot.project_count
            ),
        }
    }

    /// Notice for a cycle that failed as a whole.
    #[must_use]
    pub fn for_error(error: &Error) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: format!("Failed to load alerts: {error}"),
        }
    }

    #[must_use]
    pub fn for_ack(alert_id: &str, outcome: AckOutcome) -> Self {
        match outcome {
            AckOutcome::Acknowledged => Self {
                level: NoticeLevel::Success,
                message: format!("Alert {alert_id} acknowledged"),
            },
            AckOutcome::AlreadyAcknowledged => Self {
                level: NoticeLevel::Info,
                message: format!("Alert {alert_id} was already acknowledged"),
            },
            AckOutcome::NotFound => Self {
                level: NoticeLevel::Warning,
                message: format!("Alert {alert_id} not found"),
            },
        }
    }
}
