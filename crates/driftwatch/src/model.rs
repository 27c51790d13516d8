//! Projects, alerts, and the enumerations shared by every component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A monitored project, as listed by the project directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warn,
    Critical,
}

/// Kind of drift an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    FeatureDrift,
    PredictionShift,
    Schema,
}

/// Alert lifecycle status. `Ack` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Ack,
}

/// Error returned when a string is not a known enum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! wire_enum {
    ($ty:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $ty {
            /// All variants in wire order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Upper snake case wire name.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($wire) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(UnknownVariant(s.to_string()))
            }
        }
    };
}

wire_enum!(Severity { Warn => "WARN", Critical => "CRITICAL" });
wire_enum!(AlertType {
    FeatureDrift => "FEATURE_DRIFT",
    PredictionShift => "PREDICTION_SHIFT",
    Schema => "SCHEMA",
});
wire_enum!(AlertStatus { Open => "OPEN", Ack => "ACK" });

/// A drift alert raised by one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub project_id: String,
    pub baseline_version: i64,
    pub created_at: DateTime<Utc>,
    pub severity: Severity,
    pub alert_type: AlertType,
    #[serde(default)]
    pub feature_name: Option<String>,
    #[serde(default)]
    pub metric_value: Option<f64>,
    pub message: String,
    pub status: AlertStatus,
}

impl Alert {
    /// `(project_id, alert_id)`, the globally unique identity of an alert.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.project_id, &self.alert_id)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }

    /// Drops a feature name carried by a prediction shift alert.
    ///
    /// Returns `true` if the alert was changed.
    pub fn normalize(&mut self) -> bool {
        if self.alert_type == AlertType::PredictionShift && self.feature_name.is_some() {
            self.feature_name = None;
            return true;
        }
        false
    }
}
