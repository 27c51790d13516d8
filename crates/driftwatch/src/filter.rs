//! Alert filters.
//!
//! [`FilterInput`] holds what a caller typed; [`FilterInput::resolve`] turns it
//! into a validated [`AlertFilter`] whose time bounds are absolute UTC
//! instants. Both bounds are inclusive.

use chrono::{
    DateTime, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::InvalidFilterError;
use crate::model::{Alert, AlertStatus, AlertType, Severity};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Raw, untyped filter values as supplied by a user. Empty strings count as
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInput {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub feature_name: Option<String>,
    pub alert_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl FilterInput {
    /// Whether any field carries a non-empty value.
    #[must_use]
    pub fn has_active_filters(&self) -> bool {
        [
            &self.status,
            &self.severity,
            &self.feature_name,
            &self.alert_type,
            &self.start_time,
            &self.end_time,
        ]
        .into_iter()
        .any(|field| non_empty(field.as_deref()).is_some())
    }

    /// Reset every field.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Parse and validate, interpreting naive times in `tz`.
    pub fn resolve<Tz: TimeZone>(&self, tz: &Tz) -> Result<AlertFilter, InvalidFilterError> {
        let filter = AlertFilter {
            status: parse_enum("status", self.status.as_deref())?,
            severity: parse_enum("severity", self.severity.as_deref())?,
            feature_name: non_empty(self.feature_name.as_deref()).map(str::to_string),
            alert_type: parse_enum("alert_type", self.alert_type.as_deref())?,
            start_time: parse_bound("start_time", self.start_time.as_deref(), tz)?,
            end_time: parse_bound("end_time", self.end_time.as_deref(), tz)?,
        };
        filter.validate()?;
        Ok(filter)
    }
}

/// AND-combined optional predicates over alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub feature_name: Option<String>,
    pub alert_type: Option<AlertType>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AlertFilter {
    /// A filter with no predicates.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_query().is_empty()
    }

    /// Rejects an inverted time range.
    pub fn validate(&self) -> Result<(), InvalidFilterError> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(InvalidFilterError::InvertedRange {
                    start: canonical_timestamp(&start),
                    end: canonical_timestamp(&end),
                });
            }
        }
        Ok(())
    }

    /// Query parameters for the per-project alert source. Absent predicates
    /// are omitted.
    #[must_use]
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(severity) = self.severity {
            params.push(("severity", severity.as_str().to_string()));
        }
        if let Some(feature) = non_empty(self.feature_name.as_deref()) {
            params.push(("feature_name", feature.to_string()));
        }
        if let Some(alert_type) = self.alert_type {
            params.push(("alert_type", alert_type.as_str().to_string()));
        }
        if let Some(start) = &self.start_time {
            params.push(("start_time", canonical_timestamp(start)));
        }
        if let Some(end) = &self.end_time {
            params.push(("end_time", canonical_timestamp(end)));
        }
        params
    }

    /// Evaluate the filter locally against one alert.
    #[must_use]
    pub fn matches(&self, alert: &Alert) -> bool {
        if self.status.is_some_and(|s| s != alert.status) {
            return false;
        }
        if self.severity.is_some_and(|s| s != alert.severity) {
            return false;
        }
        if let Some(feature) = non_empty(self.feature_name.as_deref()) {
            if alert.feature_name.as_deref() != Some(feature) {
                return false;
            }
        }
        if self.alert_type.is_some_and(|t| t != alert.alert_type) {
            return false;
        }
        if self.start_time.is_some_and(|start| alert.created_at < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| alert.created_at > end) {
            return false;
        }
        true
    }
}

/// RFC 3339 UTC with millisecond precision and a `Z` suffix.
#[must_use]
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert a caller-supplied time to a UTC instant.
///
/// Inputs carrying an offset are taken as-is. Naive date-times and bare dates
/// are interpreted in `tz`; a local time that does not exist there is an
/// error, an ambiguous one resolves to the earlier instant. The result is
/// truncated to whole milliseconds, the precision sent on the wire.
pub fn canonicalize_time<Tz: TimeZone>(
    field: &'static str,
    input: &str,
    tz: &Tz,
) -> Result<DateTime<Utc>, InvalidFilterError> {
    let input = input.trim();
    let invalid = |reason: &str| InvalidFilterError::InvalidTime {
        field,
        value: input.to_string(),
        reason: reason.to_string(),
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc).trunc_subsecs(3));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| invalid("not a recognised date or date-time"))?;

    let ts = match tz.from_local_datetime(&naive) {
        LocalResult::Single(ts) => ts,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => return Err(invalid("local time does not exist in this timezone")),
    };
    Ok(ts.with_timezone(&Utc).trunc_subsecs(3))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_enum<T: std::str::FromStr>(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, InvalidFilterError> {
    non_empty(value)
        .map(|v| {
            v.parse::<T>().map_err(|_| InvalidFilterError::UnknownValue {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}

fn parse_bound<Tz: TimeZone>(
    field: &'static str,
    value: Option<&str>,
    tz: &Tz,
) -> Result<Option<DateTime<Utc>>, InvalidFilterError> {
    non_empty(value)
        .map(|v| canonicalize_time(field, v, tz))
        .transpose()
}
