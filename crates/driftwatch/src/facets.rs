//! Filter choices derived from a loaded alert collection.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::model::Alert;

/// Distinct, lexicographically sorted facet values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub alert_types: Vec<String>,
    pub feature_names: Vec<String>,
}

impl Facets {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alert_types.is_empty() && self.feature_names.is_empty()
    }
}

/// Collect the alert types and feature names present in `alerts`.
///
/// Pass the unfiltered alert set so that choices the user could switch to
/// stay available. Absent and blank feature names are skipped.
#[must_use]
pub fn extract_facets(alerts: &[Alert]) -> Facets {
    let mut alert_types = BTreeSet::new();
    let mut feature_names = BTreeSet::new();

    for alert in alerts {
        alert_types.insert(alert.alert_type.as_str().to_string());
        if let Some(feature) = alert.feature_name.as_deref().filter(|f| !f.trim().is_empty()) {
            feature_names.insert(feature.to_string());
        }
    }

    Facets {
        alert_types: alert_types.into_iter().collect(),
        feature_names: feature_names.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertStatus, AlertType, Severity};
    use chrono::Utc;

    fn alert(alert_type: AlertType, feature: Option<&str>) -> Alert {
        Alert {
            alert_id: "a".to_string(),
            project_id: "p".to_string(),
            baseline_version: 1,
            created_at: Utc::now(),
            severity: Severity::Warn,
            alert_type,
            feature_name: feature.map(str::to_string),
            metric_value: None,
            message: String::new(),
            status: AlertStatus::Open,
        }
    }

    #[test]
    fn test_facets_are_sorted_and_unique() {
        let facets = extract_facets(&[
            alert(AlertType::Schema, Some("zip")),
            alert(AlertType::FeatureDrift, Some("age")),
            alert(AlertType::FeatureDrift, Some("zip")),
            alert(AlertType::PredictionShift, None),
        ]);
        assert_eq!(
            facets.alert_types,
            vec!["FEATURE_DRIFT", "PREDICTION_SHIFT", "SCHEMA"]
        );
        assert_eq!(facets.feature_names, vec!["age", "zip"]);
    }

    #[test]
    fn test_missing_and_blank_features_are_excluded() {
        let facets = extract_facets(&[
            alert(AlertType::PredictionShift, None),
            alert(AlertType::Schema, Some("")),
        ]);
        assert!(facets.feature_names.is_empty());
        assert_eq!(facets.alert_types, vec!["PREDICTION_SHIFT", "SCHEMA"]);
    }

    #[test]
    fn test_no_alerts_no_facets() {
        assert!(extract_facets(&[]).is_empty());
    }
}
