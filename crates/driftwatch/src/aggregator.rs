//! Fan-out/fan-in aggregation of alerts across projects.
//!
//! [`Aggregator::aggregate`] queries every project in parallel, contains
//! per-project failures in the resulting [`AggregateSnapshot`], and orders
//! the merged alerts newest first. [`Refresher`] adds the project directory
//! lookup in front of it to form one refresh cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::{AlertSource, ProjectDirectory, DEFAULT_QUERY_TIMEOUT};
use crate::error::{DirectoryError, InvalidFilterError, QueryError, QueryErrorKind, Result};
use crate::filter::AlertFilter;
use crate::model::{Alert, AlertStatus, Project, Severity};

/// Tuning for the fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Maximum number of project queries in flight; `None` means one per project
    pub max_in_flight: Option<usize>,
    /// Timeout applied to each project query individually
    pub query_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Result of one aggregation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    /// When the cycle began, before any project was queried
    pub started_at: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
    /// Number of projects the fan-out covered
    pub project_count: usize,
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_status: BTreeMap<AlertStatus, usize>,
    /// Merged alerts, newest first, ties by ascending alert id
    pub alerts: Vec<Alert>,
    /// Projects whose query failed this cycle, ordered by project id
    pub failed_projects: Vec<QueryError>,
    /// Display names of the projects covered, by project id
    pub project_names: BTreeMap<String, String>,
}

impl AggregateSnapshot {
    /// Snapshot of zero projects.
    #[must_use]
    pub fn empty() -> Self {
        Self::build(0, Vec::new(), Vec::new())
    }

    /// Sort alerts and failures and compute the counters.
    #[must_use]
    pub fn build(project_count: usize, mut alerts: Vec<Alert>, mut failed: Vec<QueryError>) -> Self {
        alerts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.alert_id.cmp(&b.alert_id))
                .then_with(|| a.project_id.cmp(&b.project_id))
        });
        failed.sort_by(|a, b| a.project_id.cmp(&b.project_id));

        let mut by_severity = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        for alert in &alerts {
            *by_severity.entry(alert.severity).or_insert(0) += 1;
            *by_status.entry(alert.status).or_insert(0) += 1;
        }

        let computed_at = Utc::now();
        Self {
            started_at: computed_at,
            computed_at,
            project_count,
            total: alerts.len(),
            by_severity,
            by_status,
            alerts,
            failed_projects: failed,
            project_names: BTreeMap::new(),
        }
    }

    /// Stamp the cycle start. Keeps the earlier of the two instants.
    #[must_use]
    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = self.started_at.min(at);
        self
    }

    /// Narrow the snapshot locally, recomputing the counters.
    #[must_use]
    pub fn filtered(&self, filter: &AlertFilter) -> Self {
        let alerts = self
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        let mut narrowed = Self::build(self.project_count, alerts, self.failed_projects.clone());
        narrowed.started_at = self.started_at;
        narrowed.computed_at = self.computed_at;
        narrowed.project_names.clone_from(&self.project_names);
        narrowed
    }

    #[must_use]
    pub fn severity_count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn status_count(&self, status: AlertStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn critical_count(&self) -> usize {
        self.severity_count(Severity::Critical)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.severity_count(Severity::Warn)
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.status_count(AlertStatus::Open)
    }

    /// Whether some projects did not respond.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failed_projects.is_empty()
    }

    /// Display name of a project, falling back to its id.
    #[must_use]
    pub fn project_name<'a>(&'a self, project_id: &'a str) -> &'a str {
        self.project_names
            .get(project_id)
            .map_or(project_id, String::as_str)
    }

    #[must_use]
    pub fn failed_project_ids(&self) -> Vec<&str> {
        self.failed_projects
            .iter()
            .map(|f| f.project_id.as_str())
            .collect()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} alerts ({} open; {} critical, {} warn) across {} projects",
            self.total,
            self.open_count(),
            self.critical_count(),
            self.warning_count(),
            self.project_count
        );
        if self.is_partial() {
            line.push_str(&format!(
                "; partial data, {} projects unreachable",
                self.failed_projects.len()
            ));
        }
        line
    }
}

/// Issues one query per project and merges the outcomes.
#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn AlertSource>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(source: Arc<dyn AlertSource>, config: AggregatorConfig) -> Self {
        Self { source, config }
    }

    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn AlertSource> {
        &self.source
    }

    /// Query every project concurrently and merge the results.
    ///
    /// Per-project failures land in `failed_projects`; the only error is an
    /// invalid filter. Returns once every query has completed or timed out.
    pub async fn aggregate(
        &self,
        projects: &[Project],
        filter: &AlertFilter,
    ) -> std::result::Result<AggregateSnapshot, InvalidFilterError> {
        filter.validate()?;
        let started_at = Utc::now();

        if projects.is_empty() {
            debug!("No projects known, returning empty snapshot");
            return Ok(AggregateSnapshot::empty().started(started_at));
        }

        let limit = self
            .config
            .max_in_flight
            .unwrap_or(projects.len())
            .max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let filter = Arc::new(filter.clone());
        let timeout = self.config.query_timeout;

        info!(
            project_count = projects.len(),
            max_in_flight = limit,
            "Fanning out alert queries"
        );

        let mut tasks = JoinSet::new();
        let mut task_projects = HashMap::with_capacity(projects.len());
        for project in projects {
            let project_id = project.project_id.clone();
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let filter = Arc::clone(&filter);
            let task_project = project_id.clone();

            let handle = tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(QueryError::new(
                        &project_id,
                        QueryErrorKind::TransportError,
                        "query slots closed",
                    ));
                };
                query_project(source.as_ref(), &project_id, &filter, timeout).await
            });
            task_projects.insert(handle.id(), task_project);
        }

        let mut alerts = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(project_alerts))) => {
                    debug!(
                        project_id = %task_projects.get(&id).map_or("?", String::as_str),
                        alert_count = project_alerts.len(),
                        "Project query completed"
                    );
                    alerts.extend(project_alerts);
                }
                Ok((_, Err(err))) => {
                    warn!(
                        project_id = %err.project_id,
                        kind = %err.kind,
                        error = %err.message,
                        "Project alert query failed"
                    );
                    failed.push(err);
                }
                Err(join_err) => {
                    let project_id = task_projects
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_default();
                    warn!(project_id = %project_id, error = %join_err, "Project query task aborted");
                    failed.push(QueryError::new(
                        project_id,
                        QueryErrorKind::TransportError,
                        format!("query task failed: {join_err}"),
                    ));
                }
            }
        }

        let mut snapshot =
            AggregateSnapshot::build(projects.len(), alerts, failed).started(started_at);
        snapshot.project_names = projects
            .iter()
            .map(|p| (p.project_id.clone(), p.name.clone()))
            .collect();
        info!(
            total = snapshot.total,
            failed = snapshot.failed_projects.len(),
            "Aggregation complete"
        );
        Ok(snapshot)
    }
}

async fn query_project(
    source: &dyn AlertSource,
    project_id: &str,
    filter: &AlertFilter,
    timeout: Duration,
) -> std::result::Result<Vec<Alert>, QueryError> {
    if project_id.trim().is_empty() {
        return Err(QueryError::new(
            project_id,
            QueryErrorKind::NotFound,
            "empty project id",
        ));
    }
    match tokio::time::timeout(timeout, source.list_alerts(project_id, filter)).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::timeout(project_id, timeout)),
    }
}

/// One refresh cycle: list projects, then aggregate.
#[derive(Clone)]
pub struct Refresher {
    directory: Arc<dyn ProjectDirectory>,
    aggregator: Aggregator,
    filter: AlertFilter,
    scope: Option<String>,
}

impl Refresher {
    pub fn new(
        directory: Arc<dyn ProjectDirectory>,
        aggregator: Aggregator,
        filter: AlertFilter,
    ) -> Self {
        Self {
            directory,
            aggregator,
            filter,
            scope: None,
        }
    }

    /// Restrict every cycle to a single project.
    #[must_use]
    pub fn scoped_to(mut self, project_id: impl Into<String>) -> Self {
        self.scope = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn filter(&self) -> &AlertFilter {
        &self.filter
    }

    /// List the projects in scope.
    pub async fn projects(&self) -> std::result::Result<Vec<Project>, DirectoryError> {
        let timeout = self.aggregator.config().query_timeout;
        let projects = tokio::time::timeout(timeout, self.directory.list_projects())
            .await
            .map_err(|_| DirectoryError::Timeout)??;

        Ok(match &self.scope {
            Some(scope) => projects
                .into_iter()
                .filter(|p| &p.project_id == scope)
                .collect(),
            None => projects,
        })
    }

    /// Run one cycle with the configured filter.
    pub async fn run_cycle(&self) -> Result<AggregateSnapshot> {
        self.run_with(&self.filter).await
    }

    /// Run one cycle with an explicit filter.
    pub async fn run_with(&self, filter: &AlertFilter) -> Result<AggregateSnapshot> {
        filter.validate()?;
        let started_at = Utc::now();
        let projects = self.projects().await.map_err(|e| {
            warn!(error = %e, "Failed to list projects");
            e
        })?;

        if let Some(scope) = &self.scope {
            if projects.is_empty() {
                warn!(project_id = %scope, "Scoped project not listed by the directory");
                return Ok(AggregateSnapshot::build(
                    1,
                    Vec::new(),
                    vec![QueryError::new(
                        scope,
                        QueryErrorKind::NotFound,
                        "project not listed by the directory",
                    )],
                )
                .started(started_at));
            }
        }

        let snapshot = self.aggregator.aggregate(&projects, filter).await?;
        Ok(snapshot.started(started_at))
    }
}
