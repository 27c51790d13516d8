//! In-memory project directory and alert source for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use driftwatch::{
    AckOutcome, Alert, AlertFilter, AlertSource, AlertStatus, AlertType, DirectoryError, Project,
    ProjectDirectory, QueryError, QueryErrorKind, Severity,
};

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn project(id: &str) -> Project {
    Project {
        project_id: id.to_string(),
        name: format!("Project {id}"),
        created_at: ts("2024-01-01T00:00:00Z"),
    }
}

pub fn alert(project_id: &str, alert_id: &str, severity: Severity, created_at: &str) -> Alert {
    Alert {
        alert_id: alert_id.to_string(),
        project_id: project_id.to_string(),
        baseline_version: 1,
        created_at: ts(created_at),
        severity,
        alert_type: AlertType::FeatureDrift,
        feature_name: Some("age".to_string()),
        metric_value: Some(0.25),
        message: format!("{alert_id} drifted"),
        status: AlertStatus::Open,
    }
}

/// How a fake project answers.
#[derive(Clone)]
pub enum Behavior {
    Alerts(Vec<Alert>),
    Delayed(Duration, Vec<Alert>),
    Fail(QueryErrorKind),
    Hang,
    /// Waits for one permit per call before answering.
    Gated(Arc<Semaphore>, Vec<Alert>),
}

/// Alert source answering from a fixed table and applying filters locally.
#[derive(Default)]
pub struct FakeSource {
    projects: HashMap<String, Behavior>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    acked: Mutex<Vec<(String, String)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, project_id: &str, behavior: Behavior) -> Self {
        self.projects.insert(project_id.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> Vec<(String, String)> {
        self.acked.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertSource for FakeSource {
    async fn list_alerts(
        &self,
        project_id: &str,
        filter: &AlertFilter,
    ) -> Result<Vec<Alert>, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behavior = self
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| QueryError::new(project_id, QueryErrorKind::NotFound, "no such project"))?;

        let alerts = match behavior {
            Behavior::Alerts(alerts) => {
                tokio::task::yield_now().await;
                alerts
            }
            Behavior::Delayed(delay, alerts) => {
                tokio::time::sleep(delay).await;
                alerts
            }
            Behavior::Fail(kind) => return Err(QueryError::new(project_id, kind, "injected")),
            Behavior::Hang => std::future::pending().await,
            Behavior::Gated(gate, alerts) => {
                gate.acquire().await.unwrap().forget();
                alerts
            }
        };

        Ok(alerts.into_iter().filter(|a| filter.matches(a)).collect())
    }

    async fn acknowledge(&self, project_id: &str, alert_id: &str) -> Result<AckOutcome, QueryError> {
        self.acked
            .lock()
            .unwrap()
            .push((project_id.to_string(), alert_id.to_string()));
        Ok(AckOutcome::Acknowledged)
    }
}

/// Directory returning a fixed project list, optionally gated so a test can
/// hold a refresh cycle in flight.
pub struct FakeDirectory {
    projects: Mutex<Result<Vec<Project>, DirectoryError>>,
    gate: Option<Arc<Semaphore>>,
    entered: Arc<tokio::sync::Notify>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new(projects: Vec<Project>) -> Self {
        Self {
            projects: Mutex::new(Ok(projects)),
            gate: None,
            entered: Arc::new(tokio::sync::Notify::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: DirectoryError) -> Self {
        let directory = Self::new(Vec::new());
        directory.set(Err(error));
        directory
    }

    /// Every call waits for one permit from the returned semaphore.
    pub fn gated(projects: Vec<Project>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut directory = Self::new(projects);
        directory.gate = Some(Arc::clone(&gate));
        (directory, gate)
    }

    pub fn set(&self, result: Result<Vec<Project>, DirectoryError>) {
        *self.projects.lock().unwrap() = result;
    }

    pub fn entered(&self) -> Arc<tokio::sync::Notify> {
        Arc::clone(&self.entered)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectDirectory for FakeDirectory {
    async fn list_projects(&self) -> Result<Vec<Project>, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.projects.lock().unwrap().clone()
    }
}
