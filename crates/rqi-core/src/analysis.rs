//! External static-analysis service client and poller.
//!
//! The analysis backend processes scans asynchronously, so by the time the
//! gate runs the submitted task may still be queued. The poller waits for it
//! with a bounded, cancellable state machine and then reads the project's
//! summary measures. Every failure mode degrades to a placeholder score;
//! nothing here returns an error to the caller.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::error::AnalysisError;
use crate::pillar::{round1, PillarResult, PillarSpec};

/// Score used while the service has a scan but no usable coverage yet.
pub const PENDING_SCORE: f64 = 40.0;

/// Score used when the service cannot be reached or answers garbage.
pub const OFFLINE_SCORE: f64 = 20.0;

/// Points lost per open bug.
pub const POINTS_PER_BUG: f64 = 2.0;

/// Upper bound on the whole polling phase, whatever the configured cadence.
pub const MAX_POLL_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

/// Analysis service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Service base URL, without trailing slash.
    pub base_url: String,
    /// Bearer credential (optional for public projects).
    pub token: Option<String>,
    /// Wait between task-status polls.
    pub poll_interval: Duration,
    /// Maximum task-status requests.
    pub max_attempts: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sonarcloud.io".to_string(),
            token: None,
            poll_interval: Duration::from_secs(5),
            max_attempts: 12,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl AnalysisConfig {
    /// Create config for a specific server.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Set authentication token.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Override polling cadence.
    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Wall-clock budget for the whole polling phase, capped at
    /// [`MAX_POLL_BUDGET`].
    pub fn poll_budget(&self) -> Duration {
        poll_budget(self.poll_interval, self.max_attempts)
    }
}

fn poll_budget(interval: Duration, max_attempts: u32) -> Duration {
    interval
        .checked_mul(max_attempts)
        .map_or(MAX_POLL_BUDGET, |b| b.min(MAX_POLL_BUDGET))
}

// ---------------------------------------------------------------------------
// Service model
// ---------------------------------------------------------------------------

/// Status of a background analysis task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Canceled,
    Unknown(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" => TaskStatus::Pending,
            "IN_PROGRESS" => TaskStatus::InProgress,
            "SUCCESS" => TaskStatus::Success,
            "FAILED" => TaskStatus::Failed,
            "CANCELED" => TaskStatus::Canceled,
            other => TaskStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

/// Summary measures for a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeasures {
    pub coverage: Option<f64>,
    pub bugs: Option<u64>,
    pub vulnerabilities: Option<u64>,
}

/// One in-flight analysis job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTaskHandle {
    pub task_id: String,
    pub project_key: String,
}

/// Read the task handle left behind by the scan submission step.
///
/// The report is a `key=value` file; `ceTaskId` names the task and
/// `projectKey`, when present, names the project that was actually scanned.
/// Returns `None` when the file is absent or has no task id.
pub async fn read_task_handle(report_path: &Path, default_project_key: &str) -> Option<AnalysisTaskHandle> {
    let content = match tokio::fs::read_to_string(report_path).await {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %report_path.display(), error = %e, "No scanner report");
            return None;
        }
    };

    let mut task_id = None;
    let mut project_key = None;
    for line in content.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            match key.trim() {
                "ceTaskId" if !value.is_empty() => task_id = Some(value.to_string()),
                "projectKey" if !value.is_empty() => project_key = Some(value.to_string()),
                _ => {}
            }
        }
    }

    task_id.map(|task_id| AnalysisTaskHandle {
        task_id,
        project_key: project_key.unwrap_or_else(|| default_project_key.to_string()),
    })
}

/// The two endpoints the gate needs from the analysis backend.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Status of a background task.
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, AnalysisError>;

    /// Summary measures; `Ok(None)` when the service has no measures yet.
    async fn measures(&self, project_key: &str) -> Result<Option<ProjectMeasures>, AnalysisError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    task: TaskBody,
}

#[derive(Debug, Deserialize)]
struct TaskBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MeasuresEnvelope {
    #[serde(default)]
    component: Option<ComponentMeasures>,
}

#[derive(Debug, Deserialize)]
struct ComponentMeasures {
    #[serde(default)]
    measures: Option<Vec<Measure>>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    metric: String,
    #[serde(default)]
    value: Option<String>,
}

/// Analysis service reached over HTTP.
pub struct HttpAnalysisService {
    config: AnalysisConfig,
    http_client: reqwest::Client,
}

impl HttpAnalysisService {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("rqi/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, AnalysisError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self.http_client.get(&url).query(query);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AnalysisError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AnalysisError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, AnalysisError> {
        let body = self.get_json("/api/ce/task", &[("id", task_id)]).await?;
        let envelope: TaskEnvelope =
            serde_json::from_value(body).map_err(|e| AnalysisError::Decode(e.to_string()))?;
        Ok(TaskStatus::parse(&envelope.task.status))
    }

    async fn measures(&self, project_key: &str) -> Result<Option<ProjectMeasures>, AnalysisError> {
        let body = self
            .get_json(
                "/api/measures/component",
                &[
                    ("component", project_key),
                    ("metricKeys", "coverage,bugs,vulnerabilities"),
                ],
            )
            .await?;
        parse_measures(body)
    }
}

fn parse_measures(body: Value) -> Result<Option<ProjectMeasures>, AnalysisError> {
    let envelope: MeasuresEnvelope =
        serde_json::from_value(body).map_err(|e| AnalysisError::Decode(e.to_string()))?;

    let Some(measures) = envelope.component.and_then(|c| c.measures) else {
        return Ok(None);
    };

    let mut out = ProjectMeasures::default();
    for m in measures {
        let Some(value) = m.value else { continue };
        let bad = || AnalysisError::Decode(format!("measure {} has value {:?}", m.metric, value));
        match m.metric.as_str() {
            "coverage" => out.coverage = Some(value.parse().map_err(|_| bad())?),
            "bugs" => out.bugs = Some(value.parse().map_err(|_| bad())?),
            "vulnerabilities" => out.vulnerabilities = Some(value.parse().map_err(|_| bad())?),
            _ => {}
        }
    }
    Ok(Some(out))
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Polling state machine: `Pending → Succeeded | Failed | TimedOut | Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Waiting; `attempt` status requests made so far.
    Pending { attempt: u32 },
    /// The task finished successfully.
    Succeeded,
    /// The task reached a non-success terminal status.
    Failed(TaskStatus),
    /// Attempts or wall-clock budget exhausted.
    TimedOut,
    /// The run was cancelled.
    Cancelled,
}

impl PollState {
    pub fn is_pending(&self) -> bool {
        matches!(self, PollState::Pending { .. })
    }
}

/// Transition after one status request.
pub fn next_state(
    attempt: u32,
    status: Result<TaskStatus, AnalysisError>,
    max_attempts: u32,
) -> PollState {
    let attempt = attempt + 1;
    match status {
        Ok(TaskStatus::Success) => PollState::Succeeded,
        Ok(s) if s.is_terminal() => PollState::Failed(s),
        Ok(s) => {
            debug!(attempt, status = ?s, "Analysis task still running");
            if attempt >= max_attempts {
                PollState::TimedOut
            } else {
                PollState::Pending { attempt }
            }
        }
        Err(e) => {
            debug!(attempt, error = %e, "Task status request failed");
            if attempt >= max_attempts {
                PollState::TimedOut
            } else {
                PollState::Pending { attempt }
            }
        }
    }
}

/// Final state of a polling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub state: PollState,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Drives an [`AnalysisService`] to a Code Quality pillar result.
pub struct AnalysisPoller {
    service: Arc<dyn AnalysisService>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl AnalysisPoller {
    pub fn new(service: Arc<dyn AnalysisService>, config: &AnalysisConfig) -> Self {
        Self {
            service,
            poll_interval: config.poll_interval,
            max_attempts: config.max_attempts,
        }
    }

    fn budget(&self) -> Duration {
        poll_budget(self.poll_interval, self.max_attempts)
    }

    /// Poll `handle` until a terminal status, exhaustion, the wall-clock
    /// budget (`interval × max_attempts`) or cancellation.
    pub async fn poll(&self, handle: &AnalysisTaskHandle, cancel: &mut CancelSignal) -> PollOutcome {
        let start = Instant::now();
        let deadline = start + self.budget();
        let mut state = if self.max_attempts == 0 {
            PollState::TimedOut
        } else {
            PollState::Pending { attempt: 0 }
        };

        info!(task_id = %handle.task_id, max_attempts = self.max_attempts, "Waiting for analysis task");

        let mut attempts = 0;
        while let PollState::Pending { attempt } = state {
            let status = tokio::select! {
                _ = cancel.cancelled() => {
                    state = PollState::Cancelled;
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    state = PollState::TimedOut;
                    break;
                }
                status = self.service.task_status(&handle.task_id) => status,
            };

            attempts = attempt + 1;
            state = next_state(attempt, status, self.max_attempts);
            if !state.is_pending() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => state = PollState::Cancelled,
                _ = tokio::time::sleep_until(deadline) => state = PollState::TimedOut,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        PollOutcome {
            state,
            attempts,
            elapsed: start.elapsed(),
        }
    }

    /// Produce the Code Quality pillar result.
    ///
    /// With a handle the task is polled first; measures are then fetched for
    /// the handle's project (or `project_key` without a handle).
    pub async fn evaluate(
        &self,
        spec: &PillarSpec,
        project_key: &str,
        handle: Option<&AnalysisTaskHandle>,
        cancel: &mut CancelSignal,
    ) -> PillarResult {
        let project_key = match handle {
            Some(handle) => {
                let outcome = self.poll(handle, cancel).await;
                match &outcome.state {
                    PollState::Succeeded => {
                        info!(task_id = %handle.task_id, "Analysis task complete")
                    }
                    PollState::Failed(status) => {
                        warn!(task_id = %handle.task_id, status = ?status, "Analysis task did not succeed, using last published measures")
                    }
                    PollState::Cancelled => {
                        warn!(task_id = %handle.task_id, "Analysis polling cancelled");
                        return PillarResult::scored(spec, OFFLINE_SCORE, "analysis cancelled");
                    }
                    PollState::TimedOut | PollState::Pending { .. } => {
                        warn!(
                            task_id = %handle.task_id,
                            elapsed_ms = outcome.elapsed.as_millis() as u64,
                            "Analysis task still pending, using last published measures"
                        )
                    }
                }
                handle.project_key.as_str()
            }
            None => {
                debug!("No pending analysis task, reading current measures");
                project_key
            }
        };

        let measures = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Measures request cancelled");
                return PillarResult::scored(spec, OFFLINE_SCORE, "analysis cancelled");
            }
            measures = self.service.measures(project_key) => measures,
        };

        score_measures(spec, measures)
    }
}

/// Placeholder policy for the Code Quality pillar.
///
/// | input                                   | score |
/// |-----------------------------------------|-------|
/// | coverage > 0                            | `max(0, coverage - 2 * bugs)` |
/// | coverage 0 or missing                   | [`PENDING_SCORE`] |
/// | no measures published yet               | [`PENDING_SCORE`] |
/// | transport error, non-200, bad body      | [`OFFLINE_SCORE`] |
///
/// Placeholders are never skipped.
pub fn score_measures(
    spec: &PillarSpec,
    measures: Result<Option<ProjectMeasures>, AnalysisError>,
) -> PillarResult {
    match measures {
        Ok(Some(m)) => {
            let bugs = m.bugs.unwrap_or(0);
            let vulns = m.vulnerabilities.unwrap_or(0);
            match m.coverage {
                Some(coverage) if coverage > 0.0 => {
                    let score = round1((coverage - POINTS_PER_BUG * bugs as f64).max(0.0));
                    PillarResult::scored(
                        spec,
                        score,
                        format!("{}% (bugs: {}, vulnerabilities: {})", coverage, bugs, vulns),
                    )
                }
                _ => PillarResult::scored(
                    spec,
                    PENDING_SCORE,
                    format!("scan OK, coverage pending (bugs: {})", bugs),
                ),
            }
        }
        Ok(None) => PillarResult::scored(spec, PENDING_SCORE, "waiting for analysis measures"),
        Err(AnalysisError::Status(code)) => {
            warn!(status = code, "Analysis service rejected measures request");
            PillarResult::scored(spec, OFFLINE_SCORE, format!("analysis pending ({})", code))
        }
        Err(e) => {
            warn!(error = %e, "Analysis service unavailable");
            PillarResult::scored(spec, OFFLINE_SCORE, "analysis service offline")
        }
    }
}
