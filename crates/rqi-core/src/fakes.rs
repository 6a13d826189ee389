//! In-memory fake for the analysis service trait (testing only)
//!
//! `ScriptedAnalysisService` answers status polls from a script and returns
//! a fixed measures result, counting every call so tests can assert on the
//! polling pattern without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::analysis::{AnalysisService, ProjectMeasures, TaskStatus};
use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// ScriptedAnalysisService
// ---------------------------------------------------------------------------

/// Analysis service driven by a status script.
///
/// Status requests pop from the script; once it is exhausted every further
/// request returns `then`. With `hang` set, status requests never resolve.
#[derive(Debug)]
pub struct ScriptedAnalysisService {
    script: Mutex<VecDeque<Result<TaskStatus, AnalysisError>>>,
    then: Result<TaskStatus, AnalysisError>,
    measures: Result<Option<ProjectMeasures>, AnalysisError>,
    hang: bool,
    status_calls: AtomicU32,
    measure_calls: AtomicU32,
}

impl Default for ScriptedAnalysisService {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            then: Ok(TaskStatus::Success),
            measures: Ok(None),
            hang: false,
            status_calls: AtomicU32::new(0),
            measure_calls: AtomicU32::new(0),
        }
    }
}

impl ScriptedAnalysisService {
    /// Completed task with the given measures.
    pub fn succeeding(measures: ProjectMeasures) -> Self {
        Self::default().with_measures(Ok(Some(measures)))
    }

    /// Task that stays `PENDING` forever.
    pub fn always_pending() -> Self {
        Self {
            then: Ok(TaskStatus::Pending),
            ..Self::default()
        }
    }

    /// Every status request hangs until the caller gives up.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Every request fails with `error`.
    pub fn failing(error: AnalysisError) -> Self {
        Self {
            then: Err(error.clone()),
            measures: Err(error),
            ..Self::default()
        }
    }

    pub fn with_script(
        self,
        statuses: impl IntoIterator<Item = Result<TaskStatus, AnalysisError>>,
    ) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(statuses);
        self
    }

    pub fn then(mut self, status: TaskStatus) -> Self {
        self.then = Ok(status);
        self
    }

    pub fn with_measures(mut self, measures: Result<Option<ProjectMeasures>, AnalysisError>) -> Self {
        self.measures = measures;
        self
    }

    /// Number of status requests served (or started, when hanging).
    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn measure_calls(&self) -> u32 {
        self.measure_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysisService {
    async fn task_status(&self, _task_id: &str) -> Result<TaskStatus, AnalysisError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| self.then.clone())
    }

    async fn measures(&self, _project_key: &str) -> Result<Option<ProjectMeasures>, AnalysisError> {
        self.measure_calls.fetch_add(1, Ordering::SeqCst);
        self.measures.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let svc = ScriptedAnalysisService::default()
            .with_script([Ok(TaskStatus::Pending), Err(AnalysisError::Status(503))])
            .then(TaskStatus::Success);

        assert_eq!(svc.task_status("t").await, Ok(TaskStatus::Pending));
        assert_eq!(svc.task_status("t").await, Err(AnalysisError::Status(503)));
        assert_eq!(svc.task_status("t").await, Ok(TaskStatus::Success));
        assert_eq!(svc.task_status("t").await, Ok(TaskStatus::Success));
        assert_eq!(svc.status_calls(), 4);
    }

    #[tokio::test]
    async fn test_measures_counted() {
        let svc = ScriptedAnalysisService::succeeding(ProjectMeasures {
            coverage: Some(90.0),
            bugs: Some(1),
            vulnerabilities: Some(0),
        });
        let m = svc.measures("demo").await.unwrap().unwrap();
        assert_eq!(m.coverage, Some(90.0));
        assert_eq!(svc.measure_calls(), 1);
        assert_eq!(svc.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_service() {
        let svc = ScriptedAnalysisService::failing(AnalysisError::Http("refused".into()));
        assert!(svc.task_status("t").await.is_err());
        assert!(svc.task_status("t").await.is_err());
        assert!(svc.measures("demo").await.is_err());
    }
}
