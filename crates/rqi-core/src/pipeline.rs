//! Evaluation run orchestration.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::aggregate;
use crate::analysis::{read_task_handle, AnalysisPoller, AnalysisService, HttpAnalysisService};
use crate::artifact::{self, ArtifactReader};
use crate::cancel::CancelSignal;
use crate::config::GateConfig;
use crate::error::{AnalysisError, ArtifactError};
use crate::extract;
use crate::gate::{GatePolicy, ReleaseGate};
use crate::pillar::{PillarCatalog, PillarKind, PillarResult, PillarSpec};
use crate::report::EvaluationReport;

/// Per-invocation inputs that are not project configuration.
#[derive(Debug, Clone, Default)]
pub struct EvaluationInput {
    /// Version of the build being gated.
    pub version: String,
    /// Operator justification that forces promotion.
    pub override_reason: Option<String>,
}

impl EvaluationInput {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            override_reason: None,
        }
    }

    pub fn with_override(mut self, reason: impl Into<String>) -> Self {
        self.override_reason = Some(reason.into());
        self
    }
}

/// Runs one gate evaluation.
pub struct Evaluator {
    reader: ArtifactReader,
    coverage_path: PathBuf,
    scanner_report_path: PathBuf,
    project_key: String,
    poller: AnalysisPoller,
    policy: GatePolicy,
}

impl Evaluator {
    pub fn new(config: &GateConfig, service: Arc<dyn AnalysisService>) -> Self {
        Self {
            reader: ArtifactReader::new(&config.results_dir).with_fallback(&config.fallback_dir),
            coverage_path: config.coverage_path.clone(),
            scanner_report_path: config.scanner_report_path.clone(),
            project_key: config.project_key.clone(),
            poller: AnalysisPoller::new(service, &config.analysis),
            policy: GatePolicy {
                threshold: config.threshold,
            },
        }
    }

    /// Evaluator talking to the configured HTTP analysis service.
    pub fn from_config(config: &GateConfig) -> Result<Self, AnalysisError> {
        let service = HttpAnalysisService::new(config.analysis.clone())?;
        Ok(Self::new(config, Arc::new(service)))
    }

    /// Score every catalog pillar, aggregate and decide.
    ///
    /// Artifact pillars are read concurrently while the analysis poller runs.
    /// Nothing in here fails: unusable sources become skipped or placeholder
    /// pillars.
    #[instrument(skip_all, fields(version = %input.version))]
    pub async fn evaluate(
        &self,
        catalog: &PillarCatalog,
        input: &EvaluationInput,
        mut cancel: CancelSignal,
    ) -> EvaluationReport {
        info!(pillars = catalog.len(), "Starting gate evaluation");

        let local = join_all(
            catalog
                .iter()
                .filter(|s| s.kind != PillarKind::CodeQuality)
                .map(|s| self.score_local(s)),
        );
        let remote = async {
            match catalog.iter().find(|s| s.kind == PillarKind::CodeQuality) {
                Some(spec) => Some(self.score_remote(spec, &mut cancel).await),
                None => None,
            }
        };
        let (local, remote) = tokio::join!(local, remote);

        let mut local = local.into_iter();
        let mut pillars = Vec::with_capacity(catalog.len());
        for spec in catalog.iter() {
            let result = if spec.kind == PillarKind::CodeQuality {
                match &remote {
                    Some(r) => PillarResult {
                        name: spec.name.clone(),
                        ..r.clone()
                    },
                    None => continue,
                }
            } else {
                match local.next() {
                    Some(r) => r,
                    None => continue,
                }
            };
            info!(
                pillar = %result.name,
                score = result.score,
                skipped = result.skipped,
                detail = %result.detail,
                "Pillar scored"
            );
            pillars.push(result);
        }

        let indices = aggregate(&pillars);
        let decision =
            ReleaseGate::decide(&self.policy, indices.rqi, input.override_reason.as_deref());

        info!(
            cqi = indices.cqi,
            rqi = indices.rqi,
            active = indices.active,
            skipped = indices.skipped,
            verdict = %decision.verdict,
            message = %decision.message,
            "Gate evaluation complete"
        );

        EvaluationReport::new(
            input.version.clone(),
            pillars,
            indices,
            self.policy.threshold,
            decision,
        )
    }

    async fn score_local(&self, spec: &PillarSpec) -> PillarResult {
        if spec.kind == PillarKind::UnitTests {
            let present = artifact::exists(&self.coverage_path).await;
            if !present {
                debug!(path = %self.coverage_path.display(), "Coverage report missing");
            }
            return extract::unit_tests(spec, present);
        }

        match self.reader.read(&spec.source_key).await {
            Ok(doc) => extract::extract(spec, &doc),
            Err(e) => {
                if let ArtifactError::Malformed { .. } = e {
                    warn!(pillar = %spec.name, reason = e.kind(), error = %e, "Skipping pillar");
                } else {
                    debug!(pillar = %spec.name, reason = e.kind(), error = %e, "Skipping pillar");
                }
                extract::unavailable(spec, &e)
            }
        }
    }

    async fn score_remote(&self, spec: &PillarSpec, cancel: &mut CancelSignal) -> PillarResult {
        let handle = read_task_handle(&self.scanner_report_path, &self.project_key).await;
        self.poller
            .evaluate(spec, &self.project_key, handle.as_ref(), cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ProjectMeasures, TaskStatus, OFFLINE_SCORE, PENDING_SCORE};
    use crate::cancel::cancel_pair;
    use crate::fakes::ScriptedAnalysisService;
    use crate::gate::Verdict;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> GateConfig {
        let mut config = GateConfig::defaults_for("weather-app");
        config.results_dir = dir.join("tests");
        config.fallback_dir = dir.to_path_buf();
        config.coverage_path = dir.join("coverage/lcov.info");
        config.scanner_report_path = dir.join(".scannerwork/report-task.txt");
        config.analysis = config
            .analysis
            .with_polling(Duration::from_secs(5), 12);
        config
    }

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn measures(coverage: f64, bugs: u64) -> ProjectMeasures {
        ProjectMeasures {
            coverage: Some(coverage),
            bugs: Some(bugs),
            vulnerabilities: Some(0),
        }
    }

    #[tokio::test]
    async fn test_empty_workspace_only_code_quality_active() {
        let dir = tempdir().unwrap();
        let service = Arc::new(ScriptedAnalysisService::default());
        let evaluator = Evaluator::new(&config_in(dir.path()), service.clone());

        let report = evaluator
            .evaluate(
                &PillarCatalog::standard(),
                &EvaluationInput::new("1.0.0"),
                CancelSignal::never(),
            )
            .await;

        assert_eq!(report.pillars.len(), 8);
        assert_eq!(report.skipped_count(), 7);
        assert_eq!(report.rqi(), PENDING_SCORE);
        assert_eq!(report.verdict, Verdict::Fail);
        // no scanner report: measures read directly, no polling
        assert_eq!(service.status_calls(), 0);
        assert_eq!(service.measure_calls(), 1);
    }

    #[tokio::test]
    async fn test_results_in_catalog_order() {
        let dir = tempdir().unwrap();
        write(dir.path(), "tests/entry_results.json", r#"{"score": 100}"#);
        write(dir.path(), "coverage/lcov.info", "TN:\n");
        write(dir.path(), "tests/accuracy_results.json", r#"{"score": 92}"#);
        write(dir.path(), "security_results.json", r#"{"Results": []}"#);

        let service = Arc::new(ScriptedAnalysisService::succeeding(measures(88.0, 1)));
        let evaluator = Evaluator::new(&config_in(dir.path()), service);
        let catalog = PillarCatalog::standard();

        let report = evaluator
            .evaluate(&catalog, &EvaluationInput::new("2.1.0"), CancelSignal::never())
            .await;

        let names: Vec<&str> = report.pillars.iter().map(|p| p.name.as_str()).collect();
        let expected: Vec<&str> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, expected);

        assert_eq!(report.pillar("Code Quality").map(|p| p.score), Some(86.0));
        assert_eq!(report.pillar("Security Scan").map(|p| p.score), Some(100.0));
        assert_eq!(report.skipped_count(), 3);
        // (100 + 100 + 86 + 92 + 100) / 5
        assert_eq!(report.rqi(), 95.6);
        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(report.version, "2.1.0");
    }

    #[tokio::test]
    async fn test_override_recorded() {
        let dir = tempdir().unwrap();
        let service = Arc::new(ScriptedAnalysisService::failing(AnalysisError::Status(502)));
        let evaluator = Evaluator::new(&config_in(dir.path()), service);

        let input = EvaluationInput::new("3.0.0").with_override("customer demo");
        let report = evaluator
            .evaluate(&PillarCatalog::standard(), &input, CancelSignal::never())
            .await;

        assert_eq!(report.rqi(), OFFLINE_SCORE);
        assert_eq!(report.verdict, Verdict::Overridden);
        assert_eq!(report.override_reason.as_deref(), Some("customer demo"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_pending_task_before_measures() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            ".scannerwork/report-task.txt",
            "projectKey=weather-app\nceTaskId=AX-1\n",
        );
        let service = Arc::new(
            ScriptedAnalysisService::succeeding(measures(70.0, 0))
                .with_script([Ok(TaskStatus::Pending), Ok(TaskStatus::InProgress)]),
        );
        let evaluator = Evaluator::new(&config_in(dir.path()), service.clone());

        let report = evaluator
            .evaluate(
                &PillarCatalog::standard(),
                &EvaluationInput::new("1.0.1"),
                CancelSignal::never(),
            )
            .await;

        assert_eq!(service.status_calls(), 3);
        assert_eq!(report.pillar("Code Quality").map(|p| p.score), Some(70.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_degrades_code_quality() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            ".scannerwork/report-task.txt",
            "ceTaskId=AX-2\n",
        );
        let service = Arc::new(ScriptedAnalysisService::hanging());
        let evaluator = Evaluator::new(&config_in(dir.path()), service);
        let (handle, signal) = cancel_pair();

        let catalog = PillarCatalog::standard();
        let input = EvaluationInput::new("1.0.2");
        let run = evaluator.evaluate(&catalog, &input, signal);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (report, _) = tokio::join!(run, cancel);

        let cq = report.pillar("Code Quality").unwrap();
        assert_eq!(cq.score, OFFLINE_SCORE);
        assert!(!cq.skipped);
        assert_eq!(report.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_catalog_without_code_quality_skips_service() {
        let dir = tempdir().unwrap();
        write(dir.path(), "tests/entry_results.json", r#"{"score": 90, "detail": "Up"}"#);
        let service = Arc::new(ScriptedAnalysisService::default());
        let evaluator = Evaluator::new(&config_in(dir.path()), service.clone());
        let catalog = PillarCatalog::new(vec![PillarSpec::new(
            "Entry Check",
            "entry",
            PillarKind::Entry,
        )]);

        let report = evaluator
            .evaluate(&catalog, &EvaluationInput::new("0.1.0"), CancelSignal::never())
            .await;

        assert_eq!(report.rqi(), 90.0);
        assert_eq!(service.measure_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_poll_interval_from_env_evaluates() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            ".scannerwork/report-task.txt",
            "projectKey=weather-app\nceTaskId=AY-env\n",
        );
        let huge = u64::MAX.to_string();
        let loaded = GateConfig::load_with(
            &dir.path().join("missing.json"),
            |key| (key == "RQI_POLL_INTERVAL_SECS").then(|| huge.clone()),
            Some("weather-app"),
        );
        assert_eq!(loaded.analysis.poll_interval, Duration::from_secs(5));

        let mut config = config_in(dir.path());
        config.analysis = loaded.analysis;
        let service = Arc::new(ScriptedAnalysisService::succeeding(measures(90.0, 1)));
        let report = Evaluator::new(&config, service.clone())
            .evaluate(
                &PillarCatalog::standard(),
                &EvaluationInput::new("1.0.0"),
                CancelSignal::never(),
            )
            .await;

        assert_eq!(report.pillar("Code Quality").unwrap().score, 88.0);
        assert_eq!(service.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_interval_still_finishes() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            ".scannerwork/report-task.txt",
            "projectKey=weather-app\nceTaskId=AY-slow\n",
        );
        let mut config = config_in(dir.path());
        config.analysis = config
            .analysis
            .with_polling(Duration::from_secs(u64::MAX), 12);
        let service = Arc::new(ScriptedAnalysisService::always_pending());

        let report = Evaluator::new(&config, service.clone())
            .evaluate(
                &PillarCatalog::standard(),
                &EvaluationInput::new("1.0.0"),
                CancelSignal::never(),
            )
            .await;

        assert_eq!(report.pillar("Code Quality").unwrap().score, PENDING_SCORE);
        assert_eq!(service.status_calls(), 1);
    }
}
