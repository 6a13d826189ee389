//! Score extraction rules, one per [`PillarKind`].
//!
//! Every rule is a pure function from a parsed artifact to a
//! [`PillarResult`]. A document that does not match the expected shape is
//! never an error: it becomes a skipped pillar with detail `format error`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::artifact::RawDocument;
use crate::error::ArtifactError;
use crate::pillar::{round1, PillarKind, PillarResult, PillarSpec, SkipReason};

/// p95 latency (ms) at or below which the latency pillar scores 100.
pub const LATENCY_TARGET_MS: f64 = 200.0;

/// Points lost per reported vulnerability.
pub const POINTS_PER_VULNERABILITY: f64 = 10.0;

// ---------------------------------------------------------------------------
// Artifact shapes
// ---------------------------------------------------------------------------

/// Documents that carry their own score (smoke test, accuracy prober).
#[derive(Debug, Deserialize)]
struct SelfScored {
    score: f64,
    #[serde(default)]
    detail: Option<String>,
}

/// Vulnerability scanner report: `Results[].Vulnerabilities[]`.
#[derive(Debug, Deserialize)]
struct ScanReport {
    #[serde(rename = "Results", default)]
    results: Option<Vec<ScanTarget>>,
}

#[derive(Debug, Deserialize)]
struct ScanTarget {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Option<Vec<Value>>,
}

/// Load generator end-of-test summary: `metrics.<name>.values.<stat>`.
#[derive(Debug, Deserialize)]
struct LoadSummary {
    metrics: LoadMetrics,
}

#[derive(Debug, Deserialize)]
struct LoadMetrics {
    #[serde(default)]
    http_req_duration: Option<MetricValues>,
    #[serde(default)]
    http_req_failed: Option<MetricValues>,
}

#[derive(Debug, Deserialize)]
struct MetricValues {
    values: HashMap<String, Value>,
}

impl MetricValues {
    fn get(&self, stat: &str) -> Option<f64> {
        self.values.get(stat).and_then(Value::as_f64)
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Score a parsed artifact according to the pillar's kind.
pub fn extract(spec: &PillarSpec, doc: &RawDocument) -> PillarResult {
    if !doc.body.is_object() {
        return format_error(spec, doc, "document is not a JSON object");
    }

    match spec.kind {
        PillarKind::Entry => match decode::<SelfScored>(&doc.body) {
            Ok(s) => {
                let detail = s.detail.unwrap_or_else(|| "App Up".to_string());
                PillarResult::scored(spec, s.score, detail)
            }
            Err(e) => format_error(spec, doc, &e),
        },
        PillarKind::Functionality => match decode::<SelfScored>(&doc.body) {
            Ok(s) => {
                let score = s.score.clamp(0.0, 100.0);
                PillarResult::scored(spec, s.score, format!("Acc: {}%", score))
            }
            Err(e) => format_error(spec, doc, &e),
        },
        PillarKind::Security => match decode::<ScanReport>(&doc.body) {
            Ok(report) => {
                let count = vulnerability_count(&report);
                PillarResult::scored(spec, security_score(count), format!("{} issues", count))
            }
            Err(e) => format_error(spec, doc, &e),
        },
        PillarKind::Latency => {
            let p95 = decode::<LoadSummary>(&doc.body)
                .ok()
                .and_then(|s| s.metrics.http_req_duration)
                .and_then(|m| m.get("p(95)"));
            match p95 {
                Some(p95) if p95.is_finite() && p95 >= 0.0 => PillarResult::scored(
                    spec,
                    latency_score(p95),
                    format!("{}ms (p95)", (p95 * 100.0).round() / 100.0),
                ),
                _ => format_error(spec, doc, "missing metrics.http_req_duration.values.p(95)"),
            }
        }
        PillarKind::Load | PillarKind::FaultInjection => {
            let rate = decode::<LoadSummary>(&doc.body)
                .ok()
                .and_then(|s| s.metrics.http_req_failed)
                .and_then(|m| m.get("rate"));
            match rate {
                Some(rate) if (0.0..=1.0).contains(&rate) => {
                    let (score, detail) = stability_score(rate);
                    PillarResult::scored(spec, score, detail)
                }
                _ => format_error(spec, doc, "missing or invalid metrics.http_req_failed.values.rate"),
            }
        }
        PillarKind::UnitTests | PillarKind::CodeQuality => {
            format_error(spec, doc, "pillar is not scored from a results artifact")
        }
    }
}

/// Unit-test pillar: the coverage report's existence is the signal.
pub fn unit_tests(spec: &PillarSpec, report_present: bool) -> PillarResult {
    if report_present {
        PillarResult::scored(spec, 100.0, "coverage report present")
    } else {
        PillarResult::skipped(spec, SkipReason::MissingCoverageReport, "missing coverage report")
    }
}

/// Pillar whose artifact could not be used.
pub fn unavailable(spec: &PillarSpec, err: &ArtifactError) -> PillarResult {
    match err {
        ArtifactError::NotFound { .. } => {
            PillarResult::skipped(spec, SkipReason::NotFound, "no artifact")
        }
        ArtifactError::Malformed { .. } => {
            PillarResult::skipped(spec, SkipReason::Malformed, "format error")
        }
    }
}

/// `100` at or below the target, then one point lost per 2ms, floored at 0.
pub fn latency_score(p95_ms: f64) -> f64 {
    if p95_ms <= LATENCY_TARGET_MS {
        100.0
    } else {
        round1((100.0 - (p95_ms - LATENCY_TARGET_MS) / 2.0).max(0.0))
    }
}

/// Score for a request failure rate in `[0, 1]`.
///
/// A rate of exactly 1.0 means nothing got through; it scores 0 but keeps a
/// distinct detail so an unreachable target is not mistaken for a bad report.
pub fn stability_score(failure_rate: f64) -> (f64, String) {
    if failure_rate >= 1.0 {
        return (0.0, "connection refused".to_string());
    }
    let score = ((1.0 - failure_rate) * 100.0).round();
    (score, format!("Success Rate: {}%", score))
}

/// `max(0, 100 - 10 * count)`.
pub fn security_score(vulnerabilities: usize) -> f64 {
    (100.0 - POINTS_PER_VULNERABILITY * vulnerabilities as f64).max(0.0)
}

fn vulnerability_count(report: &ScanReport) -> usize {
    report
        .results
        .iter()
        .flatten()
        .map(|t| t.vulnerabilities.as_ref().map_or(0, Vec::len))
        .sum()
}

fn decode<T: DeserializeOwned>(body: &Value) -> Result<T, String> {
    T::deserialize(body).map_err(|e| e.to_string())
}

fn format_error(spec: &PillarSpec, doc: &RawDocument, reason: &str) -> PillarResult {
    warn!(
        pillar = %spec.name,
        path = %doc.path.display(),
        reason,
        "Artifact has unexpected shape, skipping pillar"
    );
    PillarResult::format_error(spec)
}
