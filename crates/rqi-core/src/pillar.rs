//! Pillar catalog and per-pillar results.

use serde::{Deserialize, Serialize};

/// Extraction rule a pillar is scored with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PillarKind {
    /// Smoke test that scores itself.
    Entry,

    /// Presence of a unit-test coverage report.
    UnitTests,

    /// External static-analysis service.
    CodeQuality,

    /// Functional accuracy prober.
    Functionality,

    /// Vulnerability scanner.
    Security,

    /// Latency benchmark (p95).
    Latency,

    /// Load test failure rate.
    Load,

    /// Fault-injection test failure rate.
    FaultInjection,
}

impl PillarKind {
    /// Whether this pillar counts towards the in-progress index (CQI).
    pub fn is_development(&self) -> bool {
        matches!(
            self,
            PillarKind::Entry
                | PillarKind::UnitTests
                | PillarKind::CodeQuality
                | PillarKind::Functionality
                | PillarKind::Security
        )
    }

    /// Whether the pillar is scored from a `<key>_results.json` artifact.
    pub fn reads_artifact(&self) -> bool {
        !matches!(self, PillarKind::UnitTests | PillarKind::CodeQuality)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PillarKind::Entry => "entry",
            PillarKind::UnitTests => "unit_tests",
            PillarKind::CodeQuality => "code_quality",
            PillarKind::Functionality => "functionality",
            PillarKind::Security => "security",
            PillarKind::Latency => "latency",
            PillarKind::Load => "load",
            PillarKind::FaultInjection => "fault_injection",
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PillarSpec {
    /// Display name.
    pub name: String,

    /// Artifact key (`<source_key>_results.json`).
    pub source_key: String,

    /// Extraction rule.
    pub kind: PillarKind,
}

impl PillarSpec {
    pub fn new(name: impl Into<String>, source_key: impl Into<String>, kind: PillarKind) -> Self {
        Self {
            name: name.into(),
            source_key: source_key.into(),
            kind,
        }
    }
}

/// Ordered, fixed list of pillars. Order only affects presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PillarCatalog {
    pillars: Vec<PillarSpec>,
}

impl PillarCatalog {
    pub fn new(pillars: Vec<PillarSpec>) -> Self {
        Self { pillars }
    }

    /// The eight standard release pillars.
    pub fn standard() -> Self {
        Self::new(vec![
            PillarSpec::new("Entry Check", "entry", PillarKind::Entry),
            PillarSpec::new("Unit Testing", "unit", PillarKind::UnitTests),
            PillarSpec::new("Code Quality", "sonar", PillarKind::CodeQuality),
            PillarSpec::new("Functionality", "accuracy", PillarKind::Functionality),
            PillarSpec::new("Security Scan", "security", PillarKind::Security),
            PillarSpec::new("Performance", "perf", PillarKind::Latency),
            PillarSpec::new("Load Stability", "load", PillarKind::Load),
            PillarSpec::new("Chaos Resilience", "chaos", PillarKind::FaultInjection),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PillarSpec> {
        self.pillars.iter()
    }

    pub fn len(&self) -> usize {
        self.pillars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pillars.is_empty()
    }
}

impl Default for PillarCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Why a pillar carries no signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Artifact missing at every searched location.
    NotFound,

    /// Artifact present but unreadable or not JSON.
    Malformed,

    /// JSON parsed but a required field is missing or has the wrong shape.
    FormatError,

    /// No unit-test coverage report.
    MissingCoverageReport,
}

/// Normalized outcome of one pillar.
///
/// # Invariants
///
/// `0.0 <= score <= 100.0`. A skipped result always has score 0 and is
/// excluded from every index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PillarResult {
    pub name: String,
    pub kind: PillarKind,
    pub score: f64,
    pub detail: String,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl PillarResult {
    /// A result that contributes to the indices.
    ///
    /// Scores outside `[0, 100]` are clamped; a non-finite score is not a
    /// signal at all and becomes a format-error skip.
    pub fn scored(spec: &PillarSpec, score: f64, detail: impl Into<String>) -> Self {
        if !score.is_finite() {
            return Self::format_error(spec);
        }
        Self {
            name: spec.name.clone(),
            kind: spec.kind,
            score: score.clamp(0.0, 100.0),
            detail: detail.into(),
            skipped: false,
            skip_reason: None,
        }
    }

    /// A result excluded from the indices.
    pub fn skipped(spec: &PillarSpec, reason: SkipReason, detail: impl Into<String>) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind,
            score: 0.0,
            detail: detail.into(),
            skipped: true,
            skip_reason: Some(reason),
        }
    }

    pub fn format_error(spec: &PillarSpec) -> Self {
        Self::skipped(spec, SkipReason::FormatError, "format error")
    }
}

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
