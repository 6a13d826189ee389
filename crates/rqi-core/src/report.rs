//! The immutable result of one evaluation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::QualityIndices;
use crate::gate::{GateDecision, Verdict};
use crate::pillar::PillarResult;

/// Aggregate output of one gate run.
///
/// Built once by the evaluator and only read afterwards by the reporter
/// and the history log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Version of the build being gated.
    pub version: String,
    /// Pillar results in catalog order.
    pub pillars: Vec<PillarResult>,
    pub indices: QualityIndices,
    pub threshold: f64,
    pub verdict: Verdict,
    pub override_reason: Option<String>,
}

impl EvaluationReport {
    pub fn new(
        version: impl Into<String>,
        pillars: Vec<PillarResult>,
        indices: QualityIndices,
        threshold: f64,
        decision: GateDecision,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            version: version.into(),
            pillars,
            indices,
            threshold,
            verdict: decision.verdict,
            override_reason: decision.override_reason,
        }
    }

    /// Look up a pillar by display name.
    pub fn pillar(&self, name: &str) -> Option<&PillarResult> {
        self.pillars.iter().find(|p| p.name == name)
    }

    pub fn cqi(&self) -> f64 {
        self.indices.cqi
    }

    pub fn rqi(&self) -> f64 {
        self.indices.rqi
    }

    pub fn skipped_count(&self) -> usize {
        self.pillars.iter().filter(|p| p.skipped).count()
    }
}
