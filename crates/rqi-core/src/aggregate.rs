//! Skip-aware index computation.

use serde::{Deserialize, Serialize};

use crate::pillar::PillarResult;

/// Indices computed from one set of pillar results.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityIndices {
    /// Code Quality Index: mean over active development-time pillars.
    pub cqi: f64,
    /// Release Quality Index: mean over all active pillars.
    pub rqi: f64,
    /// Pillars that contributed to RQI.
    pub active: usize,
    /// Pillars excluded as skipped.
    pub skipped: usize,
}

/// Compute CQI and RQI over the non-skipped results.
///
/// An empty active set yields 0 for that index.
pub fn aggregate(results: &[PillarResult]) -> QualityIndices {
    let active: Vec<&PillarResult> = results.iter().filter(|r| !r.skipped).collect();

    let rqi = mean(active.iter().map(|r| r.score));
    let cqi = mean(
        active
            .iter()
            .filter(|r| r.kind.is_development())
            .map(|r| r.score),
    );

    QualityIndices {
        cqi,
        rqi,
        active: active.len(),
        skipped: results.len() - active.len(),
    }
}

fn mean(scores: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = scores.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
