//! Release gate decision.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default RQI a release must reach.
pub const DEFAULT_THRESHOLD: f64 = 80.0;

/// Gate verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// RQI met the threshold.
    Pass,

    /// RQI below the threshold.
    Fail,

    /// An operator override forced promotion.
    Overridden,
}

impl Verdict {
    /// Label written to reports and history.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASSED",
            Verdict::Fail => "FAILED",
            Verdict::Overridden => "OVERRIDDEN",
        }
    }

    /// Whether the build may be promoted.
    pub fn allows_release(&self) -> bool {
        !matches!(self, Verdict::Fail)
    }

    /// Process exit code for this verdict.
    pub fn exit_code(&self) -> i32 {
        if self.allows_release() {
            0
        } else {
            1
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GatePolicy {
    pub threshold: f64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Outcome of the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDecision {
    pub verdict: Verdict,
    /// Override justification, present only for [`Verdict::Overridden`].
    pub override_reason: Option<String>,
    /// Summary message.
    pub message: String,
}

/// Release gate.
pub struct ReleaseGate;

impl ReleaseGate {
    /// Decide the verdict for an RQI value.
    ///
    /// Gate rule:
    /// - a non-blank override reason always yields `Overridden`
    /// - otherwise `rqi >= threshold` passes, anything lower fails
    pub fn decide(policy: &GatePolicy, rqi: f64, override_reason: Option<&str>) -> GateDecision {
        if let Some(reason) = override_reason.map(str::trim).filter(|r| !r.is_empty()) {
            warn!(
                rqi,
                threshold = policy.threshold,
                reason,
                "Release gate overridden"
            );
            return GateDecision {
                verdict: Verdict::Overridden,
                override_reason: Some(reason.to_string()),
                message: format!("Passed by override: {}", reason),
            };
        }

        if rqi >= policy.threshold {
            GateDecision {
                verdict: Verdict::Pass,
                override_reason: None,
                message: format!("RQI {:.1} meets threshold {:.1}", rqi, policy.threshold),
            }
        } else {
            GateDecision {
                verdict: Verdict::Fail,
                override_reason: None,
                message: format!("RQI below {:.1}%", policy.threshold),
            }
        }
    }
}
