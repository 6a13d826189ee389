//! RQI Core Library
//!
//! Scores release pillars from CI artifacts and an external analysis
//! service, aggregates them into the Code and Release Quality Indices and
//! decides whether a build may be promoted.

pub mod aggregate;
pub mod analysis;
pub mod artifact;
pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod fakes;
pub mod gate;
pub mod pillar;
pub mod pipeline;
pub mod report;
pub mod reporter;
pub mod telemetry;

pub use aggregate::{aggregate, QualityIndices};
pub use analysis::{
    AnalysisConfig, AnalysisPoller, AnalysisService, AnalysisTaskHandle, HttpAnalysisService,
    PollOutcome, PollState, ProjectMeasures, TaskStatus, OFFLINE_SCORE, PENDING_SCORE,
};
pub use artifact::{ArtifactReader, RawDocument};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{GateConfig, DEFAULT_CONFIG_FILE};
pub use error::{AnalysisError, ArtifactError, ConfigError, ReportError};
pub use gate::{GateDecision, GatePolicy, ReleaseGate, Verdict, DEFAULT_THRESHOLD};
pub use pillar::{PillarCatalog, PillarKind, PillarResult, PillarSpec, SkipReason};
pub use pipeline::{EvaluationInput, Evaluator};
pub use report::EvaluationReport;
pub use reporter::{record_history, render_console, write_report_json, HistoryLog};
pub use telemetry::init_tracing;
