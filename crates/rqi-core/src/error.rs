//! Error types for the release gate.
//!
//! None of these are fatal to an evaluation run: artifact errors become
//! skipped pillars, analysis errors become placeholder scores and config
//! errors fall back to defaults. Only the binary decides what is fatal.

use std::path::PathBuf;

use thiserror::Error;

/// A pillar artifact could not be used.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// No artifact at any of the searched locations.
    #[error("artifact '{key}' not found (searched: {})", display_paths(.searched))]
    NotFound { key: String, searched: Vec<PathBuf> },

    /// The artifact exists but could not be read or parsed.
    #[error("artifact {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl ArtifactError {
    /// Short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactError::NotFound { .. } => "not_found",
            ArtifactError::Malformed { .. } => "malformed",
        }
    }
}

/// Errors talking to the external analysis service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Transport failure (DNS, connect, TLS, request timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-200 status.
    #[error("analysis service returned status {0}")]
    Status(u16),

    /// The response body did not have the expected shape.
    #[error("unexpected analysis response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AnalysisError::Decode(err.to_string())
        } else {
            AnalysisError::Http(err.to_string())
        }
    }
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors writing reporter outputs.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_searched_paths() {
        let err = ArtifactError::NotFound {
            key: "perf".to_string(),
            searched: vec![
                PathBuf::from("tests/perf_results.json"),
                PathBuf::from("./perf_results.json"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("tests/perf_results.json"));
        assert!(msg.contains("./perf_results.json"));
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_malformed_kind() {
        let err = ArtifactError::Malformed {
            path: PathBuf::from("tests/load_results.json"),
            reason: "EOF while parsing".to_string(),
        };
        assert_eq!(err.kind(), "malformed");
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_analysis_status_display() {
        let err = AnalysisError::Status(503);
        assert_eq!(err.to_string(), "analysis service returned status 503");
    }
}
