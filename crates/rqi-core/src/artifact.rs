//! Artifact reader for pillar result documents.
//!
//! Upstream pipeline jobs drop `<key>_results.json` files into a results
//! directory before this stage runs, so reads are single-shot with no
//! retries. A missing file and a malformed file are reported differently
//! even though both end up as skipped pillars.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::ArtifactError;

/// Parsed contents of one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// Where the document was found.
    pub path: PathBuf,

    /// Parsed JSON body.
    pub body: Value,
}

/// Locates and parses pillar artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactReader {
    results_dir: PathBuf,
    fallback_dir: Option<PathBuf>,
}

impl ArtifactReader {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            fallback_dir: None,
        }
    }

    /// Secondary directory searched when the results directory has no match.
    pub fn with_fallback(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    /// File name for a source key.
    pub fn file_name(source_key: &str) -> String {
        format!("{}_results.json", source_key)
    }

    /// Candidate locations, in search order.
    pub fn candidates(&self, source_key: &str) -> Vec<PathBuf> {
        let file = Self::file_name(source_key);
        let mut paths = vec![self.results_dir.join(&file)];
        if let Some(fallback) = &self.fallback_dir {
            let alt = fallback.join(&file);
            if alt != paths[0] {
                paths.push(alt);
            }
        }
        paths
    }

    /// Read and parse the artifact for `source_key`.
    pub async fn read(&self, source_key: &str) -> Result<RawDocument, ArtifactError> {
        let candidates = self.candidates(source_key);
        for path in &candidates {
            if !exists(path).await {
                continue;
            }
            debug!(key = source_key, path = %path.display(), "Reading artifact");
            return parse_file(path).await;
        }

        Err(ArtifactError::NotFound {
            key: source_key.to_string(),
            searched: candidates,
        })
    }
}

/// Whether a file exists. Used for presence-only signals such as the
/// coverage report.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn parse_file(path: &Path) -> Result<RawDocument, ArtifactError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ArtifactError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if content.trim().is_empty() {
        return Err(ArtifactError::Malformed {
            path: path.to_path_buf(),
            reason: "empty file".to_string(),
        });
    }

    let body: Value = serde_json::from_str(&content).map_err(|e| ArtifactError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(RawDocument {
        path: path.to_path_buf(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_from_results_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("entry_results.json"),
            r#"{"score": 100, "detail": "App Up"}"#,
        )
        .unwrap();

        let reader = ArtifactReader::new(dir.path());
        let doc = reader.read("entry").await.unwrap();
        assert_eq!(doc.body, json!({"score": 100, "detail": "App Up"}));
        assert_eq!(doc.path, dir.path().join("entry_results.json"));
    }

    #[tokio::test]
    async fn test_read_falls_back() {
        let results = tempdir().unwrap();
        let fallback = tempdir().unwrap();
        std::fs::write(fallback.path().join("load_results.json"), "{}").unwrap();

        let reader = ArtifactReader::new(results.path()).with_fallback(fallback.path());
        let doc = reader.read("load").await.unwrap();
        assert_eq!(doc.path, fallback.path().join("load_results.json"));
    }

    #[tokio::test]
    async fn test_results_dir_wins_over_fallback() {
        let results = tempdir().unwrap();
        let fallback = tempdir().unwrap();
        std::fs::write(results.path().join("perf_results.json"), r#"{"a": 1}"#).unwrap();
        std::fs::write(fallback.path().join("perf_results.json"), r#"{"a": 2}"#).unwrap();

        let reader = ArtifactReader::new(results.path()).with_fallback(fallback.path());
        let doc = reader.read("perf").await.unwrap();
        assert_eq!(doc.body["a"], 1);
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let reader = ArtifactReader::new(dir.path()).with_fallback(dir.path().join("alt"));
        let err = reader.read("chaos").await.unwrap_err();
        match err {
            ArtifactError::NotFound { key, searched } => {
                assert_eq!(key, "chaos");
                assert_eq!(searched.len(), 2);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("security_results.json"), "{not json").unwrap();

        let reader = ArtifactReader::new(dir.path());
        let err = reader.read("security").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_empty_file_is_malformed_not_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("accuracy_results.json"), "  \n").unwrap();

        let reader = ArtifactReader::new(dir.path());
        let err = reader.read("accuracy").await.unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[tokio::test]
    async fn test_exists_ignores_directories() {
        let dir = tempdir().unwrap();
        assert!(!exists(dir.path()).await);
        let file = dir.path().join("lcov.info");
        std::fs::write(&file, "TN:").unwrap();
        assert!(exists(&file).await);
    }

    #[test]
    fn test_candidates_dedupe_same_dir() {
        let reader = ArtifactReader::new("tests").with_fallback("tests");
        assert_eq!(reader.candidates("entry"), vec![PathBuf::from("tests/entry_results.json")]);
    }
}
