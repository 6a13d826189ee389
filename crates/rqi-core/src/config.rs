//! Gate configuration.
//!
//! Sources, lowest priority first: built-in defaults, the project's
//! `refinery-config.json`, environment variables. The CLI applies its own
//! flags on top. A missing or broken config file is never fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::analysis::AnalysisConfig;
use crate::error::ConfigError;
use crate::gate::DEFAULT_THRESHOLD;

/// Default project descriptor file name.
pub const DEFAULT_CONFIG_FILE: &str = "refinery-config.json";

/// Longest accepted wait between task-status polls.
pub const MAX_POLL_INTERVAL_SECS: u64 = 600;

/// Most task-status requests accepted for one run.
pub const MAX_POLL_ATTEMPTS: u32 = 1000;

/// Project descriptor as written on disk.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub app_name: Option<String>,
    #[serde(alias = "sonarProjectKey")]
    pub project_key: Option<String>,
    pub coverage_path: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub fallback_dir: Option<PathBuf>,
    pub scanner_report_path: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub analysis_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub poll_max_attempts: Option<u32>,
}

impl ConfigFile {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective configuration for one evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Display name of the application.
    pub app_name: String,
    /// Project key on the analysis service.
    pub project_key: String,
    /// Unit-test coverage report whose presence scores the unit pillar.
    pub coverage_path: PathBuf,
    /// Directory holding `<key>_results.json` artifacts.
    pub results_dir: PathBuf,
    /// Secondary artifact directory.
    pub fallback_dir: PathBuf,
    /// Report left by the scan submission step (holds `ceTaskId`).
    pub scanner_report_path: PathBuf,
    /// RQI required to pass.
    pub threshold: f64,
    /// Analysis service connection and polling.
    pub analysis: AnalysisConfig,
}

impl GateConfig {
    /// Defaults for an application id (repository or folder name).
    pub fn defaults_for(app_id: &str) -> Self {
        Self {
            app_name: title_case(app_id),
            project_key: app_id.to_string(),
            coverage_path: PathBuf::from("coverage/lcov.info"),
            results_dir: PathBuf::from("tests"),
            fallback_dir: PathBuf::from("."),
            scanner_report_path: PathBuf::from(".scannerwork/report-task.txt"),
            threshold: DEFAULT_THRESHOLD,
            analysis: AnalysisConfig::default(),
        }
    }

    /// Load from `config_path` and the process environment.
    pub fn load(config_path: &Path) -> Self {
        let folder = std::env::current_dir()
            .ok()
            .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()));
        Self::load_with(config_path, |key| std::env::var(key).ok(), folder.as_deref())
    }

    /// Load with an explicit environment lookup.
    pub fn load_with<F>(config_path: &Path, env: F, folder_name: Option<&str>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = env("GITHUB_REPOSITORY")
            .and_then(|r| r.rsplit('/').next().map(str::to_string))
            .filter(|r| !r.is_empty())
            .or_else(|| folder_name.map(str::to_string))
            .unwrap_or_else(|| "app".to_string());

        let mut config = Self::defaults_for(&app_id);

        if config_path.exists() {
            match ConfigFile::from_file(config_path) {
                Ok(file) => config.apply_file(file),
                Err(e) => warn!(error = %e, "Ignoring config file, using defaults"),
            }
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
        }

        config.apply_env(env);
        config
    }

    /// Overlay values from a config file.
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.app_name {
            self.app_name = v;
        }
        if let Some(v) = file.project_key {
            self.project_key = v;
        }
        if let Some(v) = file.coverage_path {
            self.coverage_path = v;
        }
        if let Some(v) = file.results_dir {
            self.results_dir = v;
        }
        if let Some(v) = file.fallback_dir {
            self.fallback_dir = v;
        }
        if let Some(v) = file.scanner_report_path {
            self.scanner_report_path = v;
        }
        if let Some(v) = file.threshold {
            self.set_threshold(v);
        }
        if let Some(v) = file.analysis_url {
            self.analysis.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = file.poll_interval_secs {
            self.set_poll_interval_secs(v);
        }
        if let Some(v) = file.poll_max_attempts {
            self.set_poll_max_attempts(v);
        }
    }

    /// Overlay values from environment variables.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("RQI_APP_NAME") {
            self.app_name = v;
        }
        if let Some(v) = var("SONAR_PROJECT_KEY") {
            self.project_key = v;
        }
        if let Some(v) = var("RQI_COVERAGE_PATH") {
            self.coverage_path = PathBuf::from(v);
        }
        if let Some(v) = var("RQI_RESULTS_DIR") {
            self.results_dir = PathBuf::from(v);
        }
        if let Some(v) = var("SONAR_HOST_URL") {
            self.analysis.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("SONAR_TOKEN") {
            self.analysis.token = Some(v);
        }
        if let Some(v) = var("RQI_THRESHOLD") {
            match parse_value::<f64>("RQI_THRESHOLD", &v) {
                Ok(t) => self.set_threshold(t),
                Err(e) => warn!(error = %e, "Ignoring environment override"),
            }
        }
        if let Some(v) = var("RQI_POLL_INTERVAL_SECS") {
            match parse_value::<u64>("RQI_POLL_INTERVAL_SECS", &v) {
                Ok(secs) => self.set_poll_interval_secs(secs),
                Err(e) => warn!(error = %e, "Ignoring environment override"),
            }
        }
        if let Some(v) = var("RQI_POLL_MAX_ATTEMPTS") {
            match parse_value::<u32>("RQI_POLL_MAX_ATTEMPTS", &v) {
                Ok(n) => self.set_poll_max_attempts(n),
                Err(e) => warn!(error = %e, "Ignoring environment override"),
            }
        }
    }

    /// Set the threshold if it is a valid percentage.
    pub fn set_threshold(&mut self, threshold: f64) {
        if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
            self.threshold = threshold;
        } else {
            warn!(threshold, "Threshold outside 0-100, keeping {}", self.threshold);
        }
    }

    /// Set the status poll interval if it is within `1..=MAX_POLL_INTERVAL_SECS`.
    pub fn set_poll_interval_secs(&mut self, secs: u64) {
        if (1..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
            self.analysis.poll_interval = Duration::from_secs(secs);
        } else {
            warn!(
                secs,
                "Poll interval outside 1-{}s, keeping {:?}",
                MAX_POLL_INTERVAL_SECS,
                self.analysis.poll_interval
            );
        }
    }

    /// Set the status request limit if it is within `1..=MAX_POLL_ATTEMPTS`.
    pub fn set_poll_max_attempts(&mut self, attempts: u32) {
        if (1..=MAX_POLL_ATTEMPTS).contains(&attempts) {
            self.analysis.max_attempts = attempts;
        } else {
            warn!(
                attempts,
                "Poll attempts outside 1-{}, keeping {}",
                MAX_POLL_ATTEMPTS,
                self.analysis.max_attempts
            );
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// `weather-app_main` → `Weather App Main`.
fn title_case(id: &str) -> String {
    id.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("weather-app-main"), "Weather App Main");
        assert_eq!(title_case("qaas_REFINERY"), "Qaas Refinery");
    }

    #[test]
    fn test_defaults_from_repository_name() {
        let dir = tempdir().unwrap();
        let config = GateConfig::load_with(
            &dir.path().join(DEFAULT_CONFIG_FILE),
            env_of(&[("GITHUB_REPOSITORY", "acme/weather-app")]),
            Some("checkout"),
        );
        assert_eq!(config.app_name, "Weather App");
        assert_eq!(config.project_key, "weather-app");
        assert_eq!(config.threshold, 80.0);
        assert_eq!(config.coverage_path, PathBuf::from("coverage/lcov.info"));
    }

    #[test]
    fn test_defaults_from_folder_name() {
        let dir = tempdir().unwrap();
        let config = GateConfig::load_with(&dir.path().join("missing.json"), env_of(&[]), Some("shop-api"));
        assert_eq!(config.project_key, "shop-api");
        assert_eq!(config.app_name, "Shop Api");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{
                "appName": "QaaS Refinery",
                "sonarProjectKey": "acme_weather",
                "coveragePath": "tests/lcov.info",
                "threshold": 75,
                "pollMaxAttempts": 3
            }"#,
        )
        .unwrap();

        let config = GateConfig::load_with(&path, env_of(&[]), Some("x"));
        assert_eq!(config.app_name, "QaaS Refinery");
        assert_eq!(config.project_key, "acme_weather");
        assert_eq!(config.coverage_path, PathBuf::from("tests/lcov.info"));
        assert_eq!(config.threshold, 75.0);
        assert_eq!(config.analysis.max_attempts, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, r#"{"projectKey": "from_file", "threshold": 70}"#).unwrap();

        let config = GateConfig::load_with(
            &path,
            env_of(&[
                ("SONAR_PROJECT_KEY", "from_env"),
                ("SONAR_TOKEN", "tok"),
                ("RQI_THRESHOLD", "90"),
                ("SONAR_HOST_URL", "https://sonar.internal/"),
            ]),
            Some("x"),
        );
        assert_eq!(config.project_key, "from_env");
        assert_eq!(config.threshold, 90.0);
        assert_eq!(config.analysis.token.as_deref(), Some("tok"));
        assert_eq!(config.analysis.base_url, "https://sonar.internal");
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let config = GateConfig::load_with(&path, env_of(&[]), Some("svc"));
        assert_eq!(config, GateConfig::defaults_for("svc"));
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let dir = tempdir().unwrap();
        let config = GateConfig::load_with(
            &dir.path().join("none.json"),
            env_of(&[
                ("RQI_THRESHOLD", "high"),
                ("RQI_POLL_MAX_ATTEMPTS", "-1"),
                ("SONAR_PROJECT_KEY", "  "),
            ]),
            Some("svc"),
        );
        assert_eq!(config.threshold, 80.0);
        assert_eq!(config.analysis.max_attempts, 12);
        assert_eq!(config.project_key, "svc");
    }

    #[test]
    fn test_out_of_range_polling_rejected() {
        let dir = tempdir().unwrap();
        let max = u64::MAX.to_string();
        let config = GateConfig::load_with(
            &dir.path().join("none.json"),
            env_of(&[
                ("RQI_POLL_INTERVAL_SECS", max.as_str()),
                ("RQI_POLL_MAX_ATTEMPTS", "0"),
            ]),
            Some("svc"),
        );
        assert_eq!(config.analysis.poll_interval, Duration::from_secs(5));
        assert_eq!(config.analysis.max_attempts, 12);

        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, r#"{"pollIntervalSecs": 86400, "pollMaxAttempts": 4000000000}"#)
            .unwrap();
        let config = GateConfig::load_with(&path, env_of(&[]), Some("svc"));
        assert_eq!(config.analysis.poll_interval, Duration::from_secs(5));
        assert_eq!(config.analysis.max_attempts, 12);

        let config = GateConfig::load_with(
            &path,
            env_of(&[("RQI_POLL_INTERVAL_SECS", "30"), ("RQI_POLL_MAX_ATTEMPTS", "4")]),
            Some("svc"),
        );
        assert_eq!(config.analysis.poll_budget(), Duration::from_secs(120));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = GateConfig::defaults_for("svc");
        config.set_threshold(150.0);
        assert_eq!(config.threshold, 80.0);
        config.set_threshold(65.5);
        assert_eq!(config.threshold, 65.5);
    }
}
