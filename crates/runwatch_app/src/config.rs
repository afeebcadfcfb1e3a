use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use runwatch_core::PipelineSettings;
use runwatch_engine::SupervisorSettings;
use serde::Deserialize;

use crate::cli::Cli;
use crate::logging::LogDestination;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("invalid endpoint configuration: {0}")]
    InvalidUrl(String),
}

/// Everything the binary reads from its RON file. Missing fields keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub supervisor: SupervisorSettings,
    pub pipeline: PipelineSettings,
    pub log_level: String,
    pub log_destination: LogDestination,
    pub log_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorSettings::default(),
            pipeline: PipelineSettings::default(),
            log_level: "info".to_string(),
            log_destination: LogDestination::Terminal,
            log_file: PathBuf::from("./runwatch.log"),
        }
    }
}

impl AppConfig {
    /// Loads `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Command-line flags win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(base_url) = &cli.base_url {
            self.supervisor.base_url = base_url.clone();
        }
        if let Some(log_file) = &cli.log_file {
            self.log_file = log_file.clone();
            if self.log_destination == LogDestination::Terminal {
                self.log_destination = LogDestination::Both;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.supervisor
            .endpoints()
            .map(|_| ())
            .map_err(|err| ConfigError::InvalidUrl(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn missing_path_gives_defaults() {
        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"(
                supervisor: (base_url: "http://nas.local:8787", poll_active: 0.5),
                pipeline: (start_grace_ms: 2000),
                log_level: "debug",
                log_destination: Both,
            )"#,
        );
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.supervisor.base_url, "http://nas.local:8787");
        assert_eq!(config.supervisor.poll_active, Duration::from_millis(500));
        assert_eq!(
            config.supervisor.poll_idle,
            SupervisorSettings::default().poll_idle
        );
        assert_eq!(config.pipeline.start_grace_ms, 2000);
        assert_eq!(config.pipeline.drift_step, 1);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_destination, LogDestination::Both);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unreadable_and_malformed_files_are_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("absent.ron");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));

        let file = write_config("(supervisor: (base_url: 42))");
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn cli_overrides_and_url_validation() {
        let mut config = AppConfig::default();
        let cli = Cli::parse_from(["runwatch", "--base-url", "not a url", "--log-file", "x.log"]);
        config.apply_cli(&cli);
        assert_eq!(config.log_destination, LogDestination::Both);
        assert_eq!(config.log_file, PathBuf::from("x.log"));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));
    }
}
