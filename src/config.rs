//! Controller tunables.

use crate::error::ControllerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Attempts granted to a manually run mutating script while its schema warms up.
    pub mutation_retries: u32,
    #[serde(with = "humantime_serde")]
    pub mutation_retry_interval: Duration,
    pub enable_e2e_encryption: bool,
    #[serde(with = "humantime_serde")]
    pub retry_notification_duration: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mutation_retries: 5,
            mutation_retry_interval: Duration::from_millis(5000),
            enable_e2e_encryption: true,
            retry_notification_duration: Duration::from_millis(5000),
        }
    }
}

impl ControllerConfig {
    pub fn from_json(raw: &str) -> Result<Self, ControllerError> {
        serde_json::from_str(raw).map_err(ControllerError::Config)
    }

    /// Load `path`, or the per-user config file when `path` is `None`.
    ///
    /// A missing per-user file yields defaults; a missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ControllerError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        match std::fs::read_to_string(&path) {
            Ok(raw) => Self::from_json(&raw),
            Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(source) => Err(ControllerError::Io { path, source }),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("live-script").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg = ControllerConfig::from_json(r#"{"mutation_retry_interval": "250ms"}"#).unwrap();
        assert_eq!(cfg.mutation_retry_interval, Duration::from_millis(250));
        assert_eq!(cfg.mutation_retries, 5);
        assert!(cfg.enable_e2e_encryption);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = ControllerConfig::load(Some(Path::new("/nonexistent/live-script.json")));
        assert!(matches!(err, Err(ControllerError::Io { .. })));
    }
}
