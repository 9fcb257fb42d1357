//! Process-wide replay configuration, resolved once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const MODE_ENV_VAR: &str = "LOGREPLAY_MODE";
pub const CONTAINER_ENV_VAR: &str = "LOGREPLAY_CONTAINER";
pub const CONTAINER_RUNTIME_ENV_VAR: &str = "LOGREPLAY_CONTAINER_RUNTIME";
pub const ELEVATION_ENV_VAR: &str = "LOGREPLAY_ELEVATION";
pub const HOST_TMP_DIR_ENV_VAR: &str = "LOGREPLAY_HOST_TMP_DIR";
pub const CONTAINER_TMP_DIR_ENV_VAR: &str = "LOGREPLAY_CONTAINER_TMP_DIR";
pub const STEP_TIMEOUT_ENV_VAR: &str = "LOGREPLAY_STEP_TIMEOUT_SECS";

pub const DEFAULT_ELEVATION: &str = "sudo";
pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";
pub const DEFAULT_CONTAINER_NAME: &str = "crowdsec";
pub const DEFAULT_HOST_TMP_DIR: &str = "./tmp/replay";
pub const DEFAULT_CONTAINER_TMP_DIR: &str = "/tmp/replay";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown execution mode `{0}` (expected `direct` or `contained`)")]
    UnknownMode(String),
    #[error("{STEP_TIMEOUT_ENV_VAR} must be a positive number of seconds, got `{0}`")]
    InvalidTimeout(String),
    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

/// How engine tools are launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run tools on the host through an elevation wrapper (`sudo tool ...`).
    Direct { elevation: String },
    /// Run tools inside a container (`docker exec <container> tool ...`).
    Contained { runtime: String, container: String },
}

impl ExecutionMode {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionMode::Direct { .. } => "direct",
            ExecutionMode::Contained { .. } => "contained",
        }
    }

    pub fn is_contained(&self) -> bool {
        matches!(self, ExecutionMode::Contained { .. })
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Direct {
            elevation: DEFAULT_ELEVATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    pub mode: ExecutionMode,
    /// Where artifacts are written on the host.
    pub host_tmp_dir: PathBuf,
    /// The same directory as seen by the tools in contained mode. Unused in
    /// direct mode, where tools see host paths.
    pub container_tmp_dir: PathBuf,
    /// `None` waits for each step indefinitely.
    pub step_timeout: Option<Duration>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self::direct()
    }
}

impl ReplayConfig {
    pub fn direct() -> Self {
        Self {
            mode: ExecutionMode::default(),
            host_tmp_dir: env::temp_dir(),
            container_tmp_dir: PathBuf::from(DEFAULT_CONTAINER_TMP_DIR),
            step_timeout: None,
        }
    }

    pub fn contained(container: impl Into<String>) -> Self {
        Self {
            mode: ExecutionMode::Contained {
                runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
                container: container.into(),
            },
            host_tmp_dir: PathBuf::from(DEFAULT_HOST_TMP_DIR),
            container_tmp_dir: PathBuf::from(DEFAULT_CONTAINER_TMP_DIR),
            step_timeout: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source. Blank
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mode_name = read(MODE_ENV_VAR).unwrap_or_else(|| "direct".to_string());
        let mut config = match mode_name.to_ascii_lowercase().as_str() {
            "direct" | "host" => {
                let mut config = Self::direct();
                if let Some(elevation) = read(ELEVATION_ENV_VAR) {
                    config.mode = ExecutionMode::Direct { elevation };
                }
                config
            }
            "contained" | "container" | "docker" => {
                let container =
                    read(CONTAINER_ENV_VAR).unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string());
                let runtime = read(CONTAINER_RUNTIME_ENV_VAR)
                    .unwrap_or_else(|| DEFAULT_CONTAINER_RUNTIME.to_string());
                Self {
                    mode: ExecutionMode::Contained { runtime, container },
                    host_tmp_dir: read(HOST_TMP_DIR_ENV_VAR)
                        .map_or_else(|| PathBuf::from(DEFAULT_HOST_TMP_DIR), PathBuf::from),
                    container_tmp_dir: read(CONTAINER_TMP_DIR_ENV_VAR)
                        .map_or_else(|| PathBuf::from(DEFAULT_CONTAINER_TMP_DIR), PathBuf::from),
                    step_timeout: None,
                }
            }
            _ => return Err(ConfigError::UnknownMode(mode_name)),
        };

        if let Some(raw) = read(STEP_TIMEOUT_ENV_VAR) {
            let secs: f64 = raw
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::InvalidTimeout(raw));
            }
            config.step_timeout = Some(Duration::from_secs_f64(secs));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match &self.mode {
            ExecutionMode::Direct { elevation } if elevation.is_empty() => {
                Err(ConfigError::Empty {
                    name: ELEVATION_ENV_VAR,
                })
            }
            ExecutionMode::Contained { container, .. } if container.is_empty() => {
                Err(ConfigError::Empty {
                    name: CONTAINER_ENV_VAR,
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_direct_mode_with_system_temp_dir() {
        let config = ReplayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ReplayConfig::direct());
        assert_eq!(config.host_tmp_dir, env::temp_dir());
        assert_eq!(config.step_timeout, None);
    }

    #[test]
    fn contained_mode_reads_container_settings() {
        let config = ReplayConfig::from_lookup(lookup(&[
            (MODE_ENV_VAR, "Docker"),
            (CONTAINER_ENV_VAR, "cs-test"),
            (CONTAINER_RUNTIME_ENV_VAR, "podman"),
            (HOST_TMP_DIR_ENV_VAR, "/var/lib/replay"),
            (CONTAINER_TMP_DIR_ENV_VAR, "/replay"),
        ]))
        .unwrap();
        assert_eq!(
            config.mode,
            ExecutionMode::Contained {
                runtime: "podman".to_string(),
                container: "cs-test".to_string(),
            }
        );
        assert_eq!(config.host_tmp_dir, PathBuf::from("/var/lib/replay"));
        assert_eq!(config.container_tmp_dir, PathBuf::from("/replay"));
    }

    #[test]
    fn contained_mode_defaults() {
        let config = ReplayConfig::from_lookup(lookup(&[(MODE_ENV_VAR, "contained")])).unwrap();
        assert_eq!(config, ReplayConfig::contained(DEFAULT_CONTAINER_NAME));
    }

    #[test]
    fn direct_mode_ignores_host_tmp_override() {
        let config = ReplayConfig::from_lookup(lookup(&[
            (MODE_ENV_VAR, "direct"),
            (HOST_TMP_DIR_ENV_VAR, "/elsewhere"),
            (ELEVATION_ENV_VAR, "doas"),
        ]))
        .unwrap();
        assert_eq!(config.host_tmp_dir, env::temp_dir());
        assert_eq!(
            config.mode,
            ExecutionMode::Direct {
                elevation: "doas".to_string()
            }
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = ReplayConfig::from_lookup(lookup(&[(MODE_ENV_VAR, "k8s")])).unwrap_err();
        assert_eq!(err, ConfigError::UnknownMode("k8s".to_string()));
    }

    #[test]
    fn step_timeout_is_parsed_and_validated() {
        let config =
            ReplayConfig::from_lookup(lookup(&[(STEP_TIMEOUT_ENV_VAR, "90")])).unwrap();
        assert_eq!(config.step_timeout, Some(Duration::from_secs(90)));

        for bad in ["0", "-3", "soon"] {
            let err = ReplayConfig::from_lookup(lookup(&[(STEP_TIMEOUT_ENV_VAR, bad)]))
                .unwrap_err();
            assert_eq!(err, ConfigError::InvalidTimeout(bad.to_string()));
        }
    }
}
