// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::PathBuf;

use derive_builder::Builder;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;
use crate::topology::ComputeCapability;

pub mod environment_names;

use environment_names::{EXECUTOR_ENV_PREFIX, backend as env_backend, logging as env_logging};

/// Default name of the metadata document at the root of the model directory
pub const DEFAULT_METADATA_FILE: &str = "config.json";

/// Default capacity of the channel backing push based streaming
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Settings of the backend that are not derived from the model itself.
#[derive(Serialize, Deserialize, Validate, Debug, Builder, Clone, PartialEq)]
#[builder(pattern = "owned", derive(Debug))]
#[serde(default)]
pub struct BackendSettings {
    /// Worker executable spawned by the engine in orchestrator mode.
    /// Set this at runtime with environment variable EXECUTOR_WORKER.
    #[builder(default, setter(into, strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_worker: Option<PathBuf>,

    /// Metadata document read from the model directory.
    #[builder(default = "DEFAULT_METADATA_FILE.to_string()", setter(into))]
    pub metadata_file: String,

    /// Device whose compute capability drives optional engine features.
    #[builder(default = "0")]
    pub device_index: u32,

    /// `major.minor` compute capability that replaces device detection.
    /// Set this at runtime with environment variable EXECUTOR_COMPUTE_CAPABILITY.
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_capability: Option<ComputeCapability>,

    /// Number of tokens a push based stream may buffer before the pump blocks.
    #[validate(range(min = 1))]
    #[builder(default = "DEFAULT_STREAM_BUFFER")]
    pub stream_buffer: usize,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            executor_worker: None,
            metadata_file: DEFAULT_METADATA_FILE.to_string(),
            device_index: 0,
            compute_capability: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl fmt::Display for BackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.executor_worker {
            Some(worker) => write!(f, "executor_worker={}", worker.display())?,
            None => write!(f, "executor_worker=<none>")?,
        }
        write!(f, ", metadata_file={}", self.metadata_file)?;
        write!(f, ", device_index={}", self.device_index)?;
        if let Some(capability) = &self.compute_capability {
            write!(f, ", compute_capability={capability}")?;
        }
        write!(f, ", stream_buffer={}", self.stream_buffer)
    }
}

impl BackendSettings {
    pub fn builder() -> BackendSettingsBuilder {
        BackendSettingsBuilder::default()
    }

    pub(crate) fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(BackendSettings::default()));

        if let Ok(path) = std::env::var(env_backend::EXECUTOR_CONFIG_PATH)
            && !path.is_empty()
        {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(EXECUTOR_ENV_PREFIX).filter_map(|k| {
            let full_key = format!("{EXECUTOR_ENV_PREFIX}{}", k.as_str());
            // filters out empty environment variables
            match std::env::var(&full_key) {
                Ok(v) if !v.is_empty() => {
                    let mapped_key = match k.as_str() {
                        "WORKER" => "executor_worker",
                        "METADATA_FILE" => "metadata_file",
                        "DEVICE_INDEX" => "device_index",
                        "COMPUTE_CAPABILITY" => "compute_capability",
                        "STREAM_BUFFER" => "stream_buffer",
                        // EXECUTOR_LOG and friends belong to the logging setup
                        _ => return None,
                    };
                    Some(mapped_key.into())
                }
                _ => None,
            }
        }))
    }

    /// Load the settings from the environment and configuration files.
    ///
    /// Priority, highest first:
    /// 1. Environment variables prefixed with `EXECUTOR_`
    /// 2. TOML file named by `EXECUTOR_CONFIG_PATH`
    /// 3. Built-in defaults
    pub fn from_settings() -> Result<Self, ConfigError> {
        let settings: BackendSettings = Self::figment().extract().map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }
}

// ===== Environment Variable Utilities =====

/// Truthy values: "1", "true", "on", "yes" (case-insensitive)
pub fn is_truthy(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

/// Returns `false` if the environment variable is unset or not truthy.
pub fn env_is_truthy(env: &str) -> bool {
    std::env::var(env).is_ok_and(|val| is_truthy(&val))
}

/// Whether logs are emitted as JSON lines (`EXECUTOR_LOGGING_JSONL`).
pub fn jsonl_logging_enabled() -> bool {
    env_is_truthy(env_logging::EXECUTOR_LOGGING_JSONL)
}

/// Whether ANSI colors are stripped from logs (`EXECUTOR_DISABLE_ANSI_LOGGING`).
pub fn disable_ansi_logging() -> bool {
    env_is_truthy(env_logging::EXECUTOR_DISABLE_ANSI_LOGGING)
}

/// Whether log timestamps use the local timezone instead of UTC (`EXECUTOR_LOG_USE_LOCAL_TZ`).
pub fn use_local_timezone() -> bool {
    env_is_truthy(env_logging::EXECUTOR_LOG_USE_LOCAL_TZ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_is_truthy() {
        for val in ["1", "true", "True", "ON", "yes"] {
            assert!(is_truthy(val), "{val} should be truthy");
        }
        for val in ["0", "false", "off", "no", "", "random"] {
            assert!(!is_truthy(val), "{val} should not be truthy");
        }
    }

    #[test]
    fn test_env_is_truthy_not_set() {
        assert!(!env_is_truthy("EXECUTOR_DEFINITELY_NOT_SET_12345"));
    }

    #[test]
    fn test_settings_defaults() -> anyhow::Result<()> {
        temp_env::with_vars(
            vec![
                (env_backend::EXECUTOR_WORKER, None::<&str>),
                (env_backend::EXECUTOR_CONFIG_PATH, None),
                (env_backend::EXECUTOR_DEVICE_INDEX, None),
                (env_backend::EXECUTOR_COMPUTE_CAPABILITY, None),
                (env_backend::EXECUTOR_STREAM_BUFFER, Some("")),
            ],
            || {
                let settings = BackendSettings::from_settings()?;
                assert_eq!(settings, BackendSettings::default());
                Ok(())
            },
        )
    }

    #[test]
    fn test_settings_with_env_vars() -> anyhow::Result<()> {
        temp_env::with_vars(
            vec![
                (env_backend::EXECUTOR_WORKER, Some("/opt/engine/bin/worker")),
                (env_backend::EXECUTOR_DEVICE_INDEX, Some("3")),
                (env_backend::EXECUTOR_STREAM_BUFFER, Some("8")),
                (env_backend::EXECUTOR_CONFIG_PATH, None),
            ],
            || {
                let settings = BackendSettings::from_settings()?;
                assert_eq!(
                    settings.executor_worker,
                    Some(PathBuf::from("/opt/engine/bin/worker"))
                );
                assert_eq!(settings.device_index, 3);
                assert_eq!(settings.stream_buffer, 8);
                assert_eq!(settings.metadata_file, DEFAULT_METADATA_FILE);
                Ok(())
            },
        )
    }

    #[test]
    fn test_settings_from_toml_file_overridden_by_env() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "metadata_file = \"engine.json\"")?;
        writeln!(file, "device_index = 1")?;
        let path = file.path().to_string_lossy().to_string();

        temp_env::with_vars(
            vec![
                (env_backend::EXECUTOR_CONFIG_PATH, Some(path.as_str())),
                (env_backend::EXECUTOR_DEVICE_INDEX, Some("2")),
                (env_backend::EXECUTOR_WORKER, None),
                (env_backend::EXECUTOR_STREAM_BUFFER, None),
            ],
            || {
                let settings = BackendSettings::from_settings()?;
                assert_eq!(settings.metadata_file, "engine.json");
                assert_eq!(settings.device_index, 2);
                Ok(())
            },
        )
    }

    #[rstest]
    #[case("8.6", ComputeCapability::new(8, 6))]
    #[case("9.0", ComputeCapability::new(9, 0))]
    #[case("12.0", ComputeCapability::new(12, 0))]
    #[case("7.5", ComputeCapability::new(7, 5))]
    fn test_compute_capability_from_env(
        #[case] value: &str,
        #[case] expected: ComputeCapability,
    ) -> anyhow::Result<()> {
        temp_env::with_vars(
            vec![
                (env_backend::EXECUTOR_COMPUTE_CAPABILITY, Some(value)),
                (env_backend::EXECUTOR_CONFIG_PATH, None),
            ],
            || {
                let settings = BackendSettings::from_settings()?;
                assert_eq!(settings.compute_capability, Some(expected));
                Ok(())
            },
        )
    }

    #[test]
    fn test_compute_capability_from_toml_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "compute_capability = \"8.9\"")?;
        let path = file.path().to_string_lossy().to_string();

        temp_env::with_vars(
            vec![
                (env_backend::EXECUTOR_CONFIG_PATH, Some(path.as_str())),
                (env_backend::EXECUTOR_COMPUTE_CAPABILITY, None),
            ],
            || {
                let settings = BackendSettings::from_settings()?;
                assert_eq!(
                    settings.compute_capability,
                    Some(ComputeCapability::new(8, 9))
                );
                Ok(())
            },
        )
    }

    #[test]
    fn test_settings_rejects_malformed_compute_capability() {
        temp_env::with_vars(
            vec![
                (env_backend::EXECUTOR_COMPUTE_CAPABILITY, Some("ampere")),
                (env_backend::EXECUTOR_CONFIG_PATH, None),
            ],
            || {
                let err = BackendSettings::from_settings().unwrap_err();
                assert!(matches!(err, ConfigError::Settings(_)), "{err}");
            },
        );
    }

    #[test]
    fn test_settings_rejects_zero_stream_buffer() {
        temp_env::with_vars(
            vec![
                (env_backend::EXECUTOR_STREAM_BUFFER, Some("0")),
                (env_backend::EXECUTOR_CONFIG_PATH, None),
            ],
            || {
                let err = BackendSettings::from_settings().unwrap_err();
                assert!(matches!(err, ConfigError::Validation(_)), "{err}");
            },
        );
    }

    #[test]
    fn test_settings_builder() {
        let settings = BackendSettings::builder()
            .executor_worker("/usr/local/bin/worker")
            .stream_buffer(4)
            .build()
            .unwrap();
        assert_eq!(
            settings.executor_worker,
            Some(PathBuf::from("/usr/local/bin/worker"))
        );
        assert_eq!(settings.stream_buffer, 4);
        assert_eq!(settings.metadata_file, DEFAULT_METADATA_FILE);
        assert!(settings.validate().is_ok());
    }
}
