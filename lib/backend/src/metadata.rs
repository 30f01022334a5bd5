// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Model metadata document shipped with the engine artifacts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// JSON pointer to the number of shards the engine was built for.
pub const WORLD_SIZE_POINTER: &str = "/pretrained_config/mapping/world_size";
/// JSON pointer to the engine version string.
pub const VERSION_POINTER: &str = "/version";

const ARCHITECTURE_POINTER: &str = "/pretrained_config/architecture";
const DTYPE_POINTER: &str = "/pretrained_config/dtype";

/// Parsed model metadata. Unknown fields of the document are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub world_size: u32,
    pub version: String,
    pub architecture: Option<String>,
    pub dtype: Option<String>,
}

impl EngineConfig {
    /// Load `file_name` from the model directory `dir`.
    pub fn from_dir(dir: &Path, file_name: &str) -> Result<Self, ConfigError> {
        let path = dir.join(file_name);
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let document: Value =
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.clone(),
                source,
            })?;
        let config = Self::from_json(&document)?;
        tracing::debug!(path = %path.display(), ?config, "Loaded model metadata");
        Ok(config)
    }

    pub fn from_json(document: &Value) -> Result<Self, ConfigError> {
        let world_size = document
            .pointer(WORLD_SIZE_POINTER)
            .ok_or(ConfigError::MissingField(WORLD_SIZE_POINTER))?;
        let world_size = world_size
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v >= 1)
            .ok_or_else(|| ConfigError::InvalidField {
                field: WORLD_SIZE_POINTER,
                reason: format!("expected an integer >= 1, got {world_size}"),
            })?;

        let version = document
            .pointer(VERSION_POINTER)
            .ok_or(ConfigError::MissingField(VERSION_POINTER))?;
        let version = version
            .as_str()
            .ok_or_else(|| ConfigError::InvalidField {
                field: VERSION_POINTER,
                reason: format!("expected a string, got {version}"),
            })?
            .to_string();

        let optional_str = |pointer: &str| {
            document
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Self {
            world_size,
            version,
            architecture: optional_str(ARCHITECTURE_POINTER),
            dtype: optional_str(DTYPE_POINTER),
        })
    }
}
