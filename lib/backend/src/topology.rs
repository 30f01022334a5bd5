// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Derivation of the engine execution configuration.
//!
//! A single shard runs in [`CommunicationMode::Leader`]: this process drives the engine directly.
//! More than one shard runs in [`CommunicationMode::Orchestrator`]: the engine spawns one worker
//! process per shard from the provided worker executable and coordinates them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;
use crate::metadata::EngineConfig;

/// Lowest major compute capability supporting chunked context (Ampere).
pub const CHUNKED_CONTEXT_MIN_MAJOR: u32 = 8;

/// Device compute capability, `major.minor`. Serialized as the string `"8.6"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputeCapability {
    pub major: u32,
    pub minor: u32,
}

impl ComputeCapability {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn supports_chunked_context(&self) -> bool {
        self.major >= CHUNKED_CONTEXT_MIN_MAJOR
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm_{}{}", self.major, self.minor)
    }
}

impl FromStr for ComputeCapability {
    type Err = anyhow::Error;

    /// Parses `"8.6"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("expected <major>.<minor>, got {s:?}"))?;
        Ok(Self::new(major.parse()?, minor.parse()?))
    }
}

impl Serialize for ComputeCapability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{}.{}", self.major, self.minor))
    }
}

impl<'de> Deserialize<'de> for ComputeCapability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CapabilityVisitor;

        impl Visitor<'_> for CapabilityVisitor {
            type Value = ComputeCapability;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a compute capability such as \"8.6\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse()
                    .map_err(|e: anyhow::Error| E::custom(format!("{e:#}")))
            }

            // environment variables like EXECUTOR_COMPUTE_CAPABILITY=8.6 arrive as numbers
            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                self.visit_str(&format!("{v:.1}"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                self.visit_str(&format!("{v}.0"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                self.visit_str(&format!("{v}.0"))
            }
        }

        deserializer.deserialize_any(CapabilityVisitor)
    }
}

/// How the engine is laid out across processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicationMode {
    /// One process drives the engine, no inter-process coordination.
    Leader,
    /// This process coordinates worker processes launched from `worker_path`.
    Orchestrator { worker_path: PathBuf },
}

impl CommunicationMode {
    pub fn is_orchestrator(&self) -> bool {
        matches!(self, Self::Orchestrator { .. })
    }

    pub fn worker_path(&self) -> Option<&Path> {
        match self {
            Self::Leader => None,
            Self::Orchestrator { worker_path } => Some(worker_path),
        }
    }
}

/// Immutable execution configuration handed to the engine launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub mode: CommunicationMode,
    /// Number of shards, one worker process each in orchestrator mode.
    pub world_size: u32,
    pub kv_cache_enabled: bool,
    pub chunked_context_enabled: bool,
}

/// Derive the execution configuration of `config`.
///
/// `capability` is `None` when detection failed, which disables chunked context. Orchestrator
/// mode needs `worker_path`; it is ignored in leader mode.
pub fn derive_execution_config(
    config: &EngineConfig,
    capability: Option<ComputeCapability>,
    worker_path: Option<&Path>,
) -> Result<ExecutionConfig, ConfigError> {
    let mode = if config.world_size == 1 {
        tracing::info!("Detected single engine deployment, using leader mode");
        CommunicationMode::Leader
    } else {
        tracing::info!(
            world_size = config.world_size,
            "Detected sharded engine deployment, using orchestrator mode"
        );
        let worker_path = worker_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingWorkerPath {
                world_size: config.world_size,
            })?;
        CommunicationMode::Orchestrator {
            worker_path: worker_path.to_path_buf(),
        }
    };

    let chunked_context_enabled = capability.is_some_and(|c| c.supports_chunked_context());
    if !chunked_context_enabled {
        tracing::debug!(?capability, "Chunked context disabled");
    }

    Ok(ExecutionConfig {
        mode,
        world_size: config.world_size,
        kv_cache_enabled: true,
        chunked_context_enabled,
    })
}
