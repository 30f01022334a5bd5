// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment variable names read by the backend, kept in one place.

/// Prefix applied to every [`crate::config::BackendSettings`] field when read from the environment.
pub const EXECUTOR_ENV_PREFIX: &str = "EXECUTOR_";

/// Logging and tracing environment variables
pub mod logging {
    /// Log filter (e.g., "debug", "info,executor_backend::stream=trace")
    pub const EXECUTOR_LOG: &str = "EXECUTOR_LOG";

    /// Path to a TOML file with `log_level` and `[log_filters]`
    pub const EXECUTOR_LOGGING_CONFIG_PATH: &str = "EXECUTOR_LOGGING_CONFIG_PATH";

    /// Emit JSON lines instead of the compact human readable format
    pub const EXECUTOR_LOGGING_JSONL: &str = "EXECUTOR_LOGGING_JSONL";

    /// Disable ANSI terminal colors in logs
    pub const EXECUTOR_DISABLE_ANSI_LOGGING: &str = "EXECUTOR_DISABLE_ANSI_LOGGING";

    /// Use local timezone for logging timestamps (default is UTC)
    pub const EXECUTOR_LOG_USE_LOCAL_TZ: &str = "EXECUTOR_LOG_USE_LOCAL_TZ";
}

/// Backend settings environment variables
pub mod backend {
    /// Optional TOML file holding [`crate::config::BackendSettings`]
    pub const EXECUTOR_CONFIG_PATH: &str = "EXECUTOR_CONFIG_PATH";

    /// Path to the worker executable launched in orchestrator mode
    pub const EXECUTOR_WORKER: &str = "EXECUTOR_WORKER";

    /// Name of the metadata document inside the model directory
    pub const EXECUTOR_METADATA_FILE: &str = "EXECUTOR_METADATA_FILE";

    /// Device queried for its compute capability
    pub const EXECUTOR_DEVICE_INDEX: &str = "EXECUTOR_DEVICE_INDEX";

    /// Compute capability used instead of querying the device, e.g. "8.6"
    pub const EXECUTOR_COMPUTE_CAPABILITY: &str = "EXECUTOR_COMPUTE_CAPABILITY";

    /// Capacity of the channel used by push based streaming
    pub const EXECUTOR_STREAM_BUFFER: &str = "EXECUTOR_STREAM_BUFFER";
}
