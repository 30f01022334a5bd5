// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the backend.
//!
//! Fatal conditions abort the operation that raised them ([`ConfigError`] during construction,
//! [`SubmissionError`] during submission). [`GenerationError`] is never returned across the
//! streaming call surface; the pump folds it into the token stream instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::RequestId;

/// Device or driver discovery failure. Never fatal: the backend keeps running with
/// capability dependent optimizations disabled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("device driver initialization failed: {0}")]
    DriverInit(String),

    #[error("engine plugin registration failed: {0}")]
    PluginRegistration(String),

    #[error("no device at index {0}")]
    NoDevice(u32),

    #[error("compute capability query failed for device {device}: {reason}")]
    CapabilityQuery { device: u32, reason: String },
}

/// The execution configuration could not be derived, or the engine could not be built from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read model metadata {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model metadata {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model metadata is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("model metadata field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("world size {world_size} requires orchestrator mode, but no worker executable was provided")]
    MissingWorkerPath { world_size: u32 },

    #[error("invalid backend settings: {0}")]
    Settings(#[from] Box<figment::Error>),

    #[error("invalid backend settings: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("inference engine failed to start: {0}")]
    Engine(#[source] EngineError),
}

/// A generation request was refused before or while being enqueued.
#[derive(Debug, Error, PartialEq)]
pub enum SubmissionError {
    #[error("input token sequence must not be empty")]
    EmptyTokens,

    #[error("max_new_tokens must be greater than 0, got {0}")]
    MaxNewTokens(i32),

    #[error("top_k must be greater than or equal to 0, got {0}")]
    TopK(i32),

    #[error("top_p must be between {min} and {max}, got {value}")]
    TopP { value: f32, min: f32, max: f32 },

    #[error("temperature must be a finite value greater than 0, got {0}")]
    Temperature(f32),

    #[error("min_length must be greater than or equal to 0, got {0}")]
    MinLength(i32),

    #[error("{name} must be finite, got {value}")]
    NonFinitePenalty { name: &'static str, value: f32 },

    #[error("executor is not ready to accept requests")]
    NotReady,

    #[error("engine rejected the request: {0}")]
    Rejected(#[source] EngineError),
}

/// The engine reported a failure for an in-flight request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("request {request_id} failed during generation: {message}")]
    Response { request_id: RequestId, message: String },

    #[error("awaiting responses for request {request_id} failed: {source}")]
    Engine {
        request_id: RequestId,
        #[source]
        source: EngineError,
    },
}

impl GenerationError {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Response { request_id, .. } | Self::Engine { request_id, .. } => *request_id,
        }
    }
}

/// Errors raised by the inference engine collaborator itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine saturated: {in_flight} requests in flight (capacity {capacity})")]
    Saturated { in_flight: usize, capacity: usize },

    #[error("unknown request id {0}")]
    UnknownRequest(RequestId),

    #[error("engine is shut down")]
    Shutdown,

    #[error("engine launch failed: {0}")]
    Launch(String),

    #[error("internal engine error: {0}")]
    Internal(String),
}
