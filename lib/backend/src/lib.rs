// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Executor Backend
//!
//! The request-lifecycle layer that sits in front of an LLM inference engine.
//!
//! - [`topology`] decides how the engine is laid out across devices.
//! - [`executor::Executor`] owns one configured engine for the life of the process.
//! - [`request`] validates caller parameters and translates them into an engine [`engine::Request`].
//! - [`stream`] drains the responses of one request, one token at a time.
//!
//! The engine itself is an external collaborator reached through [`engine::InferenceEngine`].

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metadata;
pub mod mocker;
pub mod request;
pub mod stream;
pub mod topology;

/// Token id as understood by the engine.
pub type TokenIdType = u32;

/// Opaque identifier assigned by the engine to an enqueued request.
pub type RequestId = u64;

pub use backend::Backend;
pub use error::{BootstrapError, ConfigError, EngineError, GenerationError, SubmissionError};
pub use executor::Executor;
pub use request::{GenerationParams, GenerationParamsBuilder};
pub use stream::{GeneratedToken, TokenStream};
pub use topology::{CommunicationMode, ComputeCapability, ExecutionConfig};
