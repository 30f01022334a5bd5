// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The inference engine seam.
//!
//! The engine owns scheduling, the KV cache and the devices. This crate only enqueues
//! [`Request`]s and awaits [`Response`]s through [`InferenceEngine`].

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::topology::ExecutionConfig;
use crate::{RequestId, TokenIdType};

/// Sampling specification of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Always 1, beam search is not supported by this layer.
    pub beam_width: u32,
    pub top_k: i32,
    pub top_p: f32,
    pub temperature: f32,
    pub min_length: i32,
    pub repetition_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub seed: Option<u64>,
}

/// What the engine should return besides the sampled tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub return_log_probs: bool,
    /// Return the full output id arrays instead of the newly generated tokens only.
    pub return_full_output_ids: bool,
    /// Track the top alternatives at each step.
    pub return_top_alternatives: bool,
}

/// A request in the engine's representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub input_token_ids: Vec<TokenIdType>,
    pub max_new_tokens: u32,
    pub streaming: bool,
    pub sampling: SamplingConfig,
    pub output: OutputConfig,
}

/// Decoded output of one engine step for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// One sequence of token ids per candidate.
    pub output_token_ids: Vec<Vec<TokenIdType>>,
    /// Log probabilities aligned with `output_token_ids`, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_probs: Option<Vec<Vec<f32>>>,
    /// Set by the engine on the last response of a request.
    pub is_final: bool,
}

impl GenerationResult {
    /// First token of the first candidate.
    pub fn first_token(&self) -> Option<TokenIdType> {
        self.output_token_ids.first()?.first().copied()
    }

    /// Log probability of [`Self::first_token`], when the engine returned one.
    pub fn first_log_prob(&self) -> Option<f32> {
        self.log_probs.as_ref()?.first()?.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Error(String),
    Result(GenerationResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: RequestId,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn result(request_id: RequestId, result: GenerationResult) -> Self {
        Self {
            request_id,
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn error(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    pub fn has_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.payload {
            ResponsePayload::Error(message) => Some(message),
            ResponsePayload::Result(_) => None,
        }
    }
}

/// Statistics of one engine iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: u64,
    pub num_active_requests: usize,
    pub max_active_requests: usize,
}

/// A running inference engine. Implementations are shared across threads.
pub trait InferenceEngine: Send + Sync {
    /// Hand `request` to the engine queue and return its id. Must not block on generation.
    fn enqueue_request(&self, request: Request) -> Result<RequestId, EngineError>;

    /// Block until at least one response for `request_id` is available and return all
    /// responses available at that point, oldest first.
    fn await_responses(&self, request_id: RequestId) -> Result<Vec<Response>, EngineError>;

    /// Statistics of the most recent iterations, oldest first.
    fn latest_iteration_stats(&self) -> Vec<IterationStats>;

    /// Whether the engine accepts new requests.
    fn can_enqueue_requests(&self) -> bool;
}

/// Starts an engine, including any worker processes its [`ExecutionConfig`] calls for.
pub trait EngineLauncher: Send + Sync {
    fn launch(
        &self,
        model_dir: &Path,
        config: &ExecutionConfig,
    ) -> Result<Arc<dyn InferenceEngine>, EngineError>;
}
