// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Caller facing generation parameters and their translation into an engine [`Request`].
//!
//! Every constraint is checked here, before the engine is involved.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::TokenIdType;
use crate::engine::{OutputConfig, Request, SamplingConfig};
use crate::error::SubmissionError;

//
// Hyperparameter Constraints
//

/// Minimum allowed value for `top_p`
pub const MIN_TOP_P: f32 = 0.0;
/// Maximum allowed value for `top_p`
pub const MAX_TOP_P: f32 = 1.0;

/// Beam width of every request; beam search is not supported.
pub const BEAM_WIDTH: u32 = 1;

/// Parameters of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(pattern = "owned", derive(Debug))]
pub struct GenerationParams {
    /// Prompt token ids, must not be empty.
    pub tokens: Vec<TokenIdType>,

    /// Upper bound on generated tokens, must be greater than 0.
    pub max_new_tokens: i32,

    /// 0 leaves top-k filtering to the engine default.
    #[builder(default = "0")]
    pub top_k: i32,

    #[builder(default = "1.0")]
    pub top_p: f32,

    #[builder(default = "1.0")]
    pub temperature: f32,

    #[builder(default = "0")]
    pub min_length: i32,

    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,

    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// More than 1 asks the engine to track per-step alternatives. Only the first candidate is
    /// ever streamed back.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_top_tokens: Option<u32>,
}

impl GenerationParams {
    pub fn builder() -> GenerationParamsBuilder {
        GenerationParamsBuilder::default()
    }

    /// Parameters with default sampling: `top_k = 0`, `top_p = 1.0`, `temperature = 1.0`,
    /// `min_length = 0`, no penalties and no seed.
    pub fn new(tokens: Vec<TokenIdType>, max_new_tokens: i32) -> Self {
        Self {
            tokens,
            max_new_tokens,
            top_k: 0,
            top_p: 1.0,
            temperature: 1.0,
            min_length: 0,
            repetition_penalty: None,
            frequency_penalty: None,
            seed: None,
            n_top_tokens: None,
        }
    }

    pub fn validate(&self) -> Result<(), SubmissionError> {
        validate_tokens(&self.tokens)?;
        validate_max_new_tokens(self.max_new_tokens)?;
        validate_top_k(self.top_k)?;
        validate_top_p(self.top_p)?;
        validate_temperature(self.temperature)?;
        validate_min_length(self.min_length)?;
        validate_penalty("repetition_penalty", self.repetition_penalty)?;
        validate_penalty("frequency_penalty", self.frequency_penalty)?;
        Ok(())
    }

    /// Whether the engine should track more than one candidate per step.
    pub fn wants_top_alternatives(&self) -> bool {
        self.n_top_tokens.unwrap_or(1) > 1
    }

    /// Validate and translate into the engine representation.
    pub fn into_request(self) -> Result<Request, SubmissionError> {
        self.validate()?;

        let output = OutputConfig {
            return_log_probs: false,
            return_full_output_ids: false,
            return_top_alternatives: self.wants_top_alternatives(),
        };
        let sampling = SamplingConfig {
            beam_width: BEAM_WIDTH,
            top_k: self.top_k,
            top_p: self.top_p,
            temperature: self.temperature,
            min_length: self.min_length,
            repetition_penalty: self.repetition_penalty,
            frequency_penalty: self.frequency_penalty,
            seed: self.seed,
        };

        Ok(Request {
            input_token_ids: self.tokens,
            // validated positive above
            max_new_tokens: self.max_new_tokens.unsigned_abs(),
            streaming: true,
            sampling,
            output,
        })
    }
}

/// Validates that the prompt is not empty
pub fn validate_tokens(tokens: &[TokenIdType]) -> Result<(), SubmissionError> {
    if tokens.is_empty() {
        return Err(SubmissionError::EmptyTokens);
    }
    Ok(())
}

/// Validates the max_new_tokens parameter
pub fn validate_max_new_tokens(max_new_tokens: i32) -> Result<(), SubmissionError> {
    if max_new_tokens <= 0 {
        return Err(SubmissionError::MaxNewTokens(max_new_tokens));
    }
    Ok(())
}

// Validate top_k
pub fn validate_top_k(top_k: i32) -> Result<(), SubmissionError> {
    if top_k < 0 {
        return Err(SubmissionError::TopK(top_k));
    }
    Ok(())
}

/// Validates the top_p parameter
pub fn validate_top_p(top_p: f32) -> Result<(), SubmissionError> {
    if !(MIN_TOP_P..=MAX_TOP_P).contains(&top_p) {
        return Err(SubmissionError::TopP {
            value: top_p,
            min: MIN_TOP_P,
            max: MAX_TOP_P,
        });
    }
    Ok(())
}

/// Validates the temperature parameter
pub fn validate_temperature(temperature: f32) -> Result<(), SubmissionError> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(SubmissionError::Temperature(temperature));
    }
    Ok(())
}

pub fn validate_min_length(min_length: i32) -> Result<(), SubmissionError> {
    if min_length < 0 {
        return Err(SubmissionError::MinLength(min_length));
    }
    Ok(())
}

/// Validates an optional penalty; only finiteness is enforced.
pub fn validate_penalty(name: &'static str, penalty: Option<f32>) -> Result<(), SubmissionError> {
    match penalty {
        Some(value) if !value.is_finite() => Err(SubmissionError::NonFinitePenalty { name, value }),
        _ => Ok(()),
    }
}
