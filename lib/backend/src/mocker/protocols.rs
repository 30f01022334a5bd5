// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::TokenIdType;
use crate::engine::Request;

/// One response the mock engine emits for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MockStep {
    /// A non-final token.
    Token(TokenIdType),
    /// A non-final token with a log probability.
    Scored(TokenIdType, f32),
    /// The last token of the request.
    Final(TokenIdType),
    /// An error response, which ends the request.
    Error(String),
}

impl MockStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final(_) | Self::Error(_))
    }
}

/// The responses of one request, grouped into the batches `await_responses` observes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockScript {
    pub batches: Vec<Vec<MockStep>>,
}

impl MockScript {
    pub fn batched(batches: Vec<Vec<MockStep>>) -> Self {
        Self { batches }
    }

    /// One token per batch, the last one final.
    pub fn tokens(tokens: &[TokenIdType]) -> Self {
        let last = tokens.len().saturating_sub(1);
        let batches = tokens
            .iter()
            .enumerate()
            .map(|(i, &token)| {
                if i == last {
                    vec![MockStep::Final(token)]
                } else {
                    vec![MockStep::Token(token)]
                }
            })
            .collect();
        Self { batches }
    }

    /// A single error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            batches: vec![vec![MockStep::Error(message.into())]],
        }
    }

    /// Default generation for `request`: `max_new_tokens` tokens counting up from the last
    /// prompt token.
    pub fn generated(request: &Request) -> Self {
        let start = request
            .input_token_ids
            .last()
            .copied()
            .unwrap_or_default()
            .wrapping_add(1);
        let tokens: Vec<TokenIdType> = (0..request.max_new_tokens)
            .map(|i| start.wrapping_add(i))
            .collect();
        Self::tokens(&tokens)
    }
}

/// Configuration arguments for [`super::MockEngine`]
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(pattern = "owned", build_fn(public))]
pub struct MockEngineArgs {
    /// Requests in flight beyond which enqueue is rejected as saturated.
    #[builder(default = "256")]
    pub max_in_flight: usize,

    /// Delay before each batch of responses is published.
    #[builder(default = "0")]
    pub token_delay_ms: u64,

    /// Readiness reported to callers.
    #[builder(default = "true")]
    pub ready: bool,

    /// Number of iteration statistics retained.
    #[builder(default = "16")]
    pub stats_history: usize,
}

impl Default for MockEngineArgs {
    fn default() -> MockEngineArgs {
        MockEngineArgsBuilder::default()
            .build()
            .expect("Failed to build default MockEngineArgs")
    }
}

impl MockEngineArgs {
    pub fn builder() -> MockEngineArgsBuilder {
        MockEngineArgsBuilder::default()
    }
}
