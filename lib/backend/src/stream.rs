// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Response streaming for a single request.
//!
//! [`TokenStream`] is the pull side: a finite iterator that blocks on the engine until the next
//! response for its request is available, and yields exactly one terminal item, either a token
//! with `is_final` set or a [`GenerationError`]. [`pump`] drives a stream into a per-token
//! callback and [`spawn_stream`] forwards it into a bounded channel from a dedicated thread.
//!
//! Ordering is the engine's arrival order for the request. Nothing is reordered or merged.

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, sync_channel};
use std::thread;

use crate::engine::{InferenceEngine, Response, ResponsePayload};
use crate::error::GenerationError;
use crate::{RequestId, TokenIdType};

/// Score reported when the engine did not return a log probability.
pub const PLACEHOLDER_SCORE: f32 = 1.0;
/// Token id passed to the callback when generation fails.
pub const ERROR_SENTINEL_TOKEN: TokenIdType = 0;
/// Score passed to the callback when generation fails.
pub const ERROR_SENTINEL_SCORE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StreamState {
    Streaming,
    Done,
}

/// One token surfaced from the first candidate of a response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratedToken {
    pub token_id: TokenIdType,
    /// Log probability of the token, or [`PLACEHOLDER_SCORE`].
    pub score: f32,
    pub is_final: bool,
}

/// Lazy, non-restartable sequence of the tokens of one request.
pub struct TokenStream {
    engine: Arc<dyn InferenceEngine>,
    request_id: RequestId,
    pending: VecDeque<Response>,
    state: StreamState,
    generated: usize,
}

impl TokenStream {
    pub fn new(engine: Arc<dyn InferenceEngine>, request_id: RequestId) -> Self {
        Self {
            engine,
            request_id,
            pending: VecDeque::new(),
            state: StreamState::Streaming,
            generated: 0,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Real tokens yielded so far; error items are not counted.
    pub fn generated(&self) -> usize {
        self.generated
    }

    fn finish(&mut self) {
        self.state = StreamState::Done;
        if !self.pending.is_empty() {
            tracing::debug!(
                request_id = self.request_id,
                discarded = self.pending.len(),
                "Discarding responses received after the terminal response"
            );
            self.pending.clear();
        }
    }

    fn classify(&mut self, response: Response) -> Result<GeneratedToken, GenerationError> {
        let result = match response.payload {
            ResponsePayload::Error(message) => {
                self.finish();
                return Err(GenerationError::Response {
                    request_id: self.request_id,
                    message,
                });
            }
            ResponsePayload::Result(result) => result,
        };

        let Some(token_id) = result.first_token() else {
            self.finish();
            return Err(GenerationError::Response {
                request_id: self.request_id,
                message: "response carried no output tokens".to_string(),
            });
        };

        let token = GeneratedToken {
            token_id,
            score: result.first_log_prob().unwrap_or(PLACEHOLDER_SCORE),
            is_final: result.is_final,
        };
        self.generated += 1;
        tracing::trace!(
            request_id = self.request_id,
            token_id,
            score = token.score,
            is_final = token.is_final,
            "Decoded token"
        );

        if token.is_final {
            self.finish();
        }
        Ok(token)
    }
}

impl Iterator for TokenStream {
    type Item = Result<GeneratedToken, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == StreamState::Done {
            return None;
        }

        loop {
            if let Some(response) = self.pending.pop_front() {
                return Some(self.classify(response));
            }

            match self.engine.await_responses(self.request_id) {
                Ok(responses) => self.pending.extend(responses),
                Err(source) => {
                    self.finish();
                    return Some(Err(GenerationError::Engine {
                        request_id: self.request_id,
                        source,
                    }));
                }
            }
        }
    }
}

impl FusedIterator for TokenStream {}

/// Drive `stream` to completion, invoking `callback(context, token_id, score, is_final)` once per
/// token in arrival order.
///
/// A generation error is logged and reported as a single
/// `(ERROR_SENTINEL_TOKEN, ERROR_SENTINEL_SCORE, true)` invocation. Returns the number of real
/// tokens delivered, which excludes the error sentinel.
pub fn pump<C, F>(stream: TokenStream, context: &mut C, mut callback: F) -> usize
where
    C: ?Sized,
    F: FnMut(&mut C, TokenIdType, f32, bool),
{
    let request_id = stream.request_id();
    let mut delivered = 0;

    for item in stream {
        match item {
            Ok(token) => {
                delivered += 1;
                callback(context, token.token_id, token.score, token.is_final);
            }
            Err(e) => {
                tracing::warn!(
                    request_id = e.request_id(),
                    error = %e,
                    "Caught error during generation"
                );
                callback(context, ERROR_SENTINEL_TOKEN, ERROR_SENTINEL_SCORE, true);
            }
        }
    }

    tracing::debug!(request_id, delivered, "Stream finished");
    delivered
}

/// Run `stream` on a dedicated thread and forward its items into a channel holding at most
/// `capacity` undelivered items. The thread blocks while the channel is full.
///
/// Dropping the receiver stops polling; the request itself keeps running in the engine.
pub fn spawn_stream(
    stream: TokenStream,
    capacity: usize,
) -> std::io::Result<Receiver<Result<GeneratedToken, GenerationError>>> {
    let request_id = stream.request_id();
    let (tx, rx) = sync_channel(capacity);

    thread::Builder::new()
        .name(format!("token-stream-{request_id}"))
        .spawn(move || {
            for item in stream {
                if tx.send(item).is_err() {
                    tracing::debug!(request_id, "Stream receiver dropped, stop polling");
                    break;
                }
            }
        })?;

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GenerationResult, IterationStats, Request};
    use crate::error::EngineError;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;

    /// Engine replaying fixed batches for request 1.
    struct ReplayEngine {
        batches: Mutex<VecDeque<Result<Vec<Response>, EngineError>>>,
        polls: Mutex<usize>,
    }

    impl ReplayEngine {
        fn new(batches: Vec<Result<Vec<Response>, EngineError>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
                polls: Mutex::new(0),
            })
        }
    }

    impl InferenceEngine for ReplayEngine {
        fn enqueue_request(&self, _request: Request) -> Result<RequestId, EngineError> {
            Ok(1)
        }

        fn await_responses(&self, request_id: RequestId) -> Result<Vec<Response>, EngineError> {
            *self.polls.lock() += 1;
            self.batches
                .lock()
                .pop_front()
                .unwrap_or(Err(EngineError::UnknownRequest(request_id)))
        }

        fn latest_iteration_stats(&self) -> Vec<IterationStats> {
            Vec::new()
        }

        fn can_enqueue_requests(&self) -> bool {
            true
        }
    }

    fn token(id: TokenIdType, is_final: bool) -> Response {
        Response::result(
            1,
            GenerationResult {
                output_token_ids: vec![vec![id]],
                log_probs: None,
                is_final,
            },
        )
    }

    fn collect(engine: Arc<ReplayEngine>) -> Vec<(TokenIdType, f32, bool)> {
        let mut calls = Vec::new();
        let count = pump(TokenStream::new(engine, 1), &mut calls, |calls, t, s, f| {
            calls.push((t, s, f))
        });
        assert_eq!(count, calls.iter().filter(|(t, s, _)| (*t, *s) != (0, 0.0)).count());
        calls
    }

    #[test]
    fn test_tokens_then_final() {
        let engine = ReplayEngine::new(vec![
            Ok(vec![token(10, false)]),
            Ok(vec![token(11, false), token(12, true)]),
        ]);
        let mut calls = Vec::new();
        let count = pump(TokenStream::new(engine.clone(), 1), &mut calls, |c, t, s, f| {
            c.push((t, s, f))
        });
        assert_eq!(count, 3);
        assert_eq!(
            calls,
            vec![(10, 1.0, false), (11, 1.0, false), (12, 1.0, true)]
        );
        assert_eq!(*engine.polls.lock(), 2);
    }

    #[test]
    fn test_first_response_error() {
        let engine = ReplayEngine::new(vec![Ok(vec![Response::error(1, "device lost")])]);
        let mut calls = Vec::new();
        let count = pump(TokenStream::new(engine, 1), &mut calls, |c, t, s, f| {
            c.push((t, s, f))
        });
        assert_eq!(count, 0);
        assert_eq!(calls, vec![(0, 0.0, true)]);
    }

    #[test]
    fn test_error_after_tokens_keeps_partial_count() {
        let engine = ReplayEngine::new(vec![
            Ok(vec![token(5, false), token(6, false)]),
            Ok(vec![Response::error(1, "kv cache exhausted")]),
        ]);
        let mut calls = Vec::new();
        let count = pump(TokenStream::new(engine, 1), &mut calls, |c, t, s, f| {
            c.push((t, s, f))
        });
        assert_eq!(count, 2);
        assert_eq!(calls, vec![(5, 1.0, false), (6, 1.0, false), (0, 0.0, true)]);
    }

    #[test]
    fn test_engine_failure_ends_stream() {
        let engine = ReplayEngine::new(vec![
            Ok(vec![token(5, false)]),
            Err(EngineError::Shutdown),
        ]);
        let mut stream = TokenStream::new(engine, 1);
        assert_matches!(stream.next(), Some(Ok(GeneratedToken { token_id: 5, .. })));
        assert_matches!(
            stream.next(),
            Some(Err(GenerationError::Engine {
                request_id: 1,
                source: EngineError::Shutdown
            }))
        );
        assert_eq!(stream.state(), StreamState::Done);
        assert!(stream.next().is_none());
        assert_eq!(stream.generated(), 1);
    }

    #[test]
    fn test_responses_after_final_are_discarded() {
        let engine = ReplayEngine::new(vec![Ok(vec![
            token(1, false),
            token(2, true),
            token(3, false),
            Response::error(1, "late"),
        ])]);
        let calls = collect(engine.clone());
        assert_eq!(calls, vec![(1, 1.0, false), (2, 1.0, true)]);
        assert_eq!(*engine.polls.lock(), 1);
    }

    #[test]
    fn test_empty_batches_are_polled_again() {
        let engine = ReplayEngine::new(vec![Ok(vec![]), Ok(vec![]), Ok(vec![token(9, true)])]);
        let calls = collect(engine.clone());
        assert_eq!(calls, vec![(9, 1.0, true)]);
        assert_eq!(*engine.polls.lock(), 3);
    }

    #[test]
    fn test_only_first_candidate_is_surfaced_with_log_prob() {
        let response = Response::result(
            1,
            GenerationResult {
                output_token_ids: vec![vec![42, 43], vec![77]],
                log_probs: Some(vec![vec![-0.5, -0.7], vec![-1.5]]),
                is_final: true,
            },
        );
        let engine = ReplayEngine::new(vec![Ok(vec![response])]);
        assert_eq!(collect(engine), vec![(42, -0.5, true)]);
    }

    #[test]
    fn test_result_without_tokens_is_an_error() {
        let response = Response::result(
            1,
            GenerationResult {
                output_token_ids: vec![],
                log_probs: None,
                is_final: false,
            },
        );
        let engine = ReplayEngine::new(vec![Ok(vec![response])]);
        let mut stream = TokenStream::new(engine, 1);
        assert_matches!(stream.next(), Some(Err(GenerationError::Response { .. })));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_spawn_stream_forwards_in_order() {
        let engine = ReplayEngine::new(vec![
            Ok(vec![token(1, false)]),
            Ok(vec![token(2, false)]),
            Ok(vec![token(3, true)]),
        ]);
        let rx = spawn_stream(TokenStream::new(engine, 1), 1).unwrap();
        let tokens: Vec<_> = rx
            .iter()
            .map(|item| item.map(|t| (t.token_id, t.is_final)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tokens, vec![(1, false), (2, false), (3, true)]);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StreamState::Streaming.to_string(), "Streaming");
        assert_eq!(StreamState::Done.to_string(), "Done");
    }
}
