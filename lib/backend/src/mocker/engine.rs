// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! MockEngine - an [`InferenceEngine`] that replays scripted responses.
//!
//! Every enqueued request gets a producer thread that publishes the batches of its
//! [`MockScript`] into a shared response table, optionally pausing between batches. Requests
//! without a script generate `max_new_tokens` counting tokens.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::engine::{
    EngineLauncher, GenerationResult, InferenceEngine, IterationStats, Request, Response,
};
use crate::error::EngineError;
use crate::mocker::protocols::{MockEngineArgs, MockScript, MockStep};
use crate::topology::ExecutionConfig;
use crate::{RequestId, TokenIdType};

/// Offset of the second candidate emitted when top alternatives are requested.
const ALTERNATIVE_TOKEN_OFFSET: TokenIdType = 1000;

#[derive(Default)]
struct RequestSlot {
    pending: VecDeque<Response>,
    finished: bool,
}

struct Shared {
    slots: Mutex<HashMap<RequestId, RequestSlot>>,
    available: Condvar,
    stats: Mutex<VecDeque<IterationStats>>,
    iteration: AtomicU64,
    in_flight: AtomicUsize,
    shutdown: AtomicBool,
    args: MockEngineArgs,
}

impl Shared {
    fn record_iteration(&self) {
        let stats = IterationStats {
            iteration: self.iteration.fetch_add(1, Ordering::SeqCst) + 1,
            num_active_requests: self.in_flight.load(Ordering::SeqCst),
            max_active_requests: self.args.max_in_flight,
        };
        let mut history = self.stats.lock();
        history.push_back(stats);
        while history.len() > self.args.stats_history.max(1) {
            history.pop_front();
        }
    }

    fn publish(&self, request_id: RequestId, responses: Vec<Response>, terminal: bool) {
        // accounted before the final responses become visible to waiters
        if terminal {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.record_iteration();
        }
        {
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.get_mut(&request_id) {
                slot.pending.extend(responses);
                slot.finished |= terminal;
            }
        }
        self.available.notify_all();
    }
}

/// Scripted in-process engine.
pub struct MockEngine {
    shared: Arc<Shared>,
    scripts: Mutex<VecDeque<MockScript>>,
    submitted: Mutex<Vec<(RequestId, Request)>>,
    next_id: AtomicU64,
}

impl MockEngine {
    pub fn new(args: MockEngineArgs) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(HashMap::new()),
                available: Condvar::new(),
                stats: Mutex::new(VecDeque::new()),
                iteration: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
                args,
            }),
            scripts: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Script the responses of the next enqueued request without a script. Scripts are consumed
    /// in the order they were pushed.
    pub fn push_script(&self, script: MockScript) {
        self.scripts.lock().push_back(script);
    }

    /// Requests received so far, in enqueue order.
    pub fn submitted(&self) -> Vec<(RequestId, Request)> {
        self.submitted.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting requests and wake every waiter with [`EngineError::Shutdown`].
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        // hold the lock so no waiter misses the flag between its check and its wait
        let _slots = self.shared.slots.lock();
        self.shared.available.notify_all();
    }

    fn to_response(request_id: RequestId, step: MockStep, alternatives: bool) -> Response {
        let (token, log_prob, is_final) = match step {
            MockStep::Token(token) => (token, None, false),
            MockStep::Scored(token, log_prob) => (token, Some(log_prob), false),
            MockStep::Final(token) => (token, None, true),
            MockStep::Error(message) => return Response::error(request_id, message),
        };

        let mut output_token_ids = vec![vec![token]];
        if alternatives {
            output_token_ids.push(vec![token.wrapping_add(ALTERNATIVE_TOKEN_OFFSET)]);
        }
        Response::result(
            request_id,
            GenerationResult {
                output_token_ids,
                log_probs: log_prob.map(|lp| vec![vec![lp]]),
                is_final,
            },
        )
    }

    fn produce(shared: Arc<Shared>, request_id: RequestId, script: MockScript, alternatives: bool) {
        let delay = Duration::from_millis(shared.args.token_delay_ms);
        for batch in script.batches {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            if shared.shutdown.load(Ordering::SeqCst) {
                tracing::debug!(request_id, "Mock engine shut down, dropping remaining responses");
                return;
            }

            let terminal = batch.iter().any(MockStep::is_terminal);
            let responses = batch
                .into_iter()
                .map(|step| Self::to_response(request_id, step, alternatives))
                .collect();
            shared.publish(request_id, responses, terminal);
            if terminal {
                return;
            }
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new(MockEngineArgs::default())
    }
}

impl InferenceEngine for MockEngine {
    fn enqueue_request(&self, request: Request) -> Result<RequestId, EngineError> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(EngineError::Shutdown);
        }
        if !self.shared.args.ready {
            return Err(EngineError::Internal("engine is not ready".to_string()));
        }

        let capacity = self.shared.args.max_in_flight;
        self.shared
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|in_flight| EngineError::Saturated {
                in_flight,
                capacity,
            })?;

        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockScript::generated(&request));
        let alternatives = request.output.return_top_alternatives;

        self.shared
            .slots
            .lock()
            .insert(request_id, RequestSlot::default());
        self.submitted.lock().push((request_id, request));
        self.shared.record_iteration();

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("mock-engine-{request_id}"))
            .spawn(move || Self::produce(shared, request_id, script, alternatives));

        if let Err(e) = spawned {
            self.shared.slots.lock().remove(&request_id);
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::Internal(format!(
                "failed to spawn producer thread: {e}"
            )));
        }

        tracing::trace!(request_id, "Mock engine accepted request");
        Ok(request_id)
    }

    fn await_responses(&self, request_id: RequestId) -> Result<Vec<Response>, EngineError> {
        let mut slots = self.shared.slots.lock();
        loop {
            // published responses are delivered even after shutdown
            if let Some(slot) = slots.get_mut(&request_id)
                && !slot.pending.is_empty()
            {
                let responses: Vec<Response> = slot.pending.drain(..).collect();
                if slot.finished {
                    slots.remove(&request_id);
                }
                return Ok(responses);
            }
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return Err(EngineError::Shutdown);
            }
            if !slots.contains_key(&request_id) {
                return Err(EngineError::UnknownRequest(request_id));
            }
            self.shared.available.wait(&mut slots);
        }
    }

    fn latest_iteration_stats(&self) -> Vec<IterationStats> {
        self.shared.stats.lock().iter().copied().collect()
    }

    fn can_enqueue_requests(&self) -> bool {
        self.shared.args.ready && !self.shared.shutdown.load(Ordering::SeqCst)
    }
}

/// [`EngineLauncher`] handing out a prepared [`MockEngine`].
pub struct MockLauncher {
    engine: Arc<MockEngine>,
    failure: Option<String>,
    launched: Mutex<Vec<ExecutionConfig>>,
}

impl MockLauncher {
    pub fn new(engine: Arc<MockEngine>) -> Self {
        Self {
            engine,
            failure: None,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// A launcher whose every launch fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            engine: Arc::new(MockEngine::default()),
            failure: Some(reason.into()),
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Arc<MockEngine> {
        &self.engine
    }

    /// Execution configurations of all successful launches.
    pub fn launched(&self) -> Vec<ExecutionConfig> {
        self.launched.lock().clone()
    }
}

impl EngineLauncher for MockLauncher {
    fn launch(
        &self,
        model_dir: &Path,
        config: &ExecutionConfig,
    ) -> Result<Arc<dyn InferenceEngine>, EngineError> {
        if let Some(reason) = &self.failure {
            return Err(EngineError::Launch(reason.clone()));
        }
        tracing::debug!(
            model_dir = %model_dir.display(),
            world_size = config.world_size,
            worker = ?config.mode.worker_path(),
            "Launching mock engine"
        );
        self.launched.lock().push(config.clone());
        Ok(self.engine.clone())
    }
}
