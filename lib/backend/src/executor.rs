// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The executor handle: one configured inference engine per process.
//!
//! Construction reads the model metadata, derives the [`ExecutionConfig`] and launches the engine.
//! After that the handle is immutable and shared by every submission and stream; the engine is
//! responsible for its own concurrency.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::config::BackendSettings;
use crate::engine::{EngineLauncher, InferenceEngine, IterationStats};
use crate::error::{ConfigError, GenerationError, SubmissionError};
use crate::metadata::EngineConfig;
use crate::request::GenerationParams;
use crate::stream::{self, GeneratedToken, TokenStream};
use crate::topology::{ComputeCapability, derive_execution_config};
use crate::{RequestId, TokenIdType};

/// Handle to a running inference engine.
pub struct Executor {
    engine: Arc<dyn InferenceEngine>,
    version: String,
    world_size: u32,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("version", &self.version)
            .field("world_size", &self.world_size)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Build an executor for the engine artifacts in `model_dir`.
    ///
    /// The metadata document named by `settings.metadata_file` decides the communication mode;
    /// `settings.executor_worker` is only consulted in orchestrator mode.
    pub fn new(
        model_dir: &Path,
        settings: &BackendSettings,
        capability: Option<ComputeCapability>,
        launcher: &dyn EngineLauncher,
    ) -> Result<Self, ConfigError> {
        let metadata = EngineConfig::from_dir(model_dir, &settings.metadata_file)?;
        Self::from_metadata(
            model_dir,
            &metadata,
            settings.executor_worker.as_deref(),
            capability,
            launcher,
        )
    }

    /// Build an executor from already parsed metadata.
    pub fn from_metadata(
        model_dir: &Path,
        metadata: &EngineConfig,
        worker_path: Option<&Path>,
        capability: Option<ComputeCapability>,
        launcher: &dyn EngineLauncher,
    ) -> Result<Self, ConfigError> {
        let execution = derive_execution_config(metadata, capability, worker_path)?;
        let engine = launcher
            .launch(model_dir, &execution)
            .map_err(ConfigError::Engine)?;

        tracing::info!(
            version = %metadata.version,
            world_size = execution.world_size,
            orchestrator = execution.mode.is_orchestrator(),
            chunked_context = execution.chunked_context_enabled,
            "Initialized inference engine version {}",
            metadata.version
        );

        Ok(Self {
            engine,
            version: metadata.version.clone(),
            world_size: execution.world_size,
        })
    }

    /// Wrap an engine that was launched elsewhere.
    pub fn from_engine(engine: Arc<dyn InferenceEngine>, version: impl Into<String>) -> Self {
        Self {
            engine,
            version: version.into(),
            world_size: 1,
        }
    }

    /// Whether the engine accepts new requests. Evaluated on every call.
    pub fn is_ready(&self) -> bool {
        self.engine.can_enqueue_requests()
    }

    /// Engine version read from the model metadata.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Statistics of the most recent engine iterations.
    pub fn iteration_stats(&self) -> Vec<IterationStats> {
        self.engine.latest_iteration_stats()
    }

    /// Validate `params` and enqueue a streaming request.
    ///
    /// Invalid parameters are rejected before the engine is consulted at all. Returns as soon as
    /// the request is queued; generation happens asynchronously inside the engine.
    pub fn submit(&self, params: GenerationParams) -> Result<RequestId, SubmissionError> {
        let request = params.into_request()?;

        if !self.is_ready() {
            return Err(SubmissionError::NotReady);
        }

        if let Some(stats) = self.engine.latest_iteration_stats().last() {
            tracing::debug!(
                iteration = stats.iteration,
                in_flight = stats.num_active_requests,
                max_in_flight = stats.max_active_requests,
                "Enqueueing request"
            );
        }

        let prompt_len = request.input_token_ids.len();
        let request_id = self
            .engine
            .enqueue_request(request)
            .map_err(SubmissionError::Rejected)?;
        tracing::debug!(request_id, prompt_len, "Request enqueued");
        Ok(request_id)
    }

    /// Pull based view of the responses of `request_id`.
    pub fn responses(&self, request_id: RequestId) -> TokenStream {
        TokenStream::new(self.engine.clone(), request_id)
    }

    /// Deliver every token of `request_id` to `callback(context, token_id, score, is_final)`,
    /// blocking until the request is complete. Returns the number of tokens generated.
    ///
    /// Failures are reported in-band as a single `(0, 0.0, true)` callback.
    pub fn stream<C, F>(&self, request_id: RequestId, context: &mut C, callback: F) -> usize
    where
        C: ?Sized,
        F: FnMut(&mut C, TokenIdType, f32, bool),
    {
        stream::pump(self.responses(request_id), context, callback)
    }

    /// Stream `request_id` from a dedicated thread into a channel of `capacity` items.
    pub fn spawn_stream(
        &self,
        request_id: RequestId,
        capacity: usize,
    ) -> std::io::Result<Receiver<Result<GeneratedToken, GenerationError>>> {
        stream::spawn_stream(self.responses(request_id), capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::mocker::{MockEngine, MockEngineArgs, MockLauncher, MockScript};
    use crate::topology::CommunicationMode;
    use assert_matches::assert_matches;

    fn metadata(world_size: u32) -> EngineConfig {
        EngineConfig {
            world_size,
            version: "0.12.0".to_string(),
            architecture: None,
            dtype: None,
        }
    }

    fn executor(engine: Arc<MockEngine>) -> Executor {
        let launcher = MockLauncher::new(engine);
        Executor::from_metadata(Path::new("/models/llama"), &metadata(1), None, None, &launcher)
            .unwrap()
    }

    #[test]
    fn test_submit_and_stream() {
        let engine = Arc::new(MockEngine::default());
        engine.push_script(MockScript::tokens(&[10, 11, 12]));
        let executor = executor(engine.clone());
        assert!(executor.is_ready());
        assert_eq!(executor.version(), "0.12.0");

        let id = executor
            .submit(GenerationParams::new(vec![1, 2, 3], 3))
            .unwrap();
        let mut tokens = Vec::new();
        let count = executor.stream(id, &mut tokens, |tokens, t, _, f| tokens.push((t, f)));

        assert_eq!(count, 3);
        assert_eq!(tokens, vec![(10, false), (11, false), (12, true)]);
        assert_eq!(engine.submitted().len(), 1);
    }

    #[test]
    fn test_invalid_params_never_reach_engine() {
        let engine = Arc::new(MockEngine::default());
        let executor = executor(engine.clone());
        assert_eq!(
            executor.submit(GenerationParams::new(vec![1], 0)),
            Err(SubmissionError::MaxNewTokens(0))
        );
        assert!(engine.submitted().is_empty());
    }

    #[test]
    fn test_not_ready_engine() {
        let engine = Arc::new(MockEngine::new(
            MockEngineArgs::builder().ready(false).build().unwrap(),
        ));
        let executor = executor(engine.clone());
        assert!(!executor.is_ready());
        assert_eq!(
            executor.submit(GenerationParams::new(vec![1], 1)),
            Err(SubmissionError::NotReady)
        );
        assert!(engine.submitted().is_empty());
    }

    #[test]
    fn test_engine_rejection() {
        let engine = Arc::new(MockEngine::new(
            MockEngineArgs::builder()
                .max_in_flight(1)
                .token_delay_ms(50)
                .build()
                .unwrap(),
        ));
        let executor = executor(engine);
        let first = executor.submit(GenerationParams::new(vec![1], 1)).unwrap();
        assert_matches!(
            executor.submit(GenerationParams::new(vec![1], 1)),
            Err(SubmissionError::Rejected(EngineError::Saturated { .. }))
        );
        assert_eq!(executor.stream(first, &mut (), |_, _, _, _| {}), 1);
    }

    #[test]
    fn test_orchestrator_config_reaches_launcher() {
        let launcher = MockLauncher::new(Arc::new(MockEngine::default()));
        let executor = Executor::from_metadata(
            Path::new("/models/llama"),
            &metadata(4),
            Some(Path::new("/opt/worker")),
            Some(ComputeCapability::new(9, 0)),
            &launcher,
        )
        .unwrap();
        assert_eq!(executor.world_size(), 4);

        let launched = launcher.launched();
        assert_eq!(launched.len(), 1);
        assert_eq!(
            launched[0].mode,
            CommunicationMode::Orchestrator {
                worker_path: "/opt/worker".into()
            }
        );
        assert!(launched[0].chunked_context_enabled);
    }

    #[test]
    fn test_launch_failure() {
        let launcher = MockLauncher::failing("out of device memory");
        let err = Executor::from_metadata(Path::new("/m"), &metadata(1), None, None, &launcher)
            .unwrap_err();
        assert_matches!(err, ConfigError::Engine(EngineError::Launch(_)));
    }
}
