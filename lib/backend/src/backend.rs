// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process level entry point.
//!
//! [`Backend::start`] performs the one-time runtime bootstrap, loads the settings and builds the
//! [`Executor`]. A failed construction does not abort the host: it is logged, kept as
//! [`Backend::failure`], and the backend reports itself as not ready.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::bootstrap::{self, BootstrapReport, DeviceRuntime, detect_compute_capability};
use crate::config::BackendSettings;
use crate::engine::EngineLauncher;
use crate::error::{ConfigError, GenerationError, SubmissionError};
use crate::executor::Executor;
use crate::logging;
use crate::request::GenerationParams;
use crate::stream::{ERROR_SENTINEL_SCORE, ERROR_SENTINEL_TOKEN, GeneratedToken};
use crate::{RequestId, TokenIdType};

#[derive(Debug)]
pub struct Backend {
    executor: Result<Arc<Executor>, ConfigError>,
    settings: BackendSettings,
    bootstrap: BootstrapReport,
}

impl Backend {
    /// Initialize logging, bootstrap the device runtime, load the settings and build the executor
    /// for `model_dir`.
    ///
    /// Settings come from the environment and `EXECUTOR_CONFIG_PATH`; `executor_worker`, when
    /// given, overrides the configured worker executable.
    pub fn start(
        model_dir: impl AsRef<Path>,
        executor_worker: Option<PathBuf>,
        runtime: &dyn DeviceRuntime,
        launcher: &dyn EngineLauncher,
    ) -> Self {
        logging::init();
        let report = bootstrap::bootstrap(runtime).clone();

        let mut settings = match BackendSettings::from_settings() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load backend settings");
                return Self {
                    executor: Err(e),
                    settings: BackendSettings::default(),
                    bootstrap: report,
                };
            }
        };
        if executor_worker.is_some() {
            settings.executor_worker = executor_worker;
        }

        Self::with_settings(model_dir.as_ref(), settings, report, runtime, launcher)
    }

    /// Build the executor from explicit settings and an existing bootstrap report.
    pub fn with_settings(
        model_dir: &Path,
        settings: BackendSettings,
        bootstrap: BootstrapReport,
        runtime: &dyn DeviceRuntime,
        launcher: &dyn EngineLauncher,
    ) -> Self {
        tracing::debug!(model_dir = %model_dir.display(), %settings, "Starting backend");
        let capability = match settings.compute_capability {
            Some(capability) => {
                tracing::info!("Using configured {capability} compute capabilities");
                Some(capability)
            }
            None => detect_compute_capability(runtime, &bootstrap, settings.device_index),
        };

        let executor = Executor::new(model_dir, &settings, capability, launcher)
            .map(Arc::new)
            .inspect_err(|e| {
                tracing::error!(
                    model_dir = %model_dir.display(),
                    error = %e,
                    "Failed to initialize executor"
                )
            });

        Self {
            executor,
            settings,
            bootstrap,
        }
    }

    /// True once the executor exists and its engine accepts requests.
    pub fn is_ready(&self) -> bool {
        self.executor.as_ref().is_ok_and(|executor| executor.is_ready())
    }

    pub fn executor(&self) -> Option<&Arc<Executor>> {
        self.executor.as_ref().ok()
    }

    /// Why the executor could not be built.
    pub fn failure(&self) -> Option<&ConfigError> {
        self.executor.as_ref().err()
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    pub fn bootstrap_report(&self) -> &BootstrapReport {
        &self.bootstrap
    }

    pub fn submit(&self, params: GenerationParams) -> Result<RequestId, SubmissionError> {
        match &self.executor {
            Ok(executor) => executor.submit(params),
            Err(_) => Err(SubmissionError::NotReady),
        }
    }

    /// See [`Executor::stream`]. Without an executor the callback receives the error sentinel
    /// once and 0 is returned.
    pub fn stream<C, F>(&self, request_id: RequestId, context: &mut C, mut callback: F) -> usize
    where
        C: ?Sized,
        F: FnMut(&mut C, TokenIdType, f32, bool),
    {
        match &self.executor {
            Ok(executor) => executor.stream(request_id, context, callback),
            Err(e) => {
                tracing::warn!(request_id, error = %e, "Streaming requested without an executor");
                callback(context, ERROR_SENTINEL_TOKEN, ERROR_SENTINEL_SCORE, true);
                0
            }
        }
    }

    /// Stream `request_id` into a channel sized by the `stream_buffer` setting.
    pub fn spawn_stream(
        &self,
        request_id: RequestId,
    ) -> std::io::Result<Receiver<Result<GeneratedToken, GenerationError>>> {
        match &self.executor {
            Ok(executor) => executor.spawn_stream(request_id, self.settings.stream_buffer),
            Err(e) => Err(std::io::Error::other(format!("backend is not initialized: {e}"))),
        }
    }
}
