// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! One-time device and plugin initialization.
//!
//! The driver and plugin bindings are reached through [`DeviceRuntime`]. Initialization runs at
//! most once per [`Bootstrapper`]; the process-wide [`bootstrap`] uses a static instance, so any
//! call after the first is a no-op that returns the report of the first run.
//!
//! Failures never abort startup. They are logged and recorded in the [`BootstrapReport`], and
//! the backend continues without the capability dependent optimizations.

use once_cell::sync::OnceCell;

use crate::error::BootstrapError;
use crate::topology::ComputeCapability;

/// Driver and plugin bindings of the host.
pub trait DeviceRuntime: Send + Sync {
    /// Initialize the device driver.
    fn initialize(&self) -> Result<(), BootstrapError>;

    /// Register the engine plugins with the driver.
    fn register_plugins(&self) -> Result<(), BootstrapError>;

    /// Query the compute capability of the device at `device`.
    fn compute_capability(&self, device: u32) -> Result<ComputeCapability, BootstrapError>;
}

/// Outcome of the one-time initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub driver_initialized: bool,
    pub plugins_registered: bool,
    pub errors: Vec<BootstrapError>,
}

impl BootstrapReport {
    /// True when some step failed and the backend runs with reduced capabilities.
    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Runs [`DeviceRuntime`] initialization at most once.
#[derive(Debug, Default)]
pub struct Bootstrapper {
    report: OnceCell<BootstrapReport>,
}

impl Bootstrapper {
    pub const fn new() -> Self {
        Self {
            report: OnceCell::new(),
        }
    }

    /// Initialize the driver and register plugins on the first call; later calls return the
    /// cached report without touching `runtime`.
    pub fn run(&self, runtime: &dyn DeviceRuntime) -> &BootstrapReport {
        self.report.get_or_init(|| {
            tracing::info!("Initializing backend runtime");
            let mut report = BootstrapReport::default();

            match runtime.initialize() {
                Ok(()) => report.driver_initialized = true,
                Err(e) => {
                    tracing::warn!(error = %e, "Device driver unavailable, continuing in reduced capability mode");
                    report.errors.push(e);
                }
            }

            match runtime.register_plugins() {
                Ok(()) => report.plugins_registered = true,
                Err(e) => {
                    tracing::warn!(error = %e, "Engine plugin registration failed");
                    report.errors.push(e);
                }
            }

            if report.is_degraded() {
                tracing::warn!(
                    failures = report.errors.len(),
                    "Backend runtime initialized with reduced capabilities"
                );
            } else {
                tracing::info!("Backend runtime initialized");
            }
            report
        })
    }

    /// The report of the first run, if any.
    pub fn report(&self) -> Option<&BootstrapReport> {
        self.report.get()
    }
}

static BOOTSTRAPPER: Bootstrapper = Bootstrapper::new();

/// Process-wide initialization. Only the first call in a process has any effect.
pub fn bootstrap(runtime: &dyn DeviceRuntime) -> &'static BootstrapReport {
    BOOTSTRAPPER.run(runtime)
}

/// Compute capability of `device`, or `None` when it cannot be determined.
///
/// Detection failure only disables optional engine features, so it is never an error here.
pub fn detect_compute_capability(
    runtime: &dyn DeviceRuntime,
    report: &BootstrapReport,
    device: u32,
) -> Option<ComputeCapability> {
    if !report.driver_initialized {
        tracing::debug!(device, "Skipping compute capability detection, driver not initialized");
        return None;
    }

    match runtime.compute_capability(device) {
        Ok(capability) => {
            tracing::info!(device, "Detected {capability} compute capabilities");
            Some(capability)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Compute capability detection failed");
            None
        }
    }
}

/// A [`DeviceRuntime`] with a fixed device inventory.
///
/// Used where no driver binding is linked into the process.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceRuntime {
    devices: Vec<ComputeCapability>,
    driver_error: Option<String>,
}

impl StaticDeviceRuntime {
    pub fn new(devices: Vec<ComputeCapability>) -> Self {
        Self {
            devices,
            driver_error: None,
        }
    }

    /// A host without any device.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A host whose driver fails to initialize.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            devices: Vec::new(),
            driver_error: Some(reason.into()),
        }
    }
}

impl DeviceRuntime for StaticDeviceRuntime {
    fn initialize(&self) -> Result<(), BootstrapError> {
        match &self.driver_error {
            Some(reason) => Err(BootstrapError::DriverInit(reason.clone())),
            None => Ok(()),
        }
    }

    fn register_plugins(&self) -> Result<(), BootstrapError> {
        Ok(())
    }

    fn compute_capability(&self, device: u32) -> Result<ComputeCapability, BootstrapError> {
        self.devices
            .get(device as usize)
            .copied()
            .ok_or(BootstrapError::NoDevice(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRuntime {
        initialized: AtomicUsize,
        registered: AtomicUsize,
    }

    impl DeviceRuntime for CountingRuntime {
        fn initialize(&self) -> Result<(), BootstrapError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn register_plugins(&self) -> Result<(), BootstrapError> {
            self.registered.fetch_add(1, Ordering::SeqCst);
            Err(BootstrapError::PluginRegistration("missing library".into()))
        }

        fn compute_capability(&self, _device: u32) -> Result<ComputeCapability, BootstrapError> {
            Ok(ComputeCapability::new(9, 0))
        }
    }

    #[test]
    fn test_bootstrapper_runs_once() {
        let runtime = CountingRuntime::default();
        let bootstrapper = Bootstrapper::new();
        assert!(bootstrapper.report().is_none());

        let first = bootstrapper.run(&runtime).clone();
        let second = bootstrapper.run(&runtime).clone();

        assert_eq!(first, second);
        assert_eq!(runtime.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.registered.load(Ordering::SeqCst), 1);
        assert!(first.driver_initialized);
        assert!(!first.plugins_registered);
        assert!(first.is_degraded());
    }

    #[test]
    fn test_driver_failure_is_not_fatal() {
        let runtime = StaticDeviceRuntime::failing("no driver");
        let report = Bootstrapper::new().run(&runtime).clone();
        assert!(!report.driver_initialized);
        assert!(report.plugins_registered);
        assert_eq!(
            report.errors,
            vec![BootstrapError::DriverInit("no driver".into())]
        );
        assert_eq!(detect_compute_capability(&runtime, &report, 0), None);
    }

    #[test]
    fn test_detect_compute_capability() {
        let runtime = StaticDeviceRuntime::new(vec![ComputeCapability::new(8, 6)]);
        let report = Bootstrapper::new().run(&runtime).clone();
        assert_eq!(
            detect_compute_capability(&runtime, &report, 0),
            Some(ComputeCapability::new(8, 6))
        );
        assert_eq!(detect_compute_capability(&runtime, &report, 1), None);
    }

    #[test]
    fn test_process_wide_bootstrap_is_cached() {
        let first = bootstrap(&StaticDeviceRuntime::empty());
        let second = bootstrap(&StaticDeviceRuntime::failing("ignored"));
        assert!(std::ptr::eq(first, second));
    }
}
