// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod engine;
pub mod protocols;

pub use engine::{MockEngine, MockLauncher};
pub use protocols::{MockEngineArgs, MockScript, MockStep};
