// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Skywatch drone SDK
//!
//! Fly a patrol drone against a Skywatch tower over any [`MessageBus`].
//!
//! [`MessageBus`]: skywatch_core::domain::MessageBus

pub mod agent;
pub mod client;
pub mod types;

pub use agent::{DroneAgent, Mission};
pub use client::DroneClient;
pub use types::*;
