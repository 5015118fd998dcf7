// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Skywatch Core
//!
//! Sector partitioning, drone domain model, wire protocol and the message bus
//! contract shared by the tower (`skywatch-swarm`) and the drone agents
//! (`skywatch-drone`).
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain types, infrastructure adapters and tour planning

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
