// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services of the core crate.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Startup-time planning over the sector grid

pub mod tour_planner;

pub use tour_planner::TourPlanner;
