// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod tower;

pub use tower::{TowerOrchestrator, TowerSettings};
