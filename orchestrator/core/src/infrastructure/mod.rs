// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod message_bus;
pub mod route_solver;

pub use message_bus::InMemoryMessageBus;
pub use route_solver::NearestNeighbourSolver;
