// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tower Domain Layer
//!
//! Pure bookkeeping for the tower. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`fleet`] | `FleetRegistry`, `Registration`, `Substitution`, `ReliefOutcome` |

pub mod fleet;

pub use fleet::*;
