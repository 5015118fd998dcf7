// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `skywatch-swarm` - Tower Coordination Crate
//!
//! Owns the tower side of the fleet protocol: drone registration, sector
//! ownership, liveness, relief substitution and the synchronized `START`.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `FleetRegistry`, registration and relief outcomes |
//! | [`application`] | Application | `TowerOrchestrator` and its three duties |
//!
//! ## Key Concepts
//!
//! - **Active / Waiting pools**: drones owning a sector versus drones without one.
//!   Every registered drone is in exactly one of them until it is released.
//! - **Relief**: a drone near the end of its patrol asks for relief; the tower
//!   hands its sector to a `Ready` drone and tells the old owner once the
//!   successor is `Monitoring`.
//! - **Pending relief**: a sector with no `Ready` candidate, retried with
//!   exponential backoff on every liveness pass.

pub mod application;
pub mod domain;

pub use application::*;
pub use domain::*;
