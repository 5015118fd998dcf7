// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types shared by the tower and the drones. Only [`bus`] touches async.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`geometry`] | `Position` |
//! | [`grid`] | `SectorGrid`, `Sector`, `Cell`, `GridSpec` |
//! | [`drone`] | `DroneId`, `DroneState`, `FlightProfile` |
//! | [`battery`] | `BatteryModel` |
//! | [`time_scale`] | `TimeScale` |
//! | [`messages`] | wire messages and channel names |
//! | [`bus`] | `MessageBus`, `Subscription`, `BusError` |
//! | [`route`] | `RouteSolver` |
//! | [`config`] | `FleetConfigManifest` |

pub mod battery;
pub mod bus;
pub mod config;
pub mod drone;
pub mod geometry;
pub mod grid;
pub mod messages;
pub mod route;
pub mod time_scale;

pub use battery::{BatteryModel, MAX_BATTERY};
pub use bus::{BusError, LogEntry, MessageBus, Subscription};
pub use drone::{DroneId, DroneState, FlightProfile};
pub use geometry::Position;
pub use grid::{Cell, GridError, GridSpec, Region, Sector, SectorGrid, SectorId};
pub use messages::{ProtocolError, SectorAssignment, StatusMessage};
pub use route::{path_length, RouteError, RouteSolver};
pub use time_scale::TimeScale;
