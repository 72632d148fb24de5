// Copyright (C) 2017 Hove and/or its affiliates.
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, version 3.

// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.

// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>

//! The `transit_realtime` crate applies realtime disruptions on a model of
//! scheduled public transit.
//!
//! Disruptions remove stops from vehicle journeys or cancel them on some
//! days, at the adapted or the realtime level. Each modified vehicle
//! journey gets a variant circulating on the impacted days, while the base
//! schedule is kept so that any disruption can be deleted later.

#![deny(missing_docs)]

pub mod apply_disruption;
pub mod configuration;
pub mod delete_disruption;
pub mod disruption;
pub mod meta_vehicle_journey;
pub mod model;
pub mod objects;
pub mod realtime;
pub mod time_periods;
pub mod topology;
pub mod trip_update;
pub mod validity_pattern;

#[doc(hidden)]
#[path = "../model-builder/src/builder.rs"]
pub mod model_builder;

/// The error type used by the crate.
pub type Error = anyhow::Error;

/// The corresponding result type used by the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub use crate::model::Model;
