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

//! Provides an easy way to create a `crate::Model`
//!
//! ```
//! # use transit_realtime::model_builder::ModelBuilder;
//! # fn main() {
//!  let model = ModelBuilder::default()
//!      .vj("toto", |vj| {
//!          vj.route("1")
//!            .st("A", "10:00:00", "10:01:00")
//!            .st("B", "11:00:00", "11:01:00");
//!      })
//!      .vj("tata", |vj| {
//!          vj.validity("0110")
//!            .st("A", "10:00:00", "10:01:00")
//!            .st("D", "11:00:00", "11:01:00");
//!      })
//!      .build();
//! # }
//! ```

use crate::model::{Collections, Model};
use crate::objects::{Line, Network, Route, StopArea, StopPoint, StopTime, Time, VehicleJourney};
use crate::validity_pattern::{Days, ValidityPattern};
use chrono::NaiveDate;
use typed_index_collection::Idx;

/// Network of the lines created on the fly
pub const DEFAULT_NETWORK: &str = "default_network";
/// Line of the routes created on the fly
pub const DEFAULT_LINE: &str = "default_line";
/// Route of the vehicle journeys without explicit route
pub const DEFAULT_ROUTE: &str = "default_route";
/// Validity of the vehicle journeys without explicit validity: one week
pub const DEFAULT_VALIDITY: &str = "1111111";

/// Builder used to easily create a `Model`
pub struct ModelBuilder {
    collections: Collections,
    beginning_date: NaiveDate,
}

/// Builder used to create and modify a new VehicleJourney
pub struct VehicleJourneyBuilder<'a> {
    model: &'a mut ModelBuilder,
    vj_idx: Idx<VehicleJourney>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        ModelBuilder::new("2020-01-01")
    }
}

impl<'a> ModelBuilder {
    /// Builder of a model whose validity patterns begin on `beginning_date`
    /// (format `YYYY-MM-DD`).
    pub fn new(beginning_date: &str) -> Self {
        ModelBuilder {
            collections: Collections::default(),
            beginning_date: beginning_date.parse().expect("invalid beginning date"),
        }
    }

    /// Add a new VehicleJourney to the model
    pub fn vj<F>(mut self, name: &str, mut vj_initer: F) -> Self
    where
        F: FnMut(VehicleJourneyBuilder),
    {
        let validity = ValidityPattern::with_days(
            self.beginning_date,
            DEFAULT_VALIDITY.parse().expect("invalid validity"),
        );
        let new_vj = VehicleJourney::new(name, DEFAULT_ROUTE, validity);
        let vj_idx = self
            .collections
            .vehicle_journeys
            .push(new_vj)
            .unwrap_or_else(|_| panic!("vj {} already exists", name));
        let vj_builder = VehicleJourneyBuilder {
            model: &mut self,
            vj_idx,
        };

        vj_initer(vj_builder);
        self
    }

    /// Add a new Route to the model
    ///
    /// ```
    /// # use transit_realtime::model_builder::ModelBuilder;
    /// # fn main() {
    /// let model = ModelBuilder::default()
    ///      .route("l1", |r| {
    ///             r.line_id = "line:1".to_owned();
    ///         })
    ///      .vj("toto", |vj| {
    ///          vj.route("l1")
    ///            .st("A", "10:00:00", "10:01:00")
    ///            .st("B", "11:00:00", "11:01:00");
    ///      })
    ///      .build();
    /// # }
    /// ```
    pub fn route<F>(mut self, id: &str, mut route_initer: F) -> Self
    where
        F: FnMut(&mut Route),
    {
        self.collections.routes.get_or_create_with(id, || {
            let mut r = Route {
                id: id.to_owned(),
                line_id: DEFAULT_LINE.to_owned(),
                ..Default::default()
            };
            route_initer(&mut r);
            r
        });
        self
    }

    /// Add a new Line to the model
    pub fn line<F>(mut self, id: &str, mut line_initer: F) -> Self
    where
        F: FnMut(&mut Line),
    {
        self.collections.lines.get_or_create_with(id, || {
            let mut l = Line {
                id: id.to_owned(),
                network_id: DEFAULT_NETWORK.to_owned(),
                ..Default::default()
            };
            line_initer(&mut l);
            l
        });
        self
    }

    /// Consume the builder to create a model, creating the missing routes,
    /// lines and networks.
    pub fn build(mut self) -> Model {
        let c = &mut self.collections;
        let route_ids: Vec<String> = c
            .vehicle_journeys
            .values()
            .map(|vj| vj.route_id.clone())
            .collect();
        for route_id in route_ids {
            c.routes.get_or_create_with(&route_id, || Route {
                id: route_id.clone(),
                line_id: DEFAULT_LINE.to_owned(),
                ..Default::default()
            });
        }
        let line_ids: Vec<String> = c.routes.values().map(|r| r.line_id.clone()).collect();
        for line_id in line_ids {
            c.lines.get_or_create_with(&line_id, || Line {
                id: line_id.clone(),
                network_id: DEFAULT_NETWORK.to_owned(),
                ..Default::default()
            });
        }
        let network_ids: Vec<String> = c.lines.values().map(|l| l.network_id.clone()).collect();
        for network_id in network_ids {
            c.networks.get_or_create_with(&network_id, || Network {
                id: network_id.clone(),
                ..Default::default()
            });
        }
        Model::new(self.collections, self.beginning_date).unwrap()
    }
}

/// Anything usable as a stop time in the builder
pub trait IntoTime {
    #[allow(missing_docs)]
    fn into_time(self) -> Time;
}

impl IntoTime for Time {
    fn into_time(self) -> Time {
        self
    }
}

impl IntoTime for &str {
    // Note: if the string is not in the right format, this conversion will fail
    fn into_time(self) -> Time {
        self.parse().unwrap()
    }
}

impl<'a> VehicleJourneyBuilder<'a> {
    fn find_or_create_sp(&mut self, sp: &str, sa: Option<&str>) -> Idx<StopPoint> {
        if let Some(idx) = self.model.collections.stop_points.get_idx(sp) {
            return idx;
        }
        let sa_id = sa
            .map(str::to_owned)
            .unwrap_or_else(|| format!("sa:{}", sp));
        self.model
            .collections
            .stop_areas
            .get_or_create_with(&sa_id, || StopArea {
                id: sa_id.clone(),
                name: sa_id.clone(),
                ..Default::default()
            });
        let new_sp = StopPoint {
            id: sp.to_owned(),
            name: sp.to_owned(),
            stop_area_id: sa_id,
            ..Default::default()
        };
        self.model
            .collections
            .stop_points
            .push(new_sp)
            .unwrap_or_else(|_| panic!("stoppoint {} already exists", sp))
    }

    /// Set the route of the vehicle journey
    pub fn route(self, id: &str) -> Self {
        self.model
            .collections
            .vehicle_journeys
            .index_mut(self.vj_idx)
            .route_id = id.to_owned();
        self
    }

    /// Set the validity of the vehicle journey, day 0 first (e.g. `"0110"`)
    pub fn validity(self, days: &str) -> Self {
        let days: Days = days.parse().expect("invalid validity");
        let vp = ValidityPattern::with_days(self.model.beginning_date, days);
        {
            let mut vj = self
                .model
                .collections
                .vehicle_journeys
                .index_mut(self.vj_idx);
            let mut new_vj = VehicleJourney::new(&vj.id, &vj.route_id, vp);
            new_vj.meta_vj_id = vj.meta_vj_id.clone();
            new_vj.stop_times = std::mem::take(&mut vj.stop_times);
            *vj = new_vj;
        }
        self
    }

    /// Set the meta vehicle journey of the vehicle journey
    pub fn meta(self, id: &str) -> Self {
        self.model
            .collections
            .vehicle_journeys
            .index_mut(self.vj_idx)
            .meta_vj_id = id.to_owned();
        self
    }

    /// Add a stop time on a stop point named `name`, in the stop area `sa:<name>`
    pub fn st(self, name: &str, arrival: impl IntoTime, departure: impl IntoTime) -> Self {
        self.st_in(name, None, arrival, departure)
    }

    /// Add a stop time on a stop point in the given stop area
    pub fn st_sa(
        self,
        name: &str,
        stop_area: &str,
        arrival: impl IntoTime,
        departure: impl IntoTime,
    ) -> Self {
        self.st_in(name, Some(stop_area), arrival, departure)
    }

    fn st_in(
        mut self,
        name: &str,
        stop_area: Option<&str>,
        arrival: impl IntoTime,
        departure: impl IntoTime,
    ) -> Self {
        let stop_point_idx = self.find_or_create_sp(name, stop_area);
        {
            let mut vj = self
                .model
                .collections
                .vehicle_journeys
                .index_mut(self.vj_idx);
            let sequence = vj.stop_times.len() as u32;
            vj.stop_times.push(StopTime::new(
                stop_point_idx,
                sequence,
                arrival.into_time(),
                departure.into_time(),
            ));
        }

        self
    }
}
