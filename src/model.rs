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

//! Definition of the transit model on which disruptions are applied.

use crate::{
    disruption::{DisruptionHolder, Impact},
    objects::*,
    validity_pattern::ValidityPattern,
    Result,
};
use anyhow::{anyhow, bail};
use chrono::NaiveDate;
use relational_types::{IdxSet, OneToMany, Relation};
use std::{collections::BTreeSet, ops, sync::Arc};
use tracing::debug;
use typed_index_collection::{CollectionWithId, Id, Idx};

/// The set of collections representing the model.
#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct Collections {
    pub networks: CollectionWithId<Network>,
    pub lines: CollectionWithId<Line>,
    pub routes: CollectionWithId<Route>,
    pub stop_areas: CollectionWithId<StopArea>,
    pub stop_points: CollectionWithId<StopPoint>,
    pub vehicle_journeys: CollectionWithId<VehicleJourney>,
    pub meta_vehicle_journeys: CollectionWithId<MetaVehicleJourney>,
}

impl Collections {
    /// Rebuild the vehicle journeys collection so that the `idx` of the
    /// i-th vehicle journey is `i`.
    pub fn reindex_vehicle_journeys(&mut self) -> Result<()> {
        let mut vehicle_journeys = self.vehicle_journeys.take();
        for (idx, vj) in vehicle_journeys.iter_mut().enumerate() {
            vj.idx = idx;
        }
        self.vehicle_journeys = CollectionWithId::new(vehicle_journeys)?;
        Ok(())
    }

    /// Remove vehicle journeys, from the collection and from their meta
    /// vehicle journey.
    pub fn remove_vehicle_journeys(&mut self, vj_ids: &BTreeSet<String>) {
        if vj_ids.is_empty() {
            return;
        }
        debug!("removing {} vehicle journeys", vj_ids.len());
        let meta_ids: BTreeSet<String> = vj_ids
            .iter()
            .filter_map(|id| self.vehicle_journeys.get(id))
            .map(|vj| vj.meta_vj_id.clone())
            .collect();
        for meta_id in meta_ids {
            if let Some(mut meta) = self.meta_vehicle_journeys.get_mut(&meta_id) {
                meta.vehicle_journey_ids.retain(|id| !vj_ids.contains(id));
            }
        }
        self.vehicle_journeys.retain(|vj| !vj_ids.contains(&vj.id));
    }

    /// The variants of a meta vehicle journey, in creation order.
    pub fn variants_of<'a>(
        &'a self,
        meta: &'a MetaVehicleJourney,
    ) -> impl Iterator<Item = &'a VehicleJourney> + 'a {
        meta.vehicle_journey_ids
            .iter()
            .filter_map(move |id| self.vehicle_journeys.get(id))
    }
}

struct Relations {
    networks_to_lines: OneToMany<Network, Line>,
    lines_to_routes: OneToMany<Line, Route>,
    stop_areas_to_stop_points: OneToMany<StopArea, StopPoint>,
}

/// The transit model: the collections, the static relations between the
/// topology objects and the registry of the applied disruptions.
///
/// A model is meant to be cloned before applying a batch of disruptions,
/// the static relations being shared between the clones.
#[derive(Clone)]
pub struct Model {
    pub(crate) collections: Collections,
    beginning_date: NaiveDate,
    relations: Arc<Relations>,
    pub(crate) disruptions: DisruptionHolder,
}

impl Model {
    /// Constructs a model from the given `Collections`, the validity
    /// patterns being anchored on `beginning_date`. Fails in case of
    /// incoherence, as invalid external references.
    ///
    /// Vehicle journeys without meta vehicle journey get their own one,
    /// named after them.
    pub fn new(mut c: Collections, beginning_date: NaiveDate) -> Result<Self> {
        let mut vehicle_journeys = c.vehicle_journeys.take();
        for vj in vehicle_journeys.iter_mut() {
            if !c.routes.contains_id(&vj.route_id) {
                bail!(
                    "route '{}' of vehicle journey '{}' not found",
                    vj.route_id,
                    vj.id
                );
            }
            if vj.base_validity_pattern().beginning_date != beginning_date {
                bail!(
                    "validity pattern of vehicle journey '{}' does not begin on {}",
                    vj.id,
                    beginning_date
                );
            }
            if vj.meta_vj_id.is_empty() {
                vj.meta_vj_id = vj.id.clone();
            }
            let meta_id = vj.meta_vj_id.clone();
            let mut meta = c.meta_vehicle_journeys.get_or_create_with(&meta_id, || {
                MetaVehicleJourney {
                    id: meta_id.clone(),
                    ..Default::default()
                }
            });
            if !meta.vehicle_journey_ids.contains(&vj.id) {
                meta.vehicle_journey_ids.push(vj.id.clone());
            }
        }
        c.vehicle_journeys = CollectionWithId::new(vehicle_journeys)?;
        c.reindex_vehicle_journeys()?;

        let relations = Relations {
            networks_to_lines: OneToMany::new(&c.networks, &c.lines, "networks_to_lines")?,
            lines_to_routes: OneToMany::new(&c.lines, &c.routes, "lines_to_routes")?,
            stop_areas_to_stop_points: OneToMany::new(
                &c.stop_areas,
                &c.stop_points,
                "stop_areas_to_stop_points",
            )?,
        };

        Ok(Model {
            collections: c,
            beginning_date,
            relations: Arc::new(relations),
            disruptions: DisruptionHolder::default(),
        })
    }

    /// Consumes the model, returning its collections.
    pub fn into_collections(self) -> Collections {
        self.collections
    }

    /// Date of the first day of the validity patterns.
    pub fn beginning_date(&self) -> NaiveDate {
        self.beginning_date
    }

    /// A validity pattern of the model without any active day.
    pub fn empty_validity_pattern(&self) -> ValidityPattern {
        ValidityPattern::new(self.beginning_date)
    }

    /// The applied disruptions.
    pub fn disruptions(&self) -> &DisruptionHolder {
        &self.disruptions
    }

    /// Routes of the lines of a network.
    pub fn routes_of_network(&self, network_id: &str) -> Vec<Idx<Route>> {
        let network_idx = match self.networks.get_idx(network_id) {
            Some(idx) => idx,
            None => return Vec::new(),
        };
        let lines = self
            .relations
            .networks_to_lines
            .get_corresponding_forward(&std::iter::once(network_idx).collect());
        self.relations
            .lines_to_routes
            .get_corresponding_forward(&lines)
            .into_iter()
            .collect()
    }

    /// Routes of a line.
    pub fn routes_of_line(&self, line_id: &str) -> Vec<Idx<Route>> {
        match self.lines.get_idx(line_id) {
            Some(line_idx) => self
                .relations
                .lines_to_routes
                .get_corresponding_forward(&std::iter::once(line_idx).collect())
                .into_iter()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Stop points of a stop area.
    pub fn stop_points_of_stop_area(&self, stop_area_id: &str) -> IdxSet<StopPoint> {
        match self.stop_areas.get_idx(stop_area_id) {
            Some(idx) => self
                .relations
                .stop_areas_to_stop_points
                .get_corresponding_forward(&std::iter::once(idx).collect()),
            None => IdxSet::default(),
        }
    }

    /// Stop area of a stop point.
    pub fn stop_area_of(&self, stop_point_idx: Idx<StopPoint>) -> &str {
        &self.stop_points[stop_point_idx].stop_area_id
    }

    /// The vehicle journeys leaving on `date` at `level`, with their stop
    /// times, as consumed by the routing.
    pub fn vehicle_journeys_at(
        &self,
        level: RTLevel,
        date: NaiveDate,
    ) -> impl Iterator<Item = &VehicleJourney> {
        self.vehicle_journeys
            .values()
            .filter(move |vj| vj.is_active(level, date))
    }

    /// Live impacts attached to an object.
    pub fn get_impacts<T: HasImpacts>(&self, object: &T) -> Vec<&Impact> {
        object
            .impacts()
            .iter()
            .filter_map(|handle| self.disruptions.get(*handle))
            .collect()
    }

    /// Impacts of the meta vehicle journey of `vj` concerning at least one
    /// day on which `vj` circulates at its own level.
    pub fn get_vehicle_journey_impacts(&self, vj: &VehicleJourney) -> Vec<&Impact> {
        let meta = match self.meta_vehicle_journeys.get(&vj.meta_vj_id) {
            Some(meta) => meta,
            None => return Vec::new(),
        };
        let vp = vj.validity_pattern_at(vj.realtime_level);
        self.get_impacts(meta)
            .into_iter()
            .filter(|impact| {
                let periods = impact.periods();
                vp.dates().any(|date| match vj.execution_period(date) {
                    Some((first, last)) => periods.iter().any(|p| p.touches(first, last)),
                    None => false,
                })
            })
            .collect()
    }

    /// Drop the dead impact handles attached to the objects.
    pub fn clean_weak_impacts(&mut self) {
        fn clean<T: Id<T> + HasImpacts>(
            collection: &mut CollectionWithId<T>,
            disruptions: &DisruptionHolder,
        ) {
            let dirty: Vec<Idx<T>> = collection
                .iter()
                .filter(|(_, obj)| obj.impacts().iter().any(|h| !disruptions.is_alive(*h)))
                .map(|(idx, _)| idx)
                .collect();
            for idx in dirty {
                collection
                    .index_mut(idx)
                    .impacts_mut()
                    .retain(|h| disruptions.is_alive(*h));
            }
        }
        let c = &mut self.collections;
        clean(&mut c.networks, &self.disruptions);
        clean(&mut c.lines, &self.disruptions);
        clean(&mut c.routes, &self.disruptions);
        clean(&mut c.stop_areas, &self.disruptions);
        clean(&mut c.stop_points, &self.disruptions);
        clean(&mut c.meta_vehicle_journeys, &self.disruptions);
    }

    /// Check that the `idx` of the i-th vehicle journey is `i`, and that
    /// meta vehicle journeys and vehicle journeys reference each other.
    pub fn check_consistency(&self) -> Result<()> {
        for (position, vj) in self.vehicle_journeys.values().enumerate() {
            if vj.idx != position {
                bail!(
                    "vehicle journey '{}' has idx {} at position {}",
                    vj.id,
                    vj.idx,
                    position
                );
            }
            let meta = self
                .meta_vehicle_journeys
                .get(&vj.meta_vj_id)
                .ok_or_else(|| anyhow!("meta vehicle journey of '{}' not found", vj.id))?;
            if !meta.vehicle_journey_ids.contains(&vj.id) {
                bail!("vehicle journey '{}' unknown from its meta", vj.id);
            }
        }
        for meta in self.meta_vehicle_journeys.values() {
            for vj_id in &meta.vehicle_journey_ids {
                if !self.vehicle_journeys.contains_id(vj_id) {
                    bail!("dangling vehicle journey '{}' in '{}'", vj_id, meta.id);
                }
            }
        }
        Ok(())
    }
}

impl ops::Deref for Model {
    type Target = Collections;
    fn deref(&self) -> &Self::Target {
        &self.collections
    }
}
