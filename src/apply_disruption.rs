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

//! Application of disruptions on a model.
//!
//! ```
//! # use transit_realtime::model_builder::ModelBuilder;
//! # use transit_realtime::apply_disruption::apply_disruption;
//! # use transit_realtime::disruption::*;
//! # use transit_realtime::objects::RTLevel;
//! # use transit_realtime::time_periods::TimePeriod;
//! # fn main() -> transit_realtime::Result<()> {
//! let mut model = ModelBuilder::default()
//!     .vj("vj:1", |vj| {
//!         vj.st("A", "08:00:00", "08:00:00")
//!             .st("B", "08:15:00", "08:15:00")
//!             .st("C", "08:45:00", "08:45:00");
//!     })
//!     .build();
//! let period = TimePeriod::new(
//!     "2020-01-01T00:00:00".parse()?,
//!     "2020-01-08T00:00:00".parse()?,
//! )?;
//! let impact = Impact {
//!     uri: "impact".to_owned(),
//!     disruption_uri: String::new(),
//!     severity: Severity {
//!         effect: Effect::ReducedService,
//!         ..Default::default()
//!     },
//!     application_periods: vec![period],
//!     application_patterns: vec![],
//!     informed_entities: vec![Informed::StopArea("sa:B".to_owned())],
//!     aux_info: None,
//! };
//! let disruption = Disruption::new("d", "contributor", RTLevel::Adapted, period, vec![impact])?;
//! apply_disruption(&mut model, disruption)?;
//! assert_eq!(2, model.vehicle_journeys.len());
//! # Ok(())
//! # }
//! ```

use crate::delete_disruption::delete_disruption;
use crate::disruption::{Disruption, Impact, ImpactHandle, Informed};
use crate::meta_vehicle_journey::{
    base_vehicle_journeys, cancel, clean_up_useless_vjs, create_variant, to_base_frame,
};
use crate::model::{Collections, Model};
use crate::objects::{
    HasImpacts, RTLevel, Route, StopPoint, StopTime, Time, VehicleJourney,
};
use crate::time_periods::TimePeriod;
use crate::topology::{self, Matched};
use crate::trip_update;
use crate::validity_pattern::{Days, ValidityPattern, NB_DAYS};
use crate::Result;
use anyhow::{anyhow, bail};
use chrono::{Duration, NaiveDate};
use skip_error::skip_error_and_warn;
use std::collections::BTreeSet;
use tracing::{debug, info};
use typed_index_collection::{CollectionWithId, Id, Idx};

/// Apply a disruption on the model. A disruption with the same uri already
/// applied is deleted first.
pub fn apply_disruption(model: &mut Model, disruption: Disruption) -> Result<()> {
    if disruption.rt_level == RTLevel::Base {
        bail!(
            "disruption '{}' cannot modify the base schedule",
            disruption.uri
        );
    }
    let uri = disruption.uri.clone();
    debug!("applying disruption '{}'", uri);
    if model.disruptions.contains(&uri) {
        delete_disruption(model, &uri)?;
    }
    let handles = model.disruptions.insert(disruption);
    for handle in handles {
        skip_error_and_warn!(apply_impact(model, handle, None));
    }
    model.collections.reindex_vehicle_journeys()?;
    debug!("disruption '{}' applied", uri);
    Ok(())
}

/// Apply one impact of a disruption already stored in the model. With
/// `only_meta`, the impact is applied on this meta vehicle journey only and
/// the informed objects are not updated.
///
/// The vehicle journeys collection is not reindexed.
pub(crate) fn apply_impact(
    model: &mut Model,
    handle: ImpactHandle,
    only_meta: Option<&str>,
) -> Result<()> {
    let impact = model
        .disruptions
        .get(handle)
        .cloned()
        .ok_or_else(|| anyhow!("impact {:?} not found", handle))?;
    let level = model
        .disruptions
        .get_owner(handle)
        .map(|disruption| disruption.rt_level)
        .ok_or_else(|| anyhow!("disruption of impact '{}' not found", impact.uri))?;

    if only_meta.is_none() {
        record_on_informed_objects(model, handle, &impact);
    }

    if let Some(aux_info) = &impact.aux_info {
        for informed in &impact.informed_entities {
            if let Informed::MetaVehicleJourney(meta_id) = informed {
                if only_meta.map(|id| id == meta_id).unwrap_or(true) {
                    trip_update::apply_on_meta(model, handle, &impact, level, meta_id, aux_info)?;
                }
            }
        }
        return Ok(());
    }

    let meta_ids = match only_meta {
        Some(meta_id) => std::iter::once(meta_id.to_owned()).collect(),
        None => candidate_metas(model, &impact),
    };
    if meta_ids.is_empty() {
        info!(
            "impact '{}' of disruption '{}' concerns no vehicle journey",
            impact.uri, impact.disruption_uri
        );
    }
    for meta_id in meta_ids {
        skip_error_and_warn!(apply_impact_on_meta(
            model, handle, &impact, level, &meta_id
        ));
    }
    Ok(())
}

fn attach<T: Id<T> + HasImpacts>(
    collection: &mut CollectionWithId<T>,
    id: &str,
    handle: ImpactHandle,
) {
    match collection.get_mut(id) {
        Some(mut object) => object.push_unique_impact(handle),
        None => info!("object '{}' informed by an impact not found", id),
    }
}

fn record_on_informed_objects(model: &mut Model, handle: ImpactHandle, impact: &Impact) {
    let c = &mut model.collections;
    for informed in &impact.informed_entities {
        match informed {
            Informed::Network(id) => attach(&mut c.networks, id, handle),
            Informed::Line(id) => attach(&mut c.lines, id, handle),
            Informed::Route(id) => attach(&mut c.routes, id, handle),
            Informed::StopArea(id) => attach(&mut c.stop_areas, id, handle),
            Informed::StopPoint(id) => attach(&mut c.stop_points, id, handle),
            Informed::LineSection(section) => {
                attach(&mut c.lines, &section.line_id, handle);
                attach(&mut c.stop_areas, &section.start_stop_area_id, handle);
                attach(&mut c.stop_areas, &section.end_stop_area_id, handle);
            }
            Informed::RailSection(section) => {
                attach(&mut c.lines, &section.line_id, handle);
                attach(&mut c.stop_areas, &section.start_stop_area_id, handle);
                attach(&mut c.stop_areas, &section.end_stop_area_id, handle);
                for blocked in &section.blocked_stop_areas {
                    attach(&mut c.stop_areas, &blocked.id, handle);
                }
            }
            // recorded on the meta vehicle journey when applied
            Informed::MetaVehicleJourney(_) => {}
            Informed::Unknown => info!("impact '{}' informs an unknown object", impact.uri),
        }
    }
}

/// The stops visited by the matched runs get the impact, with their stop
/// area.
fn record_on_touched_stops(
    c: &mut Collections,
    handle: ImpactHandle,
    stop_points: &BTreeSet<Idx<StopPoint>>,
) {
    let mut stop_area_ids = BTreeSet::new();
    for stop_point_idx in stop_points {
        let mut stop_point = c.stop_points.index_mut(*stop_point_idx);
        stop_point.push_unique_impact(handle);
        stop_area_ids.insert(stop_point.stop_area_id.clone());
    }
    for stop_area_id in stop_area_ids {
        attach(&mut c.stop_areas, &stop_area_id, handle);
    }
}

fn route_ids_of(model: &Model, routes: Vec<Idx<Route>>) -> Vec<&str> {
    routes
        .into_iter()
        .map(|route_idx| model.routes[route_idx].id.as_str())
        .collect()
}

/// Meta vehicle journeys possibly concerned by an impact.
fn candidate_metas(model: &Model, impact: &Impact) -> BTreeSet<String> {
    let route_names = |routes: Vec<Idx<Route>>| route_ids_of(model, routes);
    let mut route_ids: BTreeSet<&str> = BTreeSet::new();
    let mut all_routes = false;
    let mut meta_ids = BTreeSet::new();
    for informed in &impact.informed_entities {
        match informed {
            Informed::Network(id) => route_ids.extend(route_names(model.routes_of_network(id))),
            Informed::Line(id) => route_ids.extend(route_names(model.routes_of_line(id))),
            Informed::LineSection(section) => {
                route_ids.extend(route_names(model.routes_of_line(&section.line_id)))
            }
            Informed::RailSection(section) => {
                route_ids.extend(route_names(model.routes_of_line(&section.line_id)))
            }
            Informed::Route(id) => {
                route_ids.insert(id.as_str());
            }
            Informed::StopPoint(_) | Informed::StopArea(_) => all_routes = true,
            Informed::MetaVehicleJourney(id) => {
                if model.meta_vehicle_journeys.contains_id(id) {
                    meta_ids.insert(id.clone());
                }
            }
            Informed::Unknown => {}
        }
    }
    for vj in model
        .vehicle_journeys
        .values()
        .filter(|vj| vj.realtime_level == RTLevel::Base)
    {
        if all_routes || route_ids.contains(vj.route_id.as_str()) {
            meta_ids.insert(vj.meta_vj_id.clone());
        }
    }
    meta_ids
}

/// Days on which a vehicle journey may be concerned by the periods: from
/// the day before each period to its last day, limited to the days of the
/// model.
pub fn impact_validity_pattern(
    beginning_date: NaiveDate,
    periods: &[TimePeriod],
) -> ValidityPattern {
    let mut vp = ValidityPattern::new(beginning_date);
    let last_date = beginning_date + Duration::days(NB_DAYS as i64 - 1);
    for period in periods {
        for date in period
            .dates_possibly_concerned()
            .skip_while(|date| *date < beginning_date)
            .take_while(|date| *date <= last_date)
        {
            vp.add(date);
        }
    }
    vp
}

fn combine(matches: impl Iterator<Item = Matched>) -> Option<Matched> {
    let mut runs = Vec::new();
    for matched in matches {
        match matched {
            Matched::Whole => return Some(Matched::Whole),
            Matched::Runs(r) => runs.extend(r),
        }
    }
    if runs.is_empty() {
        None
    } else {
        runs.sort_by_key(|run| (run.start, run.end));
        Some(Matched::Runs(runs))
    }
}

enum Action {
    Cancel(Days),
    Derive {
        from: String,
        stop_times: Vec<StopTime>,
        base_days: Days,
    },
}

/// Days of `vj` at `level` on which one of the runs is visited during a
/// period.
fn impacted_days(
    vj: &VehicleJourney,
    level: RTLevel,
    candidate_days: Days,
    runs: &[Vec<usize>],
    periods: &[TimePeriod],
) -> Days {
    let windows: Vec<(Time, Time)> = runs
        .iter()
        .filter_map(|run| {
            let first = vj.stop_times.get(*run.first()?)?;
            let last = vj.stop_times.get(*run.last()?)?;
            Some((first.arrival_time, last.departure_time))
        })
        .collect();
    let vp = vj.validity_pattern_at(level);
    let mut impacted = Days::default();
    for day in candidate_days.iter() {
        let date = vp.date(day);
        let is_impacted = windows.iter().any(|(first, last)| {
            periods
                .iter()
                .any(|period| period.touches(first.on(date), last.on(date)))
        });
        if is_impacted {
            impacted.set(day);
        }
    }
    impacted
}

fn apply_impact_on_meta(
    model: &mut Model,
    handle: ImpactHandle,
    impact: &Impact,
    level: RTLevel,
    meta_id: &str,
) -> Result<()> {
    let meta = model
        .meta_vehicle_journeys
        .get(meta_id)
        .ok_or_else(|| anyhow!("meta vehicle journey '{}' not found", meta_id))?;
    let matches: Vec<(&VehicleJourney, Matched)> = base_vehicle_journeys(&model.collections, meta)
        .filter_map(|base| {
            let matched = combine(
                impact
                    .informed_entities
                    .iter()
                    .filter_map(|informed| topology::match_informed(model, base, informed)),
            )?;
            Some((base, matched))
        })
        .collect();
    if matches.is_empty() {
        return Ok(());
    }
    let touched_stop_points: BTreeSet<Idx<StopPoint>> = matches
        .iter()
        .filter_map(|(base, matched)| match matched {
            Matched::Runs(runs) => Some((base, runs)),
            Matched::Whole => None,
        })
        .flat_map(|(base, runs)| {
            runs.iter()
                .flat_map(|run| run.clone())
                .filter_map(move |rank| base.stop_times.get(rank))
                .map(|st| st.stop_point_idx)
        })
        .collect();

    let periods = impact.periods();
    let impact_vp = impact_validity_pattern(model.beginning_date(), &periods);
    let mut actions = Vec::new();
    for vj in model.variants_of(meta) {
        if vj.stop_times.is_empty() {
            continue;
        }
        let candidate_days = vj.validity_pattern_at(level).days & impact_vp.days;
        if candidate_days.none() {
            continue;
        }
        let found = matches.iter().find_map(|(base, matched)| {
            let runs = match matched {
                Matched::Whole => vec![(0..vj.stop_times.len()).collect()],
                Matched::Runs(runs) if base.id == vj.id => {
                    runs.iter().map(|run| run.clone().collect()).collect()
                }
                Matched::Runs(runs) => topology::map_to_variant(base, vj, runs),
            };
            if runs.is_empty() {
                None
            } else {
                Some((matched, runs))
            }
        });
        let (matched, runs) = match found {
            Some(found) => found,
            None => continue,
        };
        let ranks = match topology::ranks_to_remove(
            impact.effect(),
            matched,
            &runs,
            vj.stop_times.len(),
        ) {
            Some(ranks) => ranks,
            None => continue,
        };
        let days = impacted_days(vj, level, candidate_days, &runs, &periods);
        if days.none() {
            continue;
        }
        let base_days = to_base_frame(vj, days);
        if ranks.len() == vj.stop_times.len() {
            actions.push(Action::Cancel(base_days));
        } else {
            let stop_times = vj
                .unshifted_stop_times()
                .into_iter()
                .enumerate()
                .filter(|(rank, _)| !ranks.contains(rank))
                .map(|(_, st)| st)
                .collect();
            actions.push(Action::Derive {
                from: vj.id.clone(),
                stop_times,
                base_days,
            });
        }
    }

    let c = &mut model.collections;
    if let Some(mut meta) = c.meta_vehicle_journeys.get_mut(meta_id) {
        meta.push_unique_impact(handle);
    }
    record_on_touched_stops(c, handle, &touched_stop_points);
    for action in actions {
        match action {
            Action::Cancel(base_days) => cancel(c, meta_id, level, base_days)?,
            Action::Derive {
                from,
                stop_times,
                base_days,
            } => {
                create_variant(c, meta_id, &from, level, stop_times, base_days, &impact.uri)?;
            }
        }
    }
    clean_up_useless_vjs(c, meta_id)
}
