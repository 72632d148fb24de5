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

//! Matching of the objects informed by an impact against the stop sequence
//! of a vehicle journey.
//!
//! The matching is always done on a base vehicle journey. The ranks found
//! are then carried to each variant of the same meta vehicle journey with
//! [`map_to_variant`].

use crate::disruption::{Effect, Informed, LineSection, RailSection};
use crate::model::Model;
use crate::objects::{VehicleJourney, SECONDS_PER_DAY};
use std::collections::BTreeSet;
use std::ops::Range;

/// What an informed entity designates on a vehicle journey.
#[derive(Debug, Clone, PartialEq)]
pub enum Matched {
    /// The whole vehicle journey (network, line, route or meta vehicle journey)
    Whole,
    /// Contiguous runs of ranks, in increasing order
    Runs(Vec<Range<usize>>),
}

/// Ranks visiting one of the stop areas, each rank being its own run.
pub fn stop_area_ranks(areas: &[&str], stop_area_id: &str) -> Vec<Range<usize>> {
    areas
        .iter()
        .enumerate()
        .filter(|(_, area)| **area == stop_area_id)
        .map(|(rank, _)| rank..rank + 1)
        .collect()
}

/// Runs going from the first visit of `start` to the following visits of
/// `end`, scanning left to right. A run still open at the end of the
/// journey is dropped.
pub fn line_section_ranks(areas: &[&str], start: &str, end: &str) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut section_start: Option<usize> = None;
    let mut ending = false;
    for (rank, area) in areas.iter().enumerate() {
        if ending && *area != end {
            if let Some(first) = section_start {
                runs.push(first..rank);
            }
            section_start = None;
            ending = false;
        }
        if section_start.is_none() && *area == start {
            section_start = Some(rank);
        }
        if section_start.is_some() && *area == end {
            ending = true;
        }
    }
    if let (true, Some(first)) = (ending, section_start) {
        runs.push(first..areas.len());
    }
    runs
}

/// Groups of consecutive ranks visiting the same stop area.
fn group_by_area<'a>(areas: &[&'a str]) -> Vec<(&'a str, Range<usize>)> {
    let mut groups: Vec<(&str, Range<usize>)> = Vec::new();
    for (rank, area) in areas.iter().enumerate() {
        match groups.last_mut() {
            Some((last, ranks)) if last == area => ranks.end = rank + 1,
            _ => groups.push((area, rank..rank + 1)),
        }
    }
    groups
}

fn push_merged(runs: &mut Vec<Range<usize>>, ranks: Range<usize>) {
    match runs.last_mut() {
        Some(last) if last.end == ranks.start => last.end = ranks.end,
        _ => runs.push(ranks),
    }
}

/// Ranks of the blocked stop areas, when the journey follows exactly the
/// path `start`, `blocked...`, `end`. Without blocked stop areas, the whole
/// path is impacted.
pub fn rail_section_ranks(
    areas: &[&str],
    start: &str,
    end: &str,
    blocked: &[&str],
) -> Vec<Range<usize>> {
    let mut expected: Vec<&str> = std::iter::once(start)
        .chain(blocked.iter().copied())
        .chain(std::iter::once(end))
        .collect();
    expected.dedup();

    let groups = group_by_area(areas);
    let mut runs = Vec::new();
    let mut i = 0;
    while i + expected.len() <= groups.len() {
        let candidate = &groups[i..i + expected.len()];
        if !candidate
            .iter()
            .map(|(area, _)| *area)
            .eq(expected.iter().copied())
        {
            i += 1;
            continue;
        }
        if blocked.is_empty() {
            let first = candidate[0].1.start;
            let last = candidate[candidate.len() - 1].1.end;
            push_merged(&mut runs, first..last);
        } else {
            for (area, ranks) in candidate {
                if blocked.contains(area) {
                    push_merged(&mut runs, ranks.clone());
                }
            }
        }
        i += expected.len();
    }
    runs
}

fn is_on_routes(model: &Model, vj: &VehicleJourney, line_id: &str, route_ids: &[String]) -> bool {
    let on_line = model
        .routes
        .get(&vj.route_id)
        .map(|route| route.line_id == line_id)
        .unwrap_or(false);
    on_line && (route_ids.is_empty() || route_ids.contains(&vj.route_id))
}

fn line_of<'a>(model: &'a Model, vj: &VehicleJourney) -> Option<&'a str> {
    model
        .routes
        .get(&vj.route_id)
        .map(|route| route.line_id.as_str())
}

/// Stop areas visited by a vehicle journey, rank by rank.
pub fn stop_areas_of<'a>(model: &'a Model, vj: &VehicleJourney) -> Vec<&'a str> {
    vj.stop_times
        .iter()
        .map(|st| model.stop_area_of(st.stop_point_idx))
        .collect()
}

fn line_section(model: &Model, vj: &VehicleJourney, section: &LineSection) -> Vec<Range<usize>> {
    if !is_on_routes(model, vj, &section.line_id, &section.route_ids) {
        return Vec::new();
    }
    line_section_ranks(
        &stop_areas_of(model, vj),
        &section.start_stop_area_id,
        &section.end_stop_area_id,
    )
}

fn rail_section(model: &Model, vj: &VehicleJourney, section: &RailSection) -> Vec<Range<usize>> {
    if !is_on_routes(model, vj, &section.line_id, &section.route_ids) {
        return Vec::new();
    }
    rail_section_ranks(
        &stop_areas_of(model, vj),
        &section.start_stop_area_id,
        &section.end_stop_area_id,
        &section.sorted_blocked_stop_areas(),
    )
}

/// Match an informed entity on a base vehicle journey. `None` if the
/// vehicle journey is not concerned.
pub fn match_informed(model: &Model, vj: &VehicleJourney, informed: &Informed) -> Option<Matched> {
    let whole = |concerned: bool| if concerned { Some(Matched::Whole) } else { None };
    let runs = match informed {
        Informed::Network(network_id) => {
            let network = line_of(model, vj)
                .and_then(|line_id| model.lines.get(line_id))
                .map(|line| line.network_id.as_str());
            return whole(network == Some(network_id.as_str()));
        }
        Informed::Line(line_id) => return whole(line_of(model, vj) == Some(line_id.as_str())),
        Informed::Route(route_id) => return whole(vj.route_id == *route_id),
        Informed::MetaVehicleJourney(meta_id) => return whole(vj.meta_vj_id == *meta_id),
        Informed::Unknown => return None,
        Informed::StopPoint(stop_point_id) => {
            let stop_point_idx = model.stop_points.get_idx(stop_point_id)?;
            vj.stop_times
                .iter()
                .enumerate()
                .filter(|(_, st)| st.stop_point_idx == stop_point_idx)
                .map(|(rank, _)| rank..rank + 1)
                .collect()
        }
        Informed::StopArea(stop_area_id) => {
            stop_area_ranks(&stop_areas_of(model, vj), stop_area_id)
        }
        Informed::LineSection(section) => line_section(model, vj, section),
        Informed::RailSection(section) => rail_section(model, vj, section),
    };
    if runs.is_empty() {
        None
    } else {
        Some(Matched::Runs(runs))
    }
}

/// Carry runs of ranks of `base` to `variant`: a base stop time corresponds
/// to the first stop time of the variant on the same stop point leaving at
/// the same time in the base frame. Ranks removed from the variant are
/// dropped, so are the runs left empty.
///
/// Two visits of the same stop point leaving at the same time cannot be
/// told apart, the first one is always picked.
pub fn map_to_variant(
    base: &VehicleJourney,
    variant: &VehicleJourney,
    runs: &[Range<usize>],
) -> Vec<Vec<usize>> {
    let base_departures: Vec<u32> = base
        .stop_times
        .iter()
        .map(|st| st.departure_time.total_seconds() + base.shift * SECONDS_PER_DAY)
        .collect();
    let variant_shift = variant.shift * SECONDS_PER_DAY;
    runs.iter()
        .map(|run| {
            run.clone()
                .filter_map(|rank| {
                    let base_st = &base.stop_times[rank];
                    variant.stop_times.iter().position(|st| {
                        st.stop_point_idx == base_st.stop_point_idx
                            && st.departure_time.total_seconds() + variant_shift
                                == base_departures[rank]
                    })
                })
                .collect::<Vec<usize>>()
        })
        .filter(|ranks| !ranks.is_empty())
        .collect()
}

/// Ranks of the vehicle journey to remove for `effect`, `None` if the
/// effect does not modify the schedule.
pub fn ranks_to_remove(
    effect: Effect,
    matched: &Matched,
    mapped_runs: &[Vec<usize>],
    nb_stop_times: usize,
) -> Option<BTreeSet<usize>> {
    match (effect, matched) {
        (Effect::NoService, Matched::Whole) => Some((0..nb_stop_times).collect()),
        (Effect::NoService, Matched::Runs(_)) => {
            let first = mapped_runs.iter().flatten().min()?;
            Some((*first..nb_stop_times).collect())
        }
        (Effect::ReducedService, Matched::Runs(_)) | (Effect::Detour, Matched::Runs(_)) => {
            Some(mapped_runs.iter().flatten().copied().collect())
        }
        _ => None,
    }
}
