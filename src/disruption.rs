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

//! Disruptions, their impacts and the registry owning them.
//!
//! A [`Disruption`] exclusively owns its [`Impact`]s. Every other object
//! refers to an impact through an [`ImpactHandle`], a generation checked
//! index in the [`DisruptionHolder`]: once the disruption is removed, all
//! the handles on its impacts are dead and resolve to nothing.

use crate::objects::{RTLevel, StopTime};
use crate::time_periods::{self, ApplicationPattern, TimePeriod};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors on the disruption registry
#[derive(Debug, Error, PartialEq)]
pub enum DisruptionError {
    /// No disruption with this uri
    #[error("disruption '{0}' not found")]
    UnknownDisruption(String),
    /// Two impacts with the same uri in a disruption
    #[error("impact '{0}' is defined twice in disruption '{1}'")]
    DuplicatedImpact(String, String),
}

/// Effect of an impact on the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Effect {
    NoService,
    ReducedService,
    SignificantDelays,
    Detour,
    AdditionalService,
    ModifiedService,
    OtherEffect,
    UnknownEffect,
    StopMoved,
}

impl Default for Effect {
    fn default() -> Self {
        Effect::UnknownEffect
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct Severity {
    pub uri: String,
    pub wording: String,
    pub effect: Effect,
    pub priority: i32,
}

/// A portion of a line between two stop areas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSection {
    #[allow(missing_docs)]
    pub line_id: String,
    #[allow(missing_docs)]
    pub start_stop_area_id: String,
    #[allow(missing_docs)]
    pub end_stop_area_id: String,
    /// Routes concerned, all the routes of the line if empty
    pub route_ids: Vec<String>,
}

/// A stop area where trains cannot stop, `order` gives its position along
/// the section.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedStopArea {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub order: u32,
}

/// A portion of a rail line following an explicit path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RailSection {
    #[allow(missing_docs)]
    pub line_id: String,
    #[allow(missing_docs)]
    pub start_stop_area_id: String,
    #[allow(missing_docs)]
    pub end_stop_area_id: String,
    /// Blocked stop areas, not necessarily sorted
    pub blocked_stop_areas: Vec<BlockedStopArea>,
    /// Routes concerned, all the routes of the line if empty
    pub route_ids: Vec<String>,
}

impl RailSection {
    /// Blocked stop areas in the order of the section.
    pub fn sorted_blocked_stop_areas(&self) -> Vec<&str> {
        let mut blocked: Vec<&BlockedStopArea> = self.blocked_stop_areas.iter().collect();
        blocked.sort_by_key(|b| b.order);
        blocked.into_iter().map(|b| b.id.as_str()).collect()
    }
}

/// Object targeted by an impact
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Informed {
    Network(String),
    Line(String),
    Route(String),
    StopArea(String),
    StopPoint(String),
    LineSection(LineSection),
    RailSection(RailSection),
    MetaVehicleJourney(String),
    Unknown,
}

/// New schedule of a vehicle journey for one day, carried by realtime
/// trip updates.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxInfo {
    /// Day of circulation of the base vehicle journey
    pub circulation_date: NaiveDate,
    /// Stop times from the midnight of `circulation_date`, empty for a
    /// cancellation
    pub stop_times: Vec<StopTime>,
}

/// Is an impact in application at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ActiveStatus {
    Past,
    Active,
    Future,
}

/// One effect of a disruption.
#[derive(Debug, Clone, PartialEq)]
pub struct Impact {
    #[allow(missing_docs)]
    pub uri: String,
    /// Uri of the owning disruption
    pub disruption_uri: String,
    #[allow(missing_docs)]
    pub severity: Severity,
    /// An empty list means the impact is never active
    pub application_periods: Vec<TimePeriod>,
    /// Restrict the application periods to these recurrences, if any
    pub application_patterns: Vec<ApplicationPattern>,
    #[allow(missing_docs)]
    pub informed_entities: Vec<Informed>,
    #[allow(missing_docs)]
    pub aux_info: Option<AuxInfo>,
}

impl Impact {
    #[allow(missing_docs)]
    pub fn effect(&self) -> Effect {
        self.severity.effect
    }

    /// Periods during which the impact applies, sorted and merged.
    pub fn periods(&self) -> Vec<TimePeriod> {
        time_periods::effective_periods(&self.application_periods, &self.application_patterns)
    }

    /// Status of the impact at `now`.
    pub fn status(&self, now: NaiveDateTime) -> ActiveStatus {
        let periods = self.periods();
        if periods.iter().any(|p| p.contains(&now)) {
            ActiveStatus::Active
        } else if periods.iter().any(|p| p.start() > now) {
            ActiveStatus::Future
        } else {
            ActiveStatus::Past
        }
    }
}

/// Period during which a disruption is displayed. Without an end, the
/// disruption stays published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicationPeriod {
    #[allow(missing_docs)]
    pub start: NaiveDateTime,
    #[allow(missing_docs)]
    pub end: Option<NaiveDateTime>,
}

impl PublicationPeriod {
    /// Published from `start` on, without end.
    pub fn open_ended(start: NaiveDateTime) -> Self {
        PublicationPeriod { start, end: None }
    }

    #[allow(missing_docs)]
    pub fn contains(&self, t: &NaiveDateTime) -> bool {
        self.start <= *t && self.end.map(|end| *t < end).unwrap_or(true)
    }
}

impl From<TimePeriod> for PublicationPeriod {
    fn from(period: TimePeriod) -> Self {
        PublicationPeriod {
            start: period.start(),
            end: Some(period.end()),
        }
    }
}

/// A named announcement grouping impacts.
#[derive(Debug, Clone, PartialEq)]
pub struct Disruption {
    #[allow(missing_docs)]
    pub uri: String,
    #[allow(missing_docs)]
    pub contributor: String,
    /// Level of the schedule modified by the impacts
    pub rt_level: RTLevel,
    #[allow(missing_docs)]
    pub publication_period: PublicationPeriod,
    impacts: Vec<Impact>,
}

impl Disruption {
    /// The impacts are attached to the new disruption.
    pub fn new(
        uri: &str,
        contributor: &str,
        rt_level: RTLevel,
        publication_period: impl Into<PublicationPeriod>,
        impacts: Vec<Impact>,
    ) -> Result<Self, DisruptionError> {
        let mut disruption = Disruption {
            uri: uri.to_owned(),
            contributor: contributor.to_owned(),
            rt_level,
            publication_period: publication_period.into(),
            impacts: Vec::with_capacity(impacts.len()),
        };
        for impact in impacts {
            disruption.add_impact(impact)?;
        }
        Ok(disruption)
    }

    /// Attach an impact to the disruption.
    pub fn add_impact(&mut self, mut impact: Impact) -> Result<(), DisruptionError> {
        if self.impacts.iter().any(|i| i.uri == impact.uri) {
            return Err(DisruptionError::DuplicatedImpact(
                impact.uri,
                self.uri.clone(),
            ));
        }
        impact.disruption_uri = self.uri.clone();
        self.impacts.push(impact);
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn impacts(&self) -> &[Impact] {
        &self.impacts
    }

    /// Is the disruption to be displayed at `now`.
    pub fn is_publishable(&self, now: NaiveDateTime) -> bool {
        self.publication_period.contains(&now)
    }
}

/// Weak reference on an impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImpactHandle {
    slot: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct ImpactSlot {
    generation: u32,
    owner: Option<(String, usize)>,
}

/// Registry owning the disruptions, by uri.
#[derive(Debug, Clone, Default)]
pub struct DisruptionHolder {
    disruptions: BTreeMap<String, (Disruption, Vec<ImpactHandle>)>,
    slots: Vec<ImpactSlot>,
    free_slots: Vec<u32>,
}

impl DisruptionHolder {
    /// Store a disruption, replacing the one with the same uri if any.
    /// Returns the handles of its impacts, in the order of the impacts.
    pub fn insert(&mut self, disruption: Disruption) -> Vec<ImpactHandle> {
        self.pop(&disruption.uri);
        let handles: Vec<ImpactHandle> = (0..disruption.impacts.len())
            .map(|position| self.allocate(&disruption.uri, position))
            .collect();
        self.disruptions
            .insert(disruption.uri.clone(), (disruption, handles.clone()));
        handles
    }

    fn allocate(&mut self, disruption_uri: &str, position: usize) -> ImpactHandle {
        let owner = Some((disruption_uri.to_owned(), position));
        match self.free_slots.pop() {
            Some(slot) => {
                let impact_slot = &mut self.slots[slot as usize];
                impact_slot.owner = owner;
                ImpactHandle {
                    slot,
                    generation: impact_slot.generation,
                }
            }
            None => {
                self.slots.push(ImpactSlot {
                    generation: 0,
                    owner,
                });
                ImpactHandle {
                    slot: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    /// Remove a disruption, all the handles on its impacts become dead.
    pub fn pop(&mut self, uri: &str) -> Option<(Disruption, Vec<ImpactHandle>)> {
        let (disruption, handles) = self.disruptions.remove(uri)?;
        for handle in &handles {
            let slot = &mut self.slots[handle.slot as usize];
            slot.owner = None;
            slot.generation += 1;
            self.free_slots.push(handle.slot);
        }
        Some((disruption, handles))
    }

    #[allow(missing_docs)]
    pub fn get_disruption(&self, uri: &str) -> Option<&Disruption> {
        self.disruptions.get(uri).map(|(disruption, _)| disruption)
    }

    #[allow(missing_docs)]
    pub fn contains(&self, uri: &str) -> bool {
        self.disruptions.contains_key(uri)
    }

    /// Handles of the impacts of a disruption.
    pub fn handles(&self, uri: &str) -> Result<&[ImpactHandle], DisruptionError> {
        self.disruptions
            .get(uri)
            .map(|(_, handles)| handles.as_slice())
            .ok_or_else(|| DisruptionError::UnknownDisruption(uri.to_owned()))
    }

    /// The impact behind a handle, if still alive.
    pub fn get(&self, handle: ImpactHandle) -> Option<&Impact> {
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let (disruption_uri, position) = slot.owner.as_ref()?;
        self.get_disruption(disruption_uri)?
            .impacts
            .get(*position)
    }

    /// The disruption owning the impact behind a handle, if still alive.
    pub fn get_owner(&self, handle: ImpactHandle) -> Option<&Disruption> {
        let impact = self.get(handle)?;
        self.get_disruption(&impact.disruption_uri)
    }

    #[allow(missing_docs)]
    pub fn is_alive(&self, handle: ImpactHandle) -> bool {
        self.get(handle).is_some()
    }

    #[allow(missing_docs)]
    pub fn disruptions(&self) -> impl Iterator<Item = &Disruption> {
        self.disruptions.values().map(|(disruption, _)| disruption)
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.disruptions.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.disruptions.is_empty()
    }
}
