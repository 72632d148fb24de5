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

//! The different objects contained in the transit model.

use crate::disruption::ImpactHandle;
use crate::validity_pattern::ValidityPattern;
use anyhow::{anyhow, Error};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::{fmt, ops, str::FromStr};
use typed_index_collection::{Id, Idx};

/// Number of seconds in a day.
pub const SECONDS_PER_DAY: u32 = 86_400;

macro_rules! impl_id {
    ($ty:ty) => {
        impl Id<$ty> for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn set_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
    ($ty:ty, $gen:ty, $id:ident) => {
        impl Id<$gen> for $ty {
            fn id(&self) -> &str {
                &self.$id
            }
            fn set_id(&mut self, id: String) {
                self.$id = id;
            }
        }
    };
}

/// Objects on which impacts can be attached.
pub trait HasImpacts {
    /// Handles of the attached impacts, some may be dead.
    fn impacts(&self) -> &[ImpactHandle];
    /// Mutable access to the attached impacts.
    fn impacts_mut(&mut self) -> &mut Vec<ImpactHandle>;

    /// Attach an impact, only once.
    fn push_unique_impact(&mut self, handle: ImpactHandle) {
        if !self.impacts().contains(&handle) {
            self.impacts_mut().push(handle);
        }
    }
}

macro_rules! impl_impacts {
    ($ty:ty, $field:ident) => {
        impl HasImpacts for $ty {
            fn impacts(&self) -> &[ImpactHandle] {
                &self.$field
            }
            fn impacts_mut(&mut self) -> &mut Vec<ImpactHandle> {
                &mut self.$field
            }
        }
    };
}

/// Level of a schedule: theoretical, adapted by disruptions, or realtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RTLevel {
    /// Theoretical schedule
    Base,
    /// Schedule adapted by planned disruptions
    Adapted,
    /// Realtime schedule
    RealTime,
}

impl RTLevel {
    /// All the levels, from the coarsest to the finest.
    pub const ALL: [RTLevel; 3] = [RTLevel::Base, RTLevel::Adapted, RTLevel::RealTime];

    fn index(self) -> usize {
        self as usize
    }

    /// This level and all the finer ones.
    pub fn and_finer(self) -> impl Iterator<Item = RTLevel> {
        RTLevel::ALL.iter().copied().filter(move |l| *l >= self)
    }
}

impl Default for RTLevel {
    fn default() -> Self {
        RTLevel::Base
    }
}

impl fmt::Display for RTLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RTLevel::Base => write!(f, "Base"),
            RTLevel::Adapted => write!(f, "Adapted"),
            RTLevel::RealTime => write!(f, "RealTime"),
        }
    }
}

/// Seconds since the midnight of the reference day, may exceed 24h.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(u32);

impl Time {
    /// Build a time from its components.
    pub fn new(h: u32, m: u32, s: u32) -> Self {
        Time(h * 3600 + m * 60 + s)
    }
    /// Build a time from a number of seconds.
    pub fn from_seconds(seconds: u32) -> Self {
        Time(seconds)
    }
    /// Hours, may be greater than 23.
    pub fn hours(self) -> u32 {
        self.0 / 3600
    }
    /// Minutes.
    pub fn minutes(self) -> u32 {
        self.0 / 60 % 60
    }
    /// Seconds.
    pub fn seconds(self) -> u32 {
        self.0 % 60
    }
    /// Total number of seconds.
    pub fn total_seconds(self) -> u32 {
        self.0
    }
    /// Datetime of this time on the given reference day.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        NaiveDateTime::new(date, NaiveTime::MIN) + chrono::Duration::seconds(i64::from(self.0))
    }
}

impl ops::Add for Time {
    type Output = Time;
    fn add(self, other: Time) -> Time {
        Time(self.0 + other.0)
    }
}

impl ops::Sub for Time {
    type Output = Time;
    fn sub(self, other: Time) -> Time {
        Time(self.0.saturating_sub(other.0))
    }
}

impl FromStr for Time {
    type Err = Error;
    fn from_str(time: &str) -> Result<Self, Self::Err> {
        let mut t = time.split(':');
        let (hours, minutes, seconds) = match (t.next(), t.next(), t.next(), t.next()) {
            (Some(h), Some(m), Some(s), None) => (h, m, s),
            _ => return Err(anyhow!("invalid time format '{}'", time)),
        };
        let hours: u32 = hours.parse()?;
        let minutes: u32 = minutes.parse()?;
        let seconds: u32 = seconds.parse()?;
        if minutes > 59 || seconds > 59 {
            return Err(anyhow!("invalid time '{}'", time));
        }
        Ok(Time::new(hours, minutes, seconds))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub impacts: Vec<ImpactHandle>,
}
impl_id!(Network);
impl_impacts!(Network, impacts);

#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct Line {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub network_id: String,
    pub impacts: Vec<ImpactHandle>,
}
impl_id!(Line);
impl_id!(Line, Network, network_id);
impl_impacts!(Line, impacts);

#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct Route {
    pub id: String,
    pub name: String,
    pub line_id: String,
    pub impacts: Vec<ImpactHandle>,
}
impl_id!(Route);
impl_id!(Route, Line, line_id);
impl_impacts!(Route, impacts);

#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct StopArea {
    pub id: String,
    pub name: String,
    pub impacts: Vec<ImpactHandle>,
}
impl_id!(StopArea);
impl_impacts!(StopArea, impacts);

#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct StopPoint {
    pub id: String,
    pub name: String,
    pub stop_area_id: String,
    pub impacts: Vec<ImpactHandle>,
}
impl_id!(StopPoint);
impl_id!(StopPoint, StopArea, stop_area_id);
impl_impacts!(StopPoint, impacts);

/// A visit of a vehicle journey at a stop point.
#[derive(Clone, Debug, PartialEq)]
pub struct StopTime {
    /// Visited stop point
    pub stop_point_idx: Idx<StopPoint>,
    /// Position in the schedule the stop time comes from: the base vehicle
    /// journey for a disruption, the list of updates for a trip update
    pub sequence: u32,
    #[allow(missing_docs)]
    pub arrival_time: Time,
    #[allow(missing_docs)]
    pub departure_time: Time,
    /// Time from which travellers can board
    pub boarding_time: Time,
    /// Time until which travellers can alight
    pub alighting_time: Time,
    #[allow(missing_docs)]
    pub pickup_allowed: bool,
    #[allow(missing_docs)]
    pub drop_off_allowed: bool,
    /// The vehicle passes the stop without serving it
    pub skipped: bool,
}

impl StopTime {
    /// Visit with the same boarding and alighting times as the schedule.
    pub fn new(
        stop_point_idx: Idx<StopPoint>,
        sequence: u32,
        arrival_time: Time,
        departure_time: Time,
    ) -> Self {
        StopTime {
            stop_point_idx,
            sequence,
            arrival_time,
            departure_time,
            boarding_time: departure_time,
            alighting_time: arrival_time,
            pickup_allowed: true,
            drop_off_allowed: true,
            skipped: false,
        }
    }

    fn shifted(&self, seconds: i64) -> StopTime {
        let shift =
            |t: Time| Time::from_seconds((i64::from(t.total_seconds()) + seconds).max(0) as u32);
        StopTime {
            arrival_time: shift(self.arrival_time),
            departure_time: shift(self.departure_time),
            boarding_time: shift(self.boarding_time),
            alighting_time: shift(self.alighting_time),
            ..self.clone()
        }
    }
}

/// One run of a vehicle, either from the theoretical schedule or derived
/// from it by a disruption.
#[derive(Clone, Debug)]
pub struct VehicleJourney {
    #[allow(missing_docs)]
    pub id: String,
    /// Position in the vehicle journeys collection
    pub idx: usize,
    #[allow(missing_docs)]
    pub headsign: Option<String>,
    #[allow(missing_docs)]
    pub route_id: String,
    /// Meta vehicle journey grouping all the variants of this run
    pub meta_vj_id: String,
    /// Level at which this vehicle journey has been created
    pub realtime_level: RTLevel,
    /// Number of days the stop times have been moved back, the validity
    /// patterns being moved forward by the same amount
    pub shift: u32,
    #[allow(missing_docs)]
    pub stop_times: Vec<StopTime>,
    validity_patterns: [ValidityPattern; 3],
}

impl_id!(VehicleJourney);
impl_id!(VehicleJourney, Route, route_id);

impl VehicleJourney {
    /// A base vehicle journey circulating on `validity_pattern`.
    pub fn new(id: &str, route_id: &str, validity_pattern: ValidityPattern) -> Self {
        VehicleJourney {
            id: id.to_owned(),
            idx: 0,
            headsign: None,
            route_id: route_id.to_owned(),
            meta_vj_id: String::new(),
            realtime_level: RTLevel::Base,
            shift: 0,
            stop_times: Vec::new(),
            validity_patterns: [validity_pattern; 3],
        }
    }

    /// Create a variant of `from` at `level`, keeping its route and meta vehicle journey.
    pub(crate) fn variant(
        from: &VehicleJourney,
        id: String,
        level: RTLevel,
        shift: u32,
        stop_times: Vec<StopTime>,
        validity_pattern: ValidityPattern,
    ) -> Self {
        let empty = ValidityPattern::new(validity_pattern.beginning_date);
        let mut validity_patterns = [empty; 3];
        for l in level.and_finer() {
            validity_patterns[l.index()] = validity_pattern;
        }
        VehicleJourney {
            id,
            idx: 0,
            headsign: from.headsign.clone(),
            route_id: from.route_id.clone(),
            meta_vj_id: from.meta_vj_id.clone(),
            realtime_level: level,
            shift,
            stop_times,
            validity_patterns,
        }
    }

    /// Validity pattern of the vehicle journey at `level`.
    pub fn validity_pattern_at(&self, level: RTLevel) -> &ValidityPattern {
        &self.validity_patterns[level.index()]
    }

    /// Mutable validity pattern of the vehicle journey at `level`.
    pub fn validity_pattern_at_mut(&mut self, level: RTLevel) -> &mut ValidityPattern {
        &mut self.validity_patterns[level.index()]
    }

    #[allow(missing_docs)]
    pub fn base_validity_pattern(&self) -> &ValidityPattern {
        self.validity_pattern_at(RTLevel::Base)
    }

    #[allow(missing_docs)]
    pub fn adapted_validity_pattern(&self) -> &ValidityPattern {
        self.validity_pattern_at(RTLevel::Adapted)
    }

    #[allow(missing_docs)]
    pub fn rt_validity_pattern(&self) -> &ValidityPattern {
        self.validity_pattern_at(RTLevel::RealTime)
    }

    /// True if the vehicle journey does not circulate at any level.
    pub fn is_useless(&self) -> bool {
        self.validity_patterns.iter().all(ValidityPattern::none)
    }

    /// Does the vehicle journey leave on `date` at `level`.
    pub fn is_active(&self, level: RTLevel, date: NaiveDate) -> bool {
        self.validity_pattern_at(level).check_date(date)
    }

    /// Stop times expressed from the midnight of the base circulation day.
    pub(crate) fn unshifted_stop_times(&self) -> Vec<StopTime> {
        let offset = i64::from(self.shift) * i64::from(SECONDS_PER_DAY);
        self.stop_times.iter().map(|st| st.shifted(offset)).collect()
    }

    /// Period between the first boarding and the last alighting, on the
    /// reference day `date`.
    pub fn execution_period(&self, date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self
            .stop_times
            .iter()
            .filter(|st| st.pickup_allowed)
            .map(|st| st.boarding_time)
            .min()?;
        let last = self
            .stop_times
            .iter()
            .filter(|st| st.drop_off_allowed)
            .map(|st| st.alighting_time)
            .max()?;
        Some((first.on(date), last.on(date)))
    }
}

/// Renormalise stop times expressed from the base circulation day so that
/// the first one happens during the first day. Returns the number of days
/// removed.
pub(crate) fn normalize_stop_times(stop_times: &mut Vec<StopTime>) -> u32 {
    let earliest = stop_times
        .iter()
        .map(|st| std::cmp::min(st.boarding_time, st.arrival_time))
        .min();
    let shift = match earliest {
        Some(earliest) => earliest.total_seconds() / SECONDS_PER_DAY,
        None => return 0,
    };
    if shift > 0 {
        let offset = -i64::from(shift) * i64::from(SECONDS_PER_DAY);
        for st in stop_times.iter_mut() {
            *st = st.shifted(offset);
        }
    }
    shift
}

/// All the variants of a same run.
#[derive(Clone, Debug, Default)]
pub struct MetaVehicleJourney {
    #[allow(missing_docs)]
    pub id: String,
    /// Variants in creation order, the base ones first
    pub vehicle_journey_ids: Vec<String>,
    /// Impacts concerning this run, in application order
    pub impacted_by: Vec<ImpactHandle>,
    pub(crate) nb_created_variants: u32,
}
impl_id!(MetaVehicleJourney);
impl_impacts!(MetaVehicleJourney, impacted_by);
