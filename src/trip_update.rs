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

//! Realtime updates of the schedule of one vehicle journey on one day.
//!
//! A [`TripUpdate`] is turned into a disruption at the `RealTime` level
//! whose uri is the id of the update. Sending again an update with the same
//! id replaces the previous one.

use crate::apply_disruption::apply_disruption;
use crate::disruption::{AuxInfo, Disruption, Effect, Impact, ImpactHandle, Informed, Severity};
use crate::meta_vehicle_journey::{
    base_vehicle_journeys, cancel, clean_up_useless_vjs, create_variant,
    get_base_vj_circulating_at_date,
};
use crate::model::Model;
use crate::objects::{HasImpacts, RTLevel, StopTime, Time};
use crate::time_periods::TimePeriod;
use crate::validity_pattern::Days;
use crate::Result;
use anyhow::anyhow;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;
use tracing::{debug, info};

/// Errors on the content of a trip update
#[derive(Debug, Error, PartialEq)]
pub enum TripUpdateError {
    /// Neither a vehicle journey nor a meta vehicle journey
    #[error("vehicle journey '{0}' not found")]
    UnknownTrip(String),
    #[allow(missing_docs)]
    #[error("stop point '{0}' not found")]
    UnknownStopPoint(String),
    /// A stop time is before the previous one
    #[error("stop times of trip update '{0}' are decreasing at stop point '{1}'")]
    DecreasingStopTimes(String, String),
    /// A modification without any stop time
    #[error("trip update '{0}' has no stop time")]
    EmptyUpdate(String),
}

/// What happens at a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTimeStatus {
    /// Served, possibly with a delay
    Scheduled,
    /// Served, not in the base schedule
    Added,
    /// Not served, the vehicle goes through
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct StopTimeUpdate {
    pub stop_point_id: String,
    /// From the midnight of the circulation date
    pub arrival_time: Time,
    /// From the midnight of the circulation date
    pub departure_time: Time,
    pub status: StopTimeStatus,
}

#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum TripUpdateKind {
    Cancellation,
    /// The complete new list of stop times
    Modification(Vec<StopTimeUpdate>),
}

/// New schedule of a vehicle journey on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct TripUpdate {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub contributor: String,
    /// Id of a meta vehicle journey, or of one of its vehicle journeys
    pub vehicle_journey_id: String,
    /// Day of circulation of the base vehicle journey
    pub circulation_date: NaiveDate,
    #[allow(missing_docs)]
    pub kind: TripUpdateKind,
}

impl TripUpdate {
    fn meta_id(&self, model: &Model) -> Result<String, TripUpdateError> {
        if model
            .meta_vehicle_journeys
            .contains_id(&self.vehicle_journey_id)
        {
            return Ok(self.vehicle_journey_id.clone());
        }
        model
            .vehicle_journeys
            .get(&self.vehicle_journey_id)
            .map(|vj| vj.meta_vj_id.clone())
            .ok_or_else(|| TripUpdateError::UnknownTrip(self.vehicle_journey_id.clone()))
    }

    fn stop_times(
        &self,
        model: &Model,
        updates: &[StopTimeUpdate],
    ) -> Result<Vec<StopTime>, TripUpdateError> {
        if updates.is_empty() {
            return Err(TripUpdateError::EmptyUpdate(self.id.clone()));
        }
        let mut stop_times = Vec::with_capacity(updates.len());
        let mut previous = Time::default();
        for (sequence, update) in updates.iter().enumerate() {
            let stop_point_idx = model
                .stop_points
                .get_idx(&update.stop_point_id)
                .ok_or_else(|| TripUpdateError::UnknownStopPoint(update.stop_point_id.clone()))?;
            if update.arrival_time < previous || update.departure_time < update.arrival_time {
                return Err(TripUpdateError::DecreasingStopTimes(
                    self.id.clone(),
                    update.stop_point_id.clone(),
                ));
            }
            previous = update.departure_time;
            let mut stop_time = StopTime::new(
                stop_point_idx,
                sequence as u32,
                update.arrival_time,
                update.departure_time,
            );
            if update.status == StopTimeStatus::Skipped {
                stop_time.skipped = true;
                stop_time.pickup_allowed = false;
                stop_time.drop_off_allowed = false;
            }
            stop_times.push(stop_time);
        }
        Ok(stop_times)
    }

    /// The disruption carrying this update.
    pub fn to_disruption(&self, model: &Model) -> Result<Disruption> {
        let meta_id = self.meta_id(model)?;
        let (effect, stop_times) = match &self.kind {
            TripUpdateKind::Cancellation => (Effect::NoService, Vec::new()),
            TripUpdateKind::Modification(updates) => {
                (Effect::ModifiedService, self.stop_times(model, updates)?)
            }
        };

        let meta = model
            .meta_vehicle_journeys
            .get(&meta_id)
            .ok_or_else(|| TripUpdateError::UnknownTrip(meta_id.clone()))?;
        let date = self.circulation_date;
        let mut bounds: Vec<NaiveDateTime> = base_vehicle_journeys(&model.collections, meta)
            .filter_map(|vj| vj.execution_period(date))
            .take(1)
            .flat_map(|(first, last)| vec![first, last])
            .collect();
        bounds.extend(stop_times.iter().flat_map(|st| {
            vec![st.arrival_time.on(date), st.departure_time.on(date)]
        }));
        let first = bounds
            .iter()
            .min()
            .copied()
            .unwrap_or_else(|| NaiveDateTime::new(date, NaiveTime::MIN));
        let last = bounds.iter().max().copied().unwrap_or(first);
        let period = TimePeriod::new(first, last + Duration::seconds(1))?;

        let impact = Impact {
            uri: self.id.clone(),
            disruption_uri: self.id.clone(),
            severity: Severity {
                uri: format!("{}:severity", self.id),
                wording: String::new(),
                effect,
                priority: 0,
            },
            application_periods: vec![period],
            application_patterns: vec![],
            informed_entities: vec![Informed::MetaVehicleJourney(meta_id)],
            aux_info: Some(AuxInfo {
                circulation_date: date,
                stop_times,
            }),
        };
        Ok(Disruption::new(
            &self.id,
            &self.contributor,
            RTLevel::RealTime,
            period,
            vec![impact],
        )?)
    }
}

/// Apply a trip update on the model.
pub fn apply_trip_update(model: &mut Model, trip_update: &TripUpdate) -> Result<()> {
    let disruption = trip_update.to_disruption(model)?;
    apply_disruption(model, disruption)
}

/// Apply the schedule of `aux_info` on the meta vehicle journey. Nothing is
/// done if the base vehicle journey does not circulate on the date.
pub(crate) fn apply_on_meta(
    model: &mut Model,
    handle: ImpactHandle,
    impact: &Impact,
    level: RTLevel,
    meta_id: &str,
    aux_info: &AuxInfo,
) -> Result<()> {
    let date = aux_info.circulation_date;
    let meta = model
        .meta_vehicle_journeys
        .get(meta_id)
        .ok_or_else(|| anyhow!("meta vehicle journey '{}' not found", meta_id))?;
    let base = match base_vehicle_journeys(&model.collections, meta)
        .find(|vj| vj.is_active(RTLevel::Base, date))
    {
        Some(base) => base,
        None => {
            info!(
                "'{}' does not circulate on {}, trip update '{}' ignored",
                meta_id, date, impact.uri
            );
            return Ok(());
        }
    };
    let mut base_days = Days::default();
    if let Some(day) = base.base_validity_pattern().day_index(date) {
        base_days.set(day);
    }
    let from_id = get_base_vj_circulating_at_date(&model.collections, meta, level, date)
        .unwrap_or(base)
        .id
        .clone();

    let c = &mut model.collections;
    if let Some(mut meta) = c.meta_vehicle_journeys.get_mut(meta_id) {
        meta.push_unique_impact(handle);
    }
    if aux_info.stop_times.is_empty() {
        cancel(c, meta_id, level, base_days)?;
    } else {
        let id = create_variant(
            c,
            meta_id,
            &from_id,
            level,
            aux_info.stop_times.clone(),
            base_days,
            &impact.uri,
        )?;
        debug!("trip update '{}' applied on '{}'", impact.uri, id);
    }
    clean_up_useless_vjs(c, meta_id)
}
