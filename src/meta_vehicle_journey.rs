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

//! Management of the variants of a meta vehicle journey.
//!
//! Each variant keeps its validity patterns in its own frame: a variant
//! whose stop times have been moved back by `shift` days circulates on day
//! `d + shift` when the base vehicle journey circulates on day `d`. The
//! functions of this module take days expressed in the base frame.

use crate::model::Collections;
use crate::objects::{
    normalize_stop_times, MetaVehicleJourney, RTLevel, StopTime, VehicleJourney,
};
use crate::validity_pattern::{Days, ValidityPattern};
use crate::Result;
use anyhow::anyhow;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Days of the base frame corresponding to `days` of `vj`.
pub fn to_base_frame(vj: &VehicleJourney, days: Days) -> Days {
    days >> vj.shift as usize
}

fn variant_ids(c: &Collections, meta_id: &str) -> Result<Vec<String>> {
    c.meta_vehicle_journeys
        .get(meta_id)
        .map(|meta| meta.vehicle_journey_ids.clone())
        .ok_or_else(|| anyhow!("meta vehicle journey '{}' not found", meta_id))
}

/// Remove the days `base_days` from the validity patterns at `level` and
/// finer of all the variants of the meta vehicle journey. The base
/// schedule is never modified.
pub fn mask_variants(
    c: &mut Collections,
    meta_id: &str,
    level: RTLevel,
    base_days: Days,
) -> Result<()> {
    for vj_id in variant_ids(c, meta_id)? {
        let mut vj = match c.vehicle_journeys.get_mut(&vj_id) {
            Some(vj) => vj,
            None => {
                debug_assert!(false, "dangling vehicle journey '{}'", vj_id);
                warn!("vehicle journey '{}' of '{}' not found", vj_id, meta_id);
                continue;
            }
        };
        let mask = !(base_days << vj.shift as usize);
        for l in level.and_finer().filter(|l| *l != RTLevel::Base) {
            vj.validity_pattern_at_mut(l).days &= mask;
        }
    }
    Ok(())
}

/// Cancel the meta vehicle journey on `base_days` at `level` and finer.
pub fn cancel(c: &mut Collections, meta_id: &str, level: RTLevel, base_days: Days) -> Result<()> {
    debug!("cancel '{}' at level {} on {} days", meta_id, level, base_days.count());
    mask_variants(c, meta_id, level, base_days)
}

/// Create a new variant of `from_id` at `level`, circulating on
/// `base_days` with `stop_times` (expressed from the midnight of the base
/// circulation day). The other variants stop circulating on these days at
/// `level` and finer. Returns the id of the new variant.
pub fn create_variant(
    c: &mut Collections,
    meta_id: &str,
    from_id: &str,
    level: RTLevel,
    mut stop_times: Vec<StopTime>,
    base_days: Days,
    impact_uri: &str,
) -> Result<String> {
    let from = c
        .vehicle_journeys
        .get(from_id)
        .ok_or_else(|| anyhow!("vehicle journey '{}' not found", from_id))?
        .clone();
    let nb_created_variants = c
        .meta_vehicle_journeys
        .get(meta_id)
        .map(|meta| meta.nb_created_variants)
        .ok_or_else(|| anyhow!("meta vehicle journey '{}' not found", meta_id))?;
    let shift = normalize_stop_times(&mut stop_times);
    let id = format!(
        "{}:{}:{}:{}",
        from.id, level, nb_created_variants, impact_uri
    );

    mask_variants(c, meta_id, level, base_days)?;

    let beginning_date = from.base_validity_pattern().beginning_date;
    let validity_pattern = ValidityPattern::with_days(beginning_date, base_days << shift as usize);
    let variant = VehicleJourney::variant(
        &from,
        id.clone(),
        level,
        shift,
        stop_times,
        validity_pattern,
    );
    c.vehicle_journeys.push(variant)?;
    if let Some(mut meta) = c.meta_vehicle_journeys.get_mut(meta_id) {
        meta.nb_created_variants += 1;
        meta.vehicle_journey_ids.push(id.clone());
    }
    debug!("vehicle journey '{}' created from '{}'", id, from_id);
    Ok(id)
}

/// Remove the variants of the meta vehicle journey not circulating at any
/// level anymore. Base vehicle journeys are always kept.
pub fn clean_up_useless_vjs(c: &mut Collections, meta_id: &str) -> Result<()> {
    let useless: BTreeSet<String> = variant_ids(c, meta_id)?
        .into_iter()
        .filter(|id| {
            c.vehicle_journeys
                .get(id)
                .map(|vj| vj.realtime_level != RTLevel::Base && vj.is_useless())
                .unwrap_or(false)
        })
        .collect();
    c.remove_vehicle_journeys(&useless);
    Ok(())
}

/// Bring the meta vehicle journey back to its base schedule: the derived
/// variants are removed and the base vehicle journeys circulate at every
/// level as in the base schedule.
pub fn reset_to_base(c: &mut Collections, meta_id: &str) -> Result<()> {
    let mut derived = BTreeSet::new();
    for vj_id in variant_ids(c, meta_id)? {
        let mut vj = match c.vehicle_journeys.get_mut(&vj_id) {
            Some(vj) => vj,
            None => continue,
        };
        if vj.realtime_level != RTLevel::Base {
            derived.insert(vj_id);
            continue;
        }
        let base = *vj.base_validity_pattern();
        *vj.validity_pattern_at_mut(RTLevel::Adapted) = base;
        *vj.validity_pattern_at_mut(RTLevel::RealTime) = base;
    }
    c.remove_vehicle_journeys(&derived);
    if let Some(mut meta) = c.meta_vehicle_journeys.get_mut(meta_id) {
        meta.impacted_by.clear();
        meta.nb_created_variants = 0;
    }
    Ok(())
}

/// The base vehicle journeys of a meta vehicle journey.
pub fn base_vehicle_journeys<'a>(
    c: &'a Collections,
    meta: &'a MetaVehicleJourney,
) -> impl Iterator<Item = &'a VehicleJourney> + 'a {
    c.variants_of(meta)
        .filter(|vj| vj.realtime_level == RTLevel::Base)
}

/// The variant circulating at `level` when the base vehicle journey
/// circulates on `date`, the most recent variant being preferred.
pub fn get_base_vj_circulating_at_date<'a>(
    c: &'a Collections,
    meta: &'a MetaVehicleJourney,
    level: RTLevel,
    date: NaiveDate,
) -> Option<&'a VehicleJourney> {
    let variants: Vec<&VehicleJourney> = c.variants_of(meta).collect();
    variants
        .into_iter()
        .rev()
        .find(|vj| vj.is_active(level, date + Duration::days(i64::from(vj.shift))))
}
