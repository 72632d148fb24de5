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

//! Removal of an applied disruption.
//!
//! The meta vehicle journeys concerned by the disruption are brought back
//! to their base schedule, then the impacts of the other disruptions still
//! applied on them are applied again, in their order of application.

use crate::apply_disruption::apply_impact;
use crate::disruption::ImpactHandle;
use crate::meta_vehicle_journey::reset_to_base;
use crate::model::Model;
use crate::Result;
use skip_error::skip_error_and_warn;
use tracing::{debug, info};

/// Delete a disruption from the model and undo its impacts. Deleting an
/// unknown disruption does nothing.
pub fn delete_disruption(model: &mut Model, uri: &str) -> Result<()> {
    let (_, handles) = match model.disruptions.pop(uri) {
        Some(removed) => removed,
        None => {
            info!("disruption '{}' to delete not found", uri);
            return Ok(());
        }
    };
    debug!("deleting disruption '{}'", uri);
    let meta_ids: Vec<String> = model
        .meta_vehicle_journeys
        .values()
        .filter(|meta| meta.impacted_by.iter().any(|h| handles.contains(h)))
        .map(|meta| meta.id.clone())
        .collect();
    for meta_id in &meta_ids {
        skip_error_and_warn!(rebuild_meta_vehicle_journey(model, meta_id));
    }
    model.clean_weak_impacts();
    model.collections.reindex_vehicle_journeys()?;
    debug!(
        "disruption '{}' deleted, {} meta vehicle journeys rebuilt",
        uri,
        meta_ids.len()
    );
    Ok(())
}

fn rebuild_meta_vehicle_journey(model: &mut Model, meta_id: &str) -> Result<()> {
    let remaining: Vec<ImpactHandle> = model
        .meta_vehicle_journeys
        .get(meta_id)
        .map(|meta| {
            meta.impacted_by
                .iter()
                .copied()
                .filter(|h| model.disruptions.is_alive(*h))
                .collect()
        })
        .unwrap_or_default();
    reset_to_base(&mut model.collections, meta_id)?;
    for handle in remaining {
        apply_impact(model, handle, Some(meta_id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply_disruption::apply_disruption;
    use crate::disruption::{Disruption, Effect, Impact, Informed, Severity};
    use crate::model_builder::ModelBuilder;
    use crate::objects::RTLevel;
    use crate::time_periods::TimePeriod;
    use pretty_assertions::assert_eq;

    fn disruption(uri: &str, stop_area: &str) -> Disruption {
        let period = TimePeriod::new(
            "2020-01-01T00:00:00".parse().unwrap(),
            "2020-01-10T00:00:00".parse().unwrap(),
        )
        .unwrap();
        let impact = Impact {
            uri: uri.to_owned(),
            disruption_uri: String::new(),
            severity: Severity {
                effect: Effect::ReducedService,
                ..Default::default()
            },
            application_periods: vec![period],
            application_patterns: vec![],
            informed_entities: vec![Informed::StopArea(stop_area.to_owned())],
            aux_info: None,
        };
        Disruption::new(uri, "contributor", RTLevel::Adapted, period, vec![impact]).unwrap()
    }

    fn model() -> Model {
        ModelBuilder::default()
            .vj("vj:1", |vj| {
                vj.validity("11")
                    .st("A", "08:00:00", "08:00:00")
                    .st("B", "08:15:00", "08:15:00")
                    .st("C", "08:45:00", "08:45:00");
            })
            .build()
    }

    #[test]
    fn delete_unknown_disruption() {
        testing_logger::setup();
        let mut model = model();
        delete_disruption(&mut model, "unknown").unwrap();
        assert_eq!(1, model.vehicle_journeys.len());
        testing_logger::validate(|captured_logs| {
            let logs: Vec<_> = captured_logs
                .iter()
                .filter(|captured_log| captured_log.level == log::Level::Info)
                .collect();
            assert_eq!(1, logs.len());
            assert_eq!(logs[0].body, "disruption 'unknown' to delete not found");
        });
    }

    #[test]
    fn delete_restores_the_base_schedule() {
        let mut model = model();
        apply_disruption(&mut model, disruption("d1", "sa:B")).unwrap();
        assert_eq!(2, model.vehicle_journeys.len());

        delete_disruption(&mut model, "d1").unwrap();
        assert_eq!(1, model.vehicle_journeys.len());
        let base = model.vehicle_journeys.get("vj:1").unwrap();
        assert_eq!("11", base.adapted_validity_pattern().days.to_string());
        assert_eq!("11", base.rt_validity_pattern().days.to_string());
        assert!(model
            .get_impacts(model.stop_areas.get("sa:B").unwrap())
            .is_empty());
        assert!(model.stop_areas.get("sa:B").unwrap().impacts.is_empty());
        assert!(model
            .meta_vehicle_journeys
            .get("vj:1")
            .unwrap()
            .impacted_by
            .is_empty());
        model.check_consistency().unwrap();
    }

    #[test]
    fn delete_keeps_the_other_disruptions() {
        let mut model = model();
        apply_disruption(&mut model, disruption("d1", "sa:B")).unwrap();
        apply_disruption(&mut model, disruption("d2", "sa:C")).unwrap();
        assert!(model.vehicle_journeys.contains_id("vj:1:Adapted:0:d1:Adapted:1:d2"));

        delete_disruption(&mut model, "d1").unwrap();
        assert_eq!(2, model.vehicle_journeys.len());
        let variant = model.vehicle_journeys.get("vj:1:Adapted:0:d2").unwrap();
        assert_eq!(2, variant.stop_times.len());
        assert_eq!("11", variant.adapted_validity_pattern().days.to_string());
        assert_eq!(1, model.get_impacts(model.meta_vehicle_journeys.get("vj:1").unwrap()).len());
        model.check_consistency().unwrap();
    }
}
