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

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pretty_assertions::assert_eq;
use transit_realtime::{
    apply_disruption::apply_disruption,
    delete_disruption::delete_disruption,
    disruption::{
        BlockedStopArea, Disruption, Effect, Impact, Informed, LineSection, RailSection, Severity,
    },
    model_builder::ModelBuilder,
    objects::RTLevel,
    time_periods::{ApplicationPattern, TimePeriod, TimeSlot},
    topology::stop_areas_of,
    Model,
};

fn dt(s: &str) -> NaiveDateTime {
    s.parse().unwrap()
}

fn period(start: &str, end: &str) -> TimePeriod {
    TimePeriod::new(dt(start), dt(end)).unwrap()
}

fn impact(uri: &str, effect: Effect, informed: Informed, periods: Vec<TimePeriod>) -> Impact {
    Impact {
        uri: uri.to_owned(),
        disruption_uri: String::new(),
        severity: Severity {
            effect,
            ..Default::default()
        },
        application_periods: periods,
        application_patterns: vec![],
        informed_entities: vec![informed],
        aux_info: None,
    }
}

fn disruption(uri: &str, impact: Impact) -> Disruption {
    Disruption::new(
        uri,
        "chaos",
        RTLevel::Adapted,
        period("2020-01-01T00:00:00", "2020-03-01T00:00:00"),
        vec![impact],
    )
    .unwrap()
}

fn whole_month() -> Vec<TimePeriod> {
    vec![period("2020-01-01T00:00:00", "2020-02-01T00:00:00")]
}

fn reduced_service_on(uri: &str, stop_area: &str) -> Disruption {
    disruption(
        uri,
        impact(
            uri,
            Effect::ReducedService,
            Informed::StopArea(stop_area.to_owned()),
            whole_month(),
        ),
    )
}

fn adapted_days(model: &Model, vj_id: &str) -> String {
    model
        .vehicle_journeys
        .get(vj_id)
        .unwrap()
        .adapted_validity_pattern()
        .days
        .to_string()
}

fn stop_areas(model: &Model, vj_id: &str) -> Vec<String> {
    let vj = model.vehicle_journeys.get(vj_id).unwrap();
    stop_areas_of(model, vj)
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn four_stops_model() -> Model {
    ModelBuilder::default()
        .vj("vj:1", |vj| {
            vj.validity("111111")
                .st("stop1", "08:00:00", "08:00:00")
                .st("stop2", "08:15:00", "08:15:00")
                .st("stop3", "08:45:00", "08:45:00")
                .st("stop4", "09:00:00", "09:00:00");
        })
        .build()
}

// Days are written from day 0: the visit of stop3 at 08:45 is covered on
// days 0, 1 and 5.
#[test]
fn no_service_on_a_stop_during_some_periods() {
    let mut model = four_stops_model();
    let no_service = disruption(
        "d",
        impact(
            "d",
            Effect::NoService,
            Informed::StopPoint("stop3".to_owned()),
            vec![
                period("2020-01-01T07:00:00", "2020-01-03T06:00:00"),
                period("2020-01-03T23:00:00", "2020-01-04T06:00:00"),
                period("2020-01-06T08:30:00", "2020-01-06T09:30:00"),
            ],
        ),
    );
    apply_disruption(&mut model, no_service).unwrap();

    assert_eq!(2, model.vehicle_journeys.len());
    assert_eq!("001110", adapted_days(&model, "vj:1"));
    let base = model.vehicle_journeys.get("vj:1").unwrap();
    assert_eq!("111111", base.base_validity_pattern().days.to_string());
    assert_eq!("001110", base.rt_validity_pattern().days.to_string());
    assert_eq!("110001", adapted_days(&model, "vj:1:Adapted:0:d"));
    assert_eq!(
        vec!["sa:stop1", "sa:stop2"],
        stop_areas(&model, "vj:1:Adapted:0:d")
    );
    model.check_consistency().unwrap();

    delete_disruption(&mut model, "d").unwrap();
    assert_eq!(1, model.vehicle_journeys.len());
    assert_eq!("111111", adapted_days(&model, "vj:1"));
    model.check_consistency().unwrap();
}

#[test]
fn line_section_on_a_loop_keeps_the_other_visit() {
    let mut model = ModelBuilder::default()
        .vj("vj:1", |vj| {
            vj.st("A", "08:00:00", "08:00:00")
                .st("B", "08:10:00", "08:10:00")
                .st("C", "08:20:00", "08:20:00")
                .st("B", "08:30:00", "08:30:00")
                .st("D", "08:40:00", "08:40:00");
        })
        .build();
    apply_disruption(&mut model, line_section("d", "sa:B", "sa:C")).unwrap();

    assert_eq!(
        vec!["sa:A", "sa:B", "sa:D"],
        stop_areas(&model, "vj:1:Adapted:0:d")
    );
    assert_eq!("0", adapted_days(&model, "vj:1"));
    model.check_consistency().unwrap();
}

#[test]
fn rail_section_only_impacts_the_exact_path() {
    let mut model = ModelBuilder::default()
        .route("R1", |r| r.line_id = "L".to_owned())
        .route("R2", |r| r.line_id = "L".to_owned())
        .vj("vj:1", |vj| {
            vj.route("R1")
                .st("A", "08:00:00", "08:00:00")
                .st("B", "08:10:00", "08:10:00")
                .st("C", "08:20:00", "08:20:00")
                .st("D", "08:30:00", "08:30:00");
        })
        .vj("vj:2", |vj| {
            vj.route("R2")
                .st("A", "09:00:00", "09:00:00")
                .st("E", "09:10:00", "09:10:00")
                .st("D", "09:30:00", "09:30:00");
        })
        .build();
    let section = RailSection {
        line_id: "L".to_owned(),
        start_stop_area_id: "sa:A".to_owned(),
        end_stop_area_id: "sa:D".to_owned(),
        blocked_stop_areas: vec![
            BlockedStopArea {
                id: "sa:C".to_owned(),
                order: 5,
            },
            BlockedStopArea {
                id: "sa:B".to_owned(),
                order: 2,
            },
        ],
        route_ids: vec![],
    };
    apply_disruption(
        &mut model,
        disruption(
            "d",
            impact(
                "d",
                Effect::ReducedService,
                Informed::RailSection(section),
                whole_month(),
            ),
        ),
    )
    .unwrap();

    assert_eq!(3, model.vehicle_journeys.len());
    assert_eq!(vec!["sa:A", "sa:D"], stop_areas(&model, "vj:1:Adapted:0:d"));
    assert_eq!("1111111", adapted_days(&model, "vj:2"));
    assert!(model
        .meta_vehicle_journeys
        .get("vj:2")
        .unwrap()
        .impacted_by
        .is_empty());
    model.check_consistency().unwrap();
}

#[test]
fn chained_disruptions_and_deletion_of_the_last_one() {
    let mut model = four_stops_model();
    apply_disruption(&mut model, reduced_service_on("d1", "sa:stop2")).unwrap();
    apply_disruption(&mut model, reduced_service_on("d2", "sa:stop3")).unwrap();
    assert_eq!(
        vec!["sa:stop1", "sa:stop4"],
        stop_areas(&model, "vj:1:Adapted:0:d1:Adapted:1:d2")
    );
    assert_eq!("111111", adapted_days(&model, "vj:1:Adapted:0:d1:Adapted:1:d2"));
    assert!(!model.vehicle_journeys.contains_id("vj:1:Adapted:0:d1"));

    delete_disruption(&mut model, "d2").unwrap();
    assert_eq!(2, model.vehicle_journeys.len());
    assert_eq!(
        vec!["sa:stop1", "sa:stop3", "sa:stop4"],
        stop_areas(&model, "vj:1:Adapted:0:d1")
    );
    assert_eq!("111111", adapted_days(&model, "vj:1:Adapted:0:d1"));

    delete_disruption(&mut model, "d1").unwrap();
    assert_eq!(1, model.vehicle_journeys.len());
    assert_eq!("111111", adapted_days(&model, "vj:1"));
    model.check_consistency().unwrap();
}

#[test]
fn applying_twice_is_applying_once() {
    let mut once = four_stops_model();
    apply_disruption(&mut once, reduced_service_on("d", "sa:stop2")).unwrap();
    let mut twice = four_stops_model();
    apply_disruption(&mut twice, reduced_service_on("d", "sa:stop2")).unwrap();
    apply_disruption(&mut twice, reduced_service_on("d", "sa:stop2")).unwrap();

    let ids = |model: &Model| -> Vec<String> {
        model
            .vehicle_journeys
            .values()
            .map(|vj| format!("{} {}", vj.id, vj.adapted_validity_pattern().days))
            .collect()
    };
    assert_eq!(ids(&once), ids(&twice));
    assert_eq!(1, twice.disruptions().len());
    twice.check_consistency().unwrap();
}

#[test]
fn disruptions_only_remove_days() {
    let mut model = four_stops_model();
    apply_disruption(&mut model, reduced_service_on("d1", "sa:stop2")).unwrap();
    apply_disruption(
        &mut model,
        disruption(
            "d2",
            impact(
                "d2",
                Effect::NoService,
                Informed::Line("default_line".to_owned()),
                vec![period("2020-01-03T00:00:00", "2020-01-04T00:00:00")],
            ),
        ),
    )
    .unwrap();
    for vj in model.vehicle_journeys.values() {
        let base = vj.base_validity_pattern().days;
        let adapted = vj.adapted_validity_pattern().days;
        let rt = vj.rt_validity_pattern().days;
        if vj.realtime_level == RTLevel::Base {
            assert!((adapted & !base).none());
        }
        assert!((rt & !adapted).none());
    }
    assert_eq!("110111", adapted_days(&model, "vj:1:Adapted:0:d1"));
    model.check_consistency().unwrap();
}

#[test]
fn application_pattern_restricts_the_periods() {
    let mut model = ModelBuilder::default()
        .vj("vj:1", |vj| {
            vj.validity("11111111111111")
                .st("A", "08:00:00", "08:00:00")
                .st("B", "08:15:00", "08:15:00")
                .st("C", "08:45:00", "08:45:00");
        })
        .build();
    let slot = TimeSlot {
        begin: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    };
    // thursdays only, 2020-01-02 is a thursday
    let pattern = ApplicationPattern::new(
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2020, 1, 14).unwrap(),
        [false, false, false, true, false, false, false],
        vec![slot],
    )
    .unwrap();
    let mut reduced = impact(
        "d",
        Effect::ReducedService,
        Informed::StopArea("sa:B".to_owned()),
        whole_month(),
    );
    reduced.application_patterns = vec![pattern];
    apply_disruption(&mut model, disruption("d", reduced)).unwrap();

    assert_eq!("10111111011111", adapted_days(&model, "vj:1"));
    assert_eq!("010000001", adapted_days(&model, "vj:1:Adapted:0:d"));
    model.check_consistency().unwrap();
}

#[test]
fn impacts_are_recorded_on_informed_objects() {
    let mut model = four_stops_model();
    apply_disruption(&mut model, reduced_service_on("d", "sa:stop2")).unwrap();
    let impacts = model.get_impacts(model.stop_areas.get("sa:stop2").unwrap());
    assert_eq!(1, impacts.len());
    assert_eq!("d", impacts[0].uri);
    assert_eq!("d", impacts[0].disruption_uri);
    let variant = model.vehicle_journeys.get("vj:1:Adapted:0:d").unwrap();
    assert_eq!(1, model.get_vehicle_journey_impacts(variant).len());
    assert!(model
        .get_impacts(model.stop_areas.get("sa:stop3").unwrap())
        .is_empty());
}

fn line_section(uri: &str, start: &str, end: &str) -> Disruption {
    let section = LineSection {
        line_id: "default_line".to_owned(),
        start_stop_area_id: start.to_owned(),
        end_stop_area_id: end.to_owned(),
        route_ids: vec![],
    };
    disruption(
        uri,
        impact(
            uri,
            Effect::ReducedService,
            Informed::LineSection(section),
            whole_month(),
        ),
    )
}

#[test]
fn two_line_sections_on_the_same_journey() {
    let mut model = ModelBuilder::default()
        .vj("vj:1", |vj| {
            vj.st("A", "08:00:00", "08:00:00")
                .st("B", "08:10:00", "08:10:00")
                .st("C", "08:20:00", "08:20:00")
                .st("D", "08:30:00", "08:30:00")
                .st("E", "08:40:00", "08:40:00")
                .st("F", "08:50:00", "08:50:00")
                .st("G", "09:00:00", "09:00:00");
        })
        .build();
    apply_disruption(&mut model, line_section("d1", "sa:B", "sa:C")).unwrap();
    apply_disruption(&mut model, line_section("d2", "sa:E", "sa:F")).unwrap();

    assert_eq!(2, model.vehicle_journeys.len());
    assert_eq!(
        vec!["sa:A", "sa:D", "sa:G"],
        stop_areas(&model, "vj:1:Adapted:0:d1:Adapted:1:d2")
    );

    delete_disruption(&mut model, "d1").unwrap();
    assert_eq!(2, model.vehicle_journeys.len());
    assert_eq!(
        vec!["sa:A", "sa:B", "sa:C", "sa:D", "sa:G"],
        stop_areas(&model, "vj:1:Adapted:0:d2")
    );
    assert_eq!("1111111", adapted_days(&model, "vj:1:Adapted:0:d2"));
    assert_eq!("0", adapted_days(&model, "vj:1"));
    model.check_consistency().unwrap();
}

// On a derived variant, a stop time is found back from the stop point and
// the departure time: of two visits of B leaving at 08:10, the first one
// is always picked, even when the second one is concerned.
#[test]
fn same_stop_leaving_twice_at_the_same_time() {
    let mut model = ModelBuilder::default()
        .vj("vj:1", |vj| {
            vj.st("A", "08:00:00", "08:00:00")
                .st("B", "08:05:00", "08:10:00")
                .st("X", "08:10:00", "08:10:00")
                .st("B", "08:10:00", "08:10:00")
                .st("D", "08:30:00", "08:30:00");
        })
        .build();
    apply_disruption(&mut model, reduced_service_on("d1", "sa:A")).unwrap();
    apply_disruption(&mut model, line_section("d2", "sa:X", "sa:B")).unwrap();

    let variant = model
        .vehicle_journeys
        .get("vj:1:Adapted:0:d1:Adapted:1:d2")
        .unwrap();
    assert_eq!(vec!["sa:B", "sa:D"], stop_areas(&model, &variant.id));
    // the visit of B arriving at 08:05 is the one removed
    assert_eq!("08:10:00", variant.stop_times[0].arrival_time.to_string());
    model.check_consistency().unwrap();
}

#[test]
fn line_section_impact_is_recorded_on_the_stops_in_between() {
    let mut model = ModelBuilder::default()
        .vj("vj:1", |vj| {
            vj.st("A", "08:00:00", "08:00:00")
                .st("B", "08:10:00", "08:10:00")
                .st("C", "08:20:00", "08:20:00")
                .st("D", "08:30:00", "08:30:00")
                .st("E", "08:40:00", "08:40:00");
        })
        .build();
    apply_disruption(&mut model, line_section("d", "sa:B", "sa:D")).unwrap();

    let impacts = model.get_impacts(model.stop_areas.get("sa:C").unwrap());
    assert_eq!(1, impacts.len());
    assert_eq!("d", impacts[0].uri);
    assert_eq!(1, model.get_impacts(model.stop_points.get("C").unwrap()).len());
    assert_eq!(1, model.get_impacts(model.stop_areas.get("sa:B").unwrap()).len());
    assert!(model
        .get_impacts(model.stop_areas.get("sa:A").unwrap())
        .is_empty());
    assert!(model
        .get_impacts(model.stop_points.get("E").unwrap())
        .is_empty());

    delete_disruption(&mut model, "d").unwrap();
    assert!(model
        .get_impacts(model.stop_areas.get("sa:C").unwrap())
        .is_empty());
    assert!(model
        .get_impacts(model.stop_points.get("C").unwrap())
        .is_empty());
    model.check_consistency().unwrap();
}

// The variant created by d1 runs after midnight only, so its days are one
// day later than the days of the base vehicle journey.
#[test]
fn disruption_on_a_variant_running_after_midnight() {
    let mut model = ModelBuilder::default()
        .vj("vj:1", |vj| {
            vj.validity("111111")
                .st("A", "23:00:00", "23:00:00")
                .st("B", "24:30:00", "24:30:00")
                .st("C", "25:00:00", "25:00:00")
                .st("D", "25:30:00", "25:30:00");
        })
        .build();
    apply_disruption(&mut model, reduced_service_on("d1", "sa:A")).unwrap();
    let after_midnight = model.vehicle_journeys.get("vj:1:Adapted:0:d1").unwrap();
    assert_eq!(1, after_midnight.shift);
    assert_eq!("00:30:00", after_midnight.stop_times[0].arrival_time.to_string());
    assert_eq!("0111111", adapted_days(&model, "vj:1:Adapted:0:d1"));
    assert_eq!("0", adapted_days(&model, "vj:1"));
    model.check_consistency().unwrap();

    // only the circulation leaving on 2020-01-02 visits C during the period
    let d2 = disruption(
        "d2",
        impact(
            "d2",
            Effect::ReducedService,
            Informed::StopArea("sa:C".to_owned()),
            vec![period("2020-01-03T00:30:00", "2020-01-03T01:30:00")],
        ),
    );
    apply_disruption(&mut model, d2).unwrap();
    assert_eq!(3, model.vehicle_journeys.len());
    let variant_id = "vj:1:Adapted:0:d1:Adapted:1:d2";
    assert_eq!(vec!["sa:B", "sa:D"], stop_areas(&model, variant_id));
    assert_eq!(1, model.vehicle_journeys.get(variant_id).unwrap().shift);
    assert_eq!("001", adapted_days(&model, variant_id));
    assert_eq!("0101111", adapted_days(&model, "vj:1:Adapted:0:d1"));
    model.check_consistency().unwrap();

    delete_disruption(&mut model, "d1").unwrap();
    assert_eq!(2, model.vehicle_journeys.len());
    assert_eq!(
        vec!["sa:A", "sa:B", "sa:D"],
        stop_areas(&model, "vj:1:Adapted:0:d2")
    );
    assert_eq!(0, model.vehicle_journeys.get("vj:1:Adapted:0:d2").unwrap().shift);
    assert_eq!("01", adapted_days(&model, "vj:1:Adapted:0:d2"));
    assert_eq!("101111", adapted_days(&model, "vj:1"));
    model.check_consistency().unwrap();
}
