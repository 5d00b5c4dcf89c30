//! End-to-end scenarios over the public API
//!
//! Small synthetic routes with hand-checked lengths: one millidegree of
//! latitude is about 111.195 m on the spherical Earth model, which makes
//! every expected distance below easy to verify on paper.

use std::path::Path;

use linetrack::{
    assemble, artifacts, Coord, Fix, ManeuverKind, ManeuverPlan, Route, Stop, StopRole, Tracker,
    TurnParams, Way,
};

fn way(id: &str, ids: &[&str], coords: &[(f64, f64)]) -> Way {
    Way::new(
        id,
        ids.iter().map(|s| s.to_string()).collect(),
        coords.iter().map(|&(lon, lat)| Coord(lon, lat)).collect(),
    )
}

fn tight_params() -> TurnParams {
    TurnParams {
        step: 1,
        lookback: 1,
        lookahead: 1,
        min_turn_deg: 40.0,
    }
}

/// S1: a single straight way of one millidegree of latitude.
#[test]
fn straight_segment_length_and_projection() {
    let built = assemble(
        vec![way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)])],
        Vec::new(),
    )
    .unwrap();

    assert!((built.route.length() - 111.195).abs() < 0.01);

    let projection = built.route.project(Coord(0.0, 0.0005)).unwrap();
    assert!((projection.distance_from_start - 55.597).abs() < 0.01);
    assert!(projection.lateral_deviation_m.abs() < 1e-6);
}

/// S2: an L-shaped chain produces one right turn at the corner.
#[test]
fn l_shaped_chain_detects_single_right_turn() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
        ],
        Vec::new(),
    )
    .unwrap();

    assert!((built.route.length() - 222.39).abs() < 0.01);

    let plan = ManeuverPlan::build(
        &built.route,
        &built.stops,
        &tight_params(),
        built.route.length(),
    );
    let turns: Vec<_> = plan
        .maneuvers()
        .iter()
        .filter(|m| matches!(m.kind, ManeuverKind::Turn { .. }))
        .collect();
    assert_eq!(turns.len(), 1);
    assert!((turns[0].distance_from_start - 111.195).abs() < 0.01);
    match &turns[0].kind {
        ManeuverKind::Turn { side, .. } => {
            assert_eq!(format!("{:?}", side), "Right");
        }
        _ => unreachable!(),
    }
}

/// S3: the second way arrives reversed; the stitcher orients it and the
/// route length matches S2.
#[test]
fn reversed_way_is_oriented_by_the_stitcher() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["3", "2"], &[(0.001, 0.001), (0.0, 0.001)]),
        ],
        Vec::new(),
    )
    .unwrap();

    assert_eq!(built.reversed_count, 1);
    let second = &built.route.ways()[1];
    assert!(second.reversed);
    assert_eq!(second.start_node, "2");
    assert!((built.route.length() - 222.39).abs() < 0.01);
}

/// S4: stops indexed along the L-shaped route, with neighbour queries.
#[test]
fn stops_are_indexed_and_queried() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
        ],
        vec![
            Stop::new("s1", StopRole::Stop, Coord(0.0, 0.0005)),
            Stop::new("s2", StopRole::Stop, Coord(0.0005, 0.001)),
        ],
    )
    .unwrap();

    let stops = built.stops.stops();
    assert!((stops[0].distance() - 55.597).abs() < 0.01);
    assert!((stops[1].distance() - 166.792).abs() < 0.01);

    assert_eq!(built.stops.previous(120.0).unwrap().id, stops[0].id);
    assert_eq!(built.stops.next(120.0).unwrap().id, stops[1].id);
}

/// S5: an off-route fix projects back onto the polyline with a lateral
/// deviation on the order of 0.0001 deg x 111 000 m.
#[test]
fn off_route_fix_reports_lateral_deviation() {
    let built = assemble(
        vec![way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)])],
        Vec::new(),
    )
    .unwrap();

    let projection = built.route.project(Coord(0.0001, 0.0005)).unwrap();
    assert!((projection.distance_from_start - 55.597).abs() < 0.01);
    assert!((projection.lateral_deviation_m - 11.12).abs() < 0.1);
}

/// S6: distance queries beyond the route clamp to the last way.
#[test]
fn segment_query_clamps_past_the_route_end() {
    let built = assemble(
        vec![way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)])],
        Vec::new(),
    )
    .unwrap();

    let segment = built.route.segment_at(1_000_000.0).unwrap();
    assert_eq!(segment.way_index, built.route.ways().len() - 1);
    assert!((segment.pct - 100.0).abs() < 1e-9);
    assert!(segment.clamped);
}

/// A full fix-to-state pass through the tracker over the S4 fixture.
#[test]
fn tracker_composes_projection_stops_and_hint() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
        ],
        vec![
            Stop::new("s1", StopRole::Stop, Coord(0.0, 0.0005)),
            Stop::new("s2", StopRole::Stop, Coord(0.0005, 0.001)),
        ],
    )
    .unwrap();
    let plan = ManeuverPlan::build(
        &built.route,
        &built.stops,
        &tight_params(),
        built.route.length(),
    );

    let mut tracker = Tracker::new(&built.route, &built.stops, &plan);
    // lat 0.0009, lon 0.00002: near the end of the first leg
    let state = tracker.update(Fix::at(0.0009, 0.00002)).unwrap();

    assert_eq!(state.segment.way_id, "a");
    assert_eq!(state.previous_stop.as_ref().unwrap().id, "s1");
    assert_eq!(state.next_stop.as_ref().unwrap().id, "s2");
    assert!(state.progress_pct > 40.0 && state.progress_pct < 50.0);
    let hint = state.maneuver_hint.unwrap();
    assert!(hint.distance_m > 0.0);
    assert!(hint.instruction.contains("Turn"));
}

/// Artifacts written by one session can seed the next: ways and stops
/// round-trip through disk, and the summary length takes precedence.
#[test]
fn artifact_round_trip_rebuilds_the_route() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["3", "2"], &[(0.001, 0.001), (0.0, 0.001)]),
        ],
        vec![Stop::new("s1", StopRole::Stop, Coord(0.0, 0.0005))],
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let ways_path = dir.path().join("relation_7_ways_ordered.json");
    let stops_path = dir.path().join("relation_7_stops.json");
    let summary_path = dir.path().join("relation_7_summary.txt");

    artifacts::write_ways_ordered(&ways_path, built.route.ways()).unwrap();
    artifacts::write_stops(&stops_path, built.stops.stops()).unwrap();
    artifacts::write_summary(
        &summary_path,
        "7",
        built.route.ways(),
        built.stops.stops(),
        // A canonical length that differs from the computed one
        500.0,
    )
    .unwrap();

    let (rebuilt, reference) = linetrack::load_from_artifacts(&ways_path, &stops_path).unwrap();
    assert!((rebuilt.route.length() - built.route.length()).abs() < 1e-6);
    assert_eq!(rebuilt.stops.len(), 1);
    assert_eq!(reference, Some(500.0));

    // Orientation survives the round trip
    assert!(rebuilt.route.ways()[1].reversed);
    assert_eq!(rebuilt.reversed_count, 0);
}

/// Stops can come from the summary file alone; distances are trusted.
#[test]
fn summary_file_stands_in_for_stops_json() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
        ],
        vec![
            Stop::new("s1", StopRole::Stop, Coord(0.0, 0.0005)),
            Stop::new("s2", StopRole::Stop, Coord(0.0005, 0.001)),
        ],
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let ways_path = dir.path().join("relation_9_ways_ordered.json");
    let summary_path = dir.path().join("relation_9_summary.txt");
    artifacts::write_ways_ordered(&ways_path, built.route.ways()).unwrap();
    artifacts::write_summary(
        &summary_path,
        "9",
        built.route.ways(),
        built.stops.stops(),
        built.route.length(),
    )
    .unwrap();

    let (rebuilt, _) = linetrack::load_from_artifacts(&ways_path, &summary_path).unwrap();
    assert_eq!(rebuilt.stops.len(), 2);
    assert!((rebuilt.stops.stops()[0].distance() - 55.597).abs() < 0.01);
    assert!(rebuilt.stops.stops()[0].position.is_none());
}

/// GeoJSON alone is enough to rebuild geometry and stops.
#[test]
fn geojson_alone_rebuilds_the_route() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
        ],
        vec![Stop::new("s1", StopRole::Stop, Coord(0.0, 0.0005))],
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let geojson_path = dir.path().join("relation_11.geojson");
    artifacts::write_geojson(&geojson_path, built.route.ways(), built.stops.stops()).unwrap();

    let (rebuilt, _) = linetrack::load_from_artifacts(&geojson_path, &geojson_path).unwrap();
    assert!((rebuilt.route.length() - built.route.length()).abs() < 0.01);
    assert_eq!(rebuilt.stops.len(), 1);
    assert!((rebuilt.stops.stops()[0].distance() - 55.597).abs() < 0.01);
}

/// Loop ways sort after every chain segment, whatever the input order.
#[test]
fn loops_always_trail_the_chain() {
    let built = assemble(
        vec![
            way(
                "turnaround",
                &["9", "8", "9"],
                &[(0.002, 0.002), (0.002, 0.003), (0.002, 0.002)],
            ),
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.0, 0.002)]),
        ],
        Vec::new(),
    )
    .unwrap();

    let ids: Vec<&str> = built.route.ways().iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "turnaround"]);
}

/// Building straight from a relation document, the way `fetch` does.
#[test]
fn relation_document_to_route() {
    let xml = r#"<osm>
  <node id="1" lat="0.0" lon="0.0"/>
  <node id="2" lat="0.001" lon="0.0"/>
  <node id="3" lat="0.001" lon="0.001"/>
  <node id="20" lat="0.0005" lon="0.0">
    <tag k="name" v="Midpoint"/>
  </node>
  <way id="100"><nd ref="1"/><nd ref="2"/></way>
  <way id="101"><nd ref="3"/><nd ref="2"/></way>
  <relation id="42">
    <member type="way" ref="100" role=""/>
    <member type="way" ref="101" role=""/>
    <member type="node" ref="20" role="stop"/>
    <tag k="ref" v="22"/>
  </relation>
</osm>"#;

    let parsed = linetrack::parse_relation(xml).unwrap();
    assert_eq!(parsed.meta.line_ref, "22");
    let built = assemble(parsed.ways, parsed.stops).unwrap();

    assert!((built.route.length() - 222.39).abs() < 0.01);
    assert_eq!(built.reversed_count, 1);
    assert_eq!(built.stops.len(), 1);
    assert_eq!(built.stops.stops()[0].name.as_deref(), Some("Midpoint"));

    // Directory naming for this relation falls back where tags are missing
    let paths = artifacts::ArtifactPaths::layout(Path::new("out"), &parsed.meta);
    assert_eq!(
        paths.dir,
        Path::new("out/unknown_network/22_unknown_from_unknown_to")
    );
}

/// Route and StopIndex stay immutable under tracker queries: two trackers
/// over the same structures see identical results.
#[test]
fn shared_structures_serve_multiple_trackers() {
    let built = assemble(
        vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
        ],
        vec![Stop::new("s1", StopRole::Stop, Coord(0.0, 0.0005))],
    )
    .unwrap();
    let plan = ManeuverPlan::build(
        &built.route,
        &built.stops,
        &tight_params(),
        built.route.length(),
    );

    let mut first = Tracker::new(&built.route, &built.stops, &plan);
    let mut second = Tracker::new(&built.route, &built.stops, &plan);

    let a = first.update(Fix::at(0.0007, 0.0)).unwrap();
    let b = second.update(Fix::at(0.0007, 0.0)).unwrap();
    assert_eq!(a.distance_from_start, b.distance_from_start);
    assert_eq!(a.progress_pct, b.progress_pct);
}

/// The arc-length parameterization inverts projection along the route.
#[test]
fn point_at_inverts_projection() {
    let route = Route::from_ways(vec![
        way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
        way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
    ])
    .unwrap();

    for distance in [0.0, 30.0, 111.195, 180.0, 222.0] {
        let point = route.point_at(distance);
        let projection = route.project(point).unwrap();
        assert!(
            (projection.distance_from_start - distance).abs() < 0.01,
            "distance {}",
            distance
        );
    }
}
