//! # linetrack
//!
//! Transit-route linearization and live vehicle tracking over OpenStreetMap
//! relations.
//!
//! A public-transit route in OSM is a relation: an unordered bag of way
//! segments plus stop nodes. linetrack stitches those ways into a single
//! oriented polyline with a cumulative arc-length table, projects the stops
//! onto it, extracts turn-by-turn maneuvers, and then matches a live
//! WebSocket feed of vehicle positions against the result.
//!
//! ```no_run
//! # async fn demo() -> linetrack::Result<()> {
//! let xml = linetrack::RelationSource::new().fetch("15023534").await?;
//! let parsed = linetrack::parse_relation(&xml)?;
//! let built = linetrack::assemble(parsed.ways, parsed.stops)?;
//! println!("route length: {:.0} m", built.route.length());
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::artifacts;
pub use crate::core::error::{Error, Result};
pub use crate::core::fixloop::{FixLoop, FixLoopConfig, FixStream, LoopState, VehicleRecord};
pub use crate::core::geo::{self, Coord};
pub use crate::core::maneuver::{format_distance, Maneuver, ManeuverKind, ManeuverPlan, TurnParams};
pub use crate::core::relation::{
    parse_relation, ParsedRelation, RelationConfig, RelationMeta, RelationSource,
};
pub use crate::core::route::{Projection, Route, SegmentLocation};
pub use crate::core::stitch::{stitch, StitchOutcome};
pub use crate::core::stops::{Stop, StopIndex, StopRole};
pub use crate::core::tracker::{Fix, NavigationState, Tracker};
pub use crate::core::wayset::{Way, WaySet};

/// A route assembled from raw ways and stops: stitched geometry, indexed
/// stops, and the stitching counters.
#[derive(Debug, Clone)]
pub struct BuiltRoute {
    pub route: Route,
    pub stops: StopIndex,
    pub reversed_count: usize,
    pub discontinuities: usize,
}

/// Stitches raw ways and indexes stops against the resulting route.
///
/// This is the whole of pipeline construction: WaySet, stitcher, route and
/// stop index in one call.
pub fn assemble(ways: Vec<Way>, stops: Vec<Stop>) -> Result<BuiltRoute> {
    let set = WaySet::new(ways);
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("way connectivity:\n{}", set.analyze());
    }
    let outcome = stitch(&set);
    let route = Route::from_ways(outcome.ways)?;
    let stops = StopIndex::build(stops, &route);
    Ok(BuiltRoute {
        route,
        stops,
        reversed_count: outcome.reversed_count,
        discontinuities: outcome.discontinuities,
    })
}

/// Rebuilds a route and stop index from persisted artifacts.
///
/// `ways_path` accepts ordered-ways JSON or GeoJSON; `stops_path` accepts
/// stops JSON, GeoJSON or a summary file. Returns the canonical total
/// length from the companion summary when one is present.
pub fn load_from_artifacts(
    ways_path: &std::path::Path,
    stops_path: &std::path::Path,
) -> Result<(BuiltRoute, Option<f64>)> {
    let ways = artifacts::load_ways(ways_path)?;
    let stops = artifacts::load_stops(stops_path)?;
    let built = assemble(ways, stops)?;

    let reference_length = artifacts::companion_summary_length(ways_path)
        .or_else(|| artifacts::companion_summary_length(stops_path));
    if let Some(length) = reference_length {
        log::info!(
            "using canonical route length {:.2} m from summary (computed {:.2} m)",
            length,
            built.route.length()
        );
    }

    Ok((built, reference_length))
}
