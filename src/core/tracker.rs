//! Per-fix navigation state
//!
//! The tracker is the read side of the pipeline: given a live position fix
//! it projects onto the route, locates the surrounding stops and the next
//! maneuver, and reports overall progress. It never mutates the route,
//! stop index or maneuver plan; its only state is the last result.

use serde::Serialize;

use crate::core::error::Result;
use crate::core::geo::Coord;
use crate::core::maneuver::ManeuverPlan;
use crate::core::route::{Route, SegmentLocation};
use crate::core::stops::{Stop, StopIndex};

/// A single live position report for a vehicle.
#[derive(Debug, Clone, Serialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brigade: Option<String>,
}

impl Fix {
    pub fn at(latitude: f64, longitude: f64) -> Fix {
        Fix {
            latitude,
            longitude,
            heading: None,
            speed: None,
            timestamp: None,
            line: None,
            brigade: None,
        }
    }

    /// The fix position in (lon, lat) order.
    pub fn coord(&self) -> Coord {
        Coord(self.longitude, self.latitude)
    }
}

/// A neighbour stop relative to the vehicle position.
#[derive(Debug, Clone, Serialize)]
pub struct StopContext {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub dist_from_start: f64,
    /// Meters between the vehicle and the stop, non-negative
    pub distance_to_vehicle: f64,
}

impl StopContext {
    fn behind(stop: &Stop, position: f64) -> StopContext {
        StopContext {
            id: stop.id.clone(),
            name: stop.name.clone(),
            dist_from_start: stop.distance(),
            distance_to_vehicle: (position - stop.distance()).max(0.0),
        }
    }

    fn ahead(stop: &Stop, position: f64) -> StopContext {
        StopContext {
            id: stop.id.clone(),
            name: stop.name.clone(),
            dist_from_start: stop.distance(),
            distance_to_vehicle: (stop.distance() - position).max(0.0),
        }
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// The upcoming maneuver relative to the vehicle position.
#[derive(Debug, Clone, Serialize)]
pub struct ManeuverHint {
    pub instruction: String,
    pub distance_from_start: f64,
    /// Meters until the maneuver, clamped at zero
    pub distance_m: f64,
}

/// Everything the navigation layer knows after one fix.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationState {
    pub fix: Fix,
    pub nearest_point: Coord,
    pub distance_from_start: f64,
    pub lateral_deviation_m: f64,
    pub segment: SegmentLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_stop: Option<StopContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_stop: Option<StopContext>,
    pub progress_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maneuver_hint: Option<ManeuverHint>,
}

impl NavigationState {
    /// Fraction of the current inter-stop leg already covered, when the
    /// vehicle is between two stops.
    pub fn leg_progress_pct(&self) -> Option<f64> {
        let previous = self.previous_stop.as_ref()?;
        let next = self.next_stop.as_ref()?;
        let span = next.dist_from_start - previous.dist_from_start;
        if span <= 0.0 {
            return None;
        }
        Some(((self.distance_from_start - previous.dist_from_start) / span) * 100.0)
    }
}

/// Projects a stream of fixes onto a prebuilt route.
///
/// Holds the route, stop index and maneuver plan by shared reference; owns
/// only the latest state.
pub struct Tracker<'a> {
    route: &'a Route,
    stops: &'a StopIndex,
    plan: &'a ManeuverPlan,
    total_length: f64,
    last_state: Option<NavigationState>,
}

impl<'a> Tracker<'a> {
    pub fn new(route: &'a Route, stops: &'a StopIndex, plan: &'a ManeuverPlan) -> Tracker<'a> {
        Tracker {
            route,
            stops,
            plan,
            total_length: plan.total_length(),
            last_state: None,
        }
    }

    pub fn last_state(&self) -> Option<&NavigationState> {
        self.last_state.as_ref()
    }

    /// Produces the navigation state for one fix.
    ///
    /// Fails with `BadCoordinate` for an invalid position; the caller is
    /// expected to skip such fixes.
    pub fn update(&mut self, fix: Fix) -> Result<NavigationState> {
        let position = fix.coord();
        position.validate()?;

        let projection = self.route.project(position)?;
        let along = projection.distance_from_start;

        let segment = self.route.segment_at(along)?;

        let previous_stop = self.stops.previous(along).map(|s| StopContext::behind(s, along));
        let next_stop = self.stops.next(along).map(|s| StopContext::ahead(s, along));

        let maneuver_hint = self.plan.next_after(along).map(|m| ManeuverHint {
            instruction: m.instruction.clone(),
            distance_from_start: m.distance_from_start,
            distance_m: (m.distance_from_start - along).max(0.0),
        });

        let progress_pct = if self.total_length > 0.0 {
            (along / self.total_length) * 100.0
        } else {
            0.0
        };

        let state = NavigationState {
            fix,
            nearest_point: projection.nearest,
            distance_from_start: along,
            lateral_deviation_m: projection.lateral_deviation_m,
            segment,
            previous_stop,
            next_stop,
            progress_pct,
            maneuver_hint,
        };

        self.last_state = Some(state.clone());
        Ok(state)
    }
}
