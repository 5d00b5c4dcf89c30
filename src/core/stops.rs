//! Stop indexing along the route's arc-length parameterization
//!
//! Stops arrive from the relation (or from a persisted artifact) in
//! arbitrary order. The index projects each onto the route, sorts by
//! distance from the start and answers predecessor/successor queries
//! against a cursor distance.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::geo::Coord;
use crate::core::route::Route;

/// Tolerance in meters for treating a stop exactly at the cursor as
/// already passed
pub const PREVIOUS_EPSILON_M: f64 = 1.0;

/// Role of a stop member in the source relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRole {
    Stop,
    StopEntryOnly,
    StopExitOnly,
    Platform,
    PlatformEntryOnly,
    PlatformExitOnly,
}

impl StopRole {
    /// Maps an OSM member role string; unknown roles are not stops.
    pub fn from_osm(role: &str) -> Option<StopRole> {
        match role {
            "stop" => Some(StopRole::Stop),
            "stop_entry_only" => Some(StopRole::StopEntryOnly),
            "stop_exit_only" => Some(StopRole::StopExitOnly),
            "platform" => Some(StopRole::Platform),
            "platform_entry_only" => Some(StopRole::PlatformEntryOnly),
            "platform_exit_only" => Some(StopRole::PlatformExitOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StopRole::Stop => "stop",
            StopRole::StopEntryOnly => "stop_entry_only",
            StopRole::StopExitOnly => "stop_exit_only",
            StopRole::Platform => "platform",
            StopRole::PlatformEntryOnly => "platform_entry_only",
            StopRole::PlatformExitOnly => "platform_exit_only",
        }
    }

    fn default_role() -> StopRole {
        StopRole::Stop
    }
}

/// A transit stop, optionally located along the route.
///
/// `dist_from_start` is present once the stop has been indexed against a
/// route, or when it was read from a persisted artifact that already
/// carried it. `position` is absent only for stops decoded from a summary
/// file, which records distances but no coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    #[serde(default = "StopRole::default_role")]
    pub role: StopRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Coord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist_from_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_prev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_to_next: Option<f64>,
}

impl Stop {
    pub fn new(id: impl Into<String>, role: StopRole, position: Coord) -> Self {
        Stop {
            id: id.into(),
            role,
            position: Some(position),
            name: None,
            dist_from_start: None,
            distance_from_prev: None,
            distance_to_next: None,
        }
    }

    /// Display name, falling back to the stop id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Indexed distance from the route start; 0 when not yet indexed.
    pub fn distance(&self) -> f64 {
        self.dist_from_start.unwrap_or(0.0)
    }
}

/// Stops ordered by distance from the route start.
#[derive(Debug, Clone, Default)]
pub struct StopIndex {
    stops: Vec<Stop>,
}

impl StopIndex {
    /// Indexes `stops` against `route`.
    ///
    /// A persisted `dist_from_start` is trusted; otherwise the stop's
    /// position is projected onto the route. Stops with no usable distance
    /// are skipped without failing the index.
    pub fn build(stops: Vec<Stop>, route: &Route) -> StopIndex {
        let mut indexed: Vec<Stop> = Vec::with_capacity(stops.len());

        for mut stop in stops {
            if stop.dist_from_start.is_none() {
                let projected = match stop.position {
                    Some(position) => route.project(position).ok(),
                    None => None,
                };
                match projected {
                    Some(projection) => {
                        stop.dist_from_start = Some(projection.distance_from_start);
                    }
                    None => {
                        log::warn!("stop {} has no usable position, skipped", stop.id);
                        continue;
                    }
                }
            }
            indexed.push(stop);
        }

        indexed.sort_by(|a, b| {
            a.distance()
                .partial_cmp(&b.distance())
                .unwrap_or(Ordering::Equal)
        });

        let distances: Vec<f64> = indexed.iter().map(Stop::distance).collect();
        let count = indexed.len();
        for (i, stop) in indexed.iter_mut().enumerate() {
            stop.distance_from_prev = Some(if i == 0 {
                0.0
            } else {
                distances[i] - distances[i - 1]
            });
            stop.distance_to_next = Some(if i + 1 == count {
                0.0
            } else {
                distances[i + 1] - distances[i]
            });
        }

        StopIndex { stops: indexed }
    }

    /// Wraps stops that are already ordered and carry their distances.
    pub fn from_indexed(stops: Vec<Stop>) -> StopIndex {
        let mut index = StopIndex { stops };
        index.stops.sort_by(|a, b| {
            a.distance()
                .partial_cmp(&b.distance())
                .unwrap_or(Ordering::Equal)
        });
        index
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Last stop at or before `distance` (with a 1 m tolerance past it).
    pub fn previous(&self, distance: f64) -> Option<&Stop> {
        self.stops
            .iter()
            .rev()
            .find(|stop| stop.distance() <= distance + PREVIOUS_EPSILON_M)
    }

    /// First stop strictly after `distance`.
    pub fn next(&self, distance: f64) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.distance() > distance)
    }
}
