//! Maneuver extraction: turns and stops as sparse route waypoints
//!
//! Scans the route polyline for significant bearing changes, merges the
//! indexed stops in, and renders the result as a human-readable direction
//! sheet. Detection runs over vertex windows so GPS-grade vertex jitter
//! does not produce phantom turns.

use serde::Serialize;

use crate::core::geo::{self, cardinal, round_to_tens};
use crate::core::route::Route;
use crate::core::stops::{Stop, StopIndex};

/// A stop this close to a route end is treated as the terminus rather than
/// an intermediate waypoint
pub const TERMINAL_STOP_RADIUS_M: f64 = 50.0;

/// Turn-detector windowing parameters.
///
/// `step` advances the scan cursor, `lookback`/`lookahead` pick the bearing
/// reference vertices, `min_turn_deg` is the detection threshold.
#[derive(Debug, Clone)]
pub struct TurnParams {
    pub step: usize,
    pub lookback: usize,
    pub lookahead: usize,
    pub min_turn_deg: f64,
}

impl Default for TurnParams {
    fn default() -> Self {
        TurnParams {
            step: 10,
            lookback: 10,
            lookahead: 20,
            min_turn_deg: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSeverity {
    Slight,
    Normal,
    Sharp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSide {
    Left,
    Right,
}

/// What happens at a maneuver point
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManeuverKind {
    Turn {
        /// Polyline vertex index where the turn was detected
        vertex: usize,
        bearing_before: f64,
        bearing_after: f64,
        /// Signed bearing change; positive turns right
        delta: f64,
        severity: TurnSeverity,
        side: TurnSide,
    },
    Stop {
        id: String,
        name: Option<String>,
    },
}

/// A sparse waypoint along the route with its rendered instruction.
#[derive(Debug, Clone, Serialize)]
pub struct Maneuver {
    #[serde(flatten)]
    pub kind: ManeuverKind,
    pub distance_from_start: f64,
    /// Distance since the previous maneuver; for the first maneuver this is
    /// the distance from the route start
    pub distance_from_prev: f64,
    pub instruction: String,
}

/// The extracted maneuver list plus terminus context for rendering.
#[derive(Debug, Clone)]
pub struct ManeuverPlan {
    maneuvers: Vec<Maneuver>,
    start_stop: Option<Stop>,
    destination_stop: Option<Stop>,
    initial_bearing: Option<f64>,
    first_node: String,
    last_node: String,
    total_length: f64,
}

impl ManeuverPlan {
    /// Extracts turns and merges stops over `route`.
    ///
    /// `total_length` is the effective route length (a canonical length
    /// from a summary artifact may differ from the computed one).
    pub fn build(
        route: &Route,
        stops: &StopIndex,
        params: &TurnParams,
        total_length: f64,
    ) -> ManeuverPlan {
        let points = route.points();
        let cum = route.cumulative();

        let mut entries: Vec<(f64, ManeuverKind, String)> = Vec::new();

        // Turn detection over vertex windows
        let mut i = params.lookback;
        while i + params.lookahead < points.len() {
            let pre = geo::initial_bearing(points[i - params.lookback], points[i]);
            let post = geo::initial_bearing(points[i], points[i + params.lookahead]);
            let (pre, post) = match (pre, post) {
                (Ok(pre), Ok(post)) => (pre, post),
                _ => {
                    i += params.step.max(1);
                    continue;
                }
            };

            let delta = (post - pre + 180.0).rem_euclid(360.0) - 180.0;
            if delta.abs() >= params.min_turn_deg {
                let severity = if delta.abs() > 100.0 {
                    TurnSeverity::Sharp
                } else if delta.abs() > 60.0 {
                    TurnSeverity::Normal
                } else {
                    TurnSeverity::Slight
                };
                let side = if delta > 0.0 {
                    TurnSide::Right
                } else {
                    TurnSide::Left
                };
                let instruction = turn_instruction(severity, side, post);
                entries.push((
                    cum[i],
                    ManeuverKind::Turn {
                        vertex: i,
                        bearing_before: pre,
                        bearing_after: post,
                        delta,
                        severity,
                        side,
                    },
                    instruction,
                ));
                // Skip past the curve so one bend is not reported twice
                i += params.lookahead.max(1);
                continue;
            }

            i += params.step.max(1);
        }

        // Terminal stops fold into the preamble and the arrival line
        let mut start_stop = None;
        let mut destination_stop = None;
        let count = stops.len();
        for (index, stop) in stops.stops().iter().enumerate() {
            let distance = stop.distance();
            if index == 0 && distance < TERMINAL_STOP_RADIUS_M {
                start_stop = Some(stop.clone());
                continue;
            }
            if index + 1 == count && distance > total_length - TERMINAL_STOP_RADIUS_M {
                destination_stop = Some(stop.clone());
                continue;
            }
            entries.push((
                distance,
                ManeuverKind::Stop {
                    id: stop.id.clone(),
                    name: stop.name.clone(),
                },
                format!("Stop {}.", stop.label()),
            ));
        }

        entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut maneuvers = Vec::with_capacity(entries.len());
        let mut previous = 0.0;
        for (distance, kind, instruction) in entries {
            maneuvers.push(Maneuver {
                kind,
                distance_from_start: distance,
                distance_from_prev: distance - previous,
                instruction,
            });
            previous = distance;
        }

        let initial_bearing = if points.len() >= 3 {
            geo::initial_bearing(points[0], points[2]).ok()
        } else {
            None
        };

        let first_node = route
            .ways()
            .first()
            .map(|way| way.start_node.clone())
            .unwrap_or_default();
        let last_node = route
            .ways()
            .last()
            .map(|way| way.end_node.clone())
            .unwrap_or_default();

        ManeuverPlan {
            maneuvers,
            start_stop,
            destination_stop,
            initial_bearing,
            first_node,
            last_node,
            total_length,
        }
    }

    pub fn maneuvers(&self) -> &[Maneuver] {
        &self.maneuvers
    }

    pub fn start_stop(&self) -> Option<&Stop> {
        self.start_stop.as_ref()
    }

    pub fn destination_stop(&self) -> Option<&Stop> {
        self.destination_stop.as_ref()
    }

    /// Effective route length the plan was built against.
    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    /// First maneuver strictly after `distance`.
    pub fn next_after(&self, distance: f64) -> Option<&Maneuver> {
        self.maneuvers
            .iter()
            .find(|m| m.distance_from_start > distance)
    }

    /// Renders the full direction sheet.
    pub fn directions(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.maneuvers.len() + 4);

        match &self.start_stop {
            Some(stop) => lines.push(format!("Start at stop {}.", stop.label())),
            None => lines.push(format!("Start at the route origin (node {}).", self.first_node)),
        }

        if let Some(bearing) = self.initial_bearing {
            lines.push(format!("Head {}.", cardinal(bearing)));
        }

        for maneuver in &self.maneuvers {
            lines.push(format!(
                "{}: {}",
                format_distance(maneuver.distance_from_prev),
                maneuver.instruction
            ));
        }

        if let Some(last) = self.maneuvers.last() {
            let remaining = (self.total_length - last.distance_from_start).max(0.0);
            lines.push(format!("{}: Continue straight.", format_distance(remaining)));
        }

        match &self.destination_stop {
            Some(stop) => lines.push(format!(
                "You have reached the destination, stop {}.",
                stop.label()
            )),
            None => lines.push(format!(
                "You have reached the destination (node {}).",
                self.last_node
            )),
        }

        lines
    }
}

fn turn_instruction(severity: TurnSeverity, side: TurnSide, post_bearing: f64) -> String {
    let side = match side {
        TurnSide::Left => "left",
        TurnSide::Right => "right",
    };
    let phrase = match severity {
        TurnSeverity::Sharp => format!("Turn sharp {}", side),
        TurnSeverity::Normal => format!("Turn {}", side),
        TurnSeverity::Slight => format!("Turn slightly {}", side),
    };
    format!("{}, heading {}.", phrase, cardinal(post_bearing))
}

/// Distance text: rounded meters under a kilometer, one decimal above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("ok. {} m", round_to_tens(meters))
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}
