//! The stitched route polyline and its arc-length parameterization
//!
//! A `Route` concatenates the oriented ways into one vertex list, drops
//! duplicate join vertices and invalid coordinates, and keeps a cumulative
//! arc-length table so positions along the route can be addressed by a
//! single distance-from-start value.

use serde::Serialize;

use crate::core::error::{Error, Result};
use crate::core::geo::{self, Coord, METERS_PER_DEGREE};
use crate::core::wayset::Way;

/// Result of projecting a point onto the route polyline
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Projection {
    /// Closest point on the polyline
    pub nearest: Coord,
    /// Arc-length position of that point in meters
    pub distance_from_start: f64,
    /// Distance from the query point to the polyline in meters, via the
    /// coarse planar approximation
    pub lateral_deviation_m: f64,
}

/// Which way a given distance-from-start falls into
#[derive(Debug, Clone, Serialize)]
pub struct SegmentLocation {
    pub way_index: usize,
    pub way_id: String,
    /// Meters into the way
    pub offset_in_way: f64,
    /// Percentage of the way already covered
    pub pct: f64,
    pub way_length: f64,
    pub start_node: String,
    pub end_node: String,
    /// Set when the query distance was outside the route and clamped
    pub clamped: bool,
}

/// Immutable stitched polyline with cumulative arc length.
#[derive(Debug, Clone)]
pub struct Route {
    ways: Vec<Way>,
    way_lengths: Vec<f64>,
    points: Vec<Coord>,
    cum: Vec<f64>,
    total_length: f64,
}

impl Route {
    /// Builds the polyline from stitched ways.
    ///
    /// Invalid vertices are dropped with a warning; duplicate join vertices
    /// between successive ways and consecutive equal vertices collapse.
    /// Fails with `EmptyRoute` when fewer than 2 valid vertices remain.
    pub fn from_ways(ways: Vec<Way>) -> Result<Route> {
        let mut points: Vec<Coord> = Vec::new();
        let mut dropped = 0usize;

        for way in &ways {
            for &coord in &way.nodes {
                if !coord.is_valid() {
                    dropped += 1;
                    continue;
                }
                if points.last() != Some(&coord) {
                    points.push(coord);
                }
            }
        }

        if dropped > 0 {
            log::warn!("dropped {} invalid vertices while building the route", dropped);
        }

        if points.len() < 2 {
            return Err(Error::EmptyRoute(format!(
                "{} valid vertices is not enough to form a polyline",
                points.len()
            )));
        }

        let mut cum = Vec::with_capacity(points.len());
        cum.push(0.0);
        for pair in points.windows(2) {
            let step = geo::haversine(pair[0], pair[1])?;
            cum.push(cum.last().copied().unwrap_or(0.0) + step);
        }
        let total_length = cum.last().copied().unwrap_or(0.0);

        let way_lengths = ways.iter().map(|way| polyline_length(&way.nodes)).collect();

        Ok(Route {
            ways,
            way_lengths,
            points,
            cum,
            total_length,
        })
    }

    /// Total arc length in meters.
    pub fn length(&self) -> f64 {
        self.total_length
    }

    pub fn points(&self) -> &[Coord] {
        &self.points
    }

    /// Cumulative arc length per vertex; same length as `points()`.
    pub fn cumulative(&self) -> &[f64] {
        &self.cum
    }

    pub fn ways(&self) -> &[Way] {
        &self.ways
    }

    /// Finds the closest point on the polyline to `p`.
    ///
    /// Scans every segment, clamping the projection parameter to the
    /// segment. Ties resolve to the earlier segment. The lateral deviation
    /// converts the planar degree distance with the documented
    /// 111 000 m/deg factor.
    pub fn project(&self, p: Coord) -> Result<Projection> {
        p.validate()?;
        if self.points.len() < 2 {
            return Err(Error::EmptyRoute(
                "projection requires at least 2 vertices".to_string(),
            ));
        }

        let mut best: Option<(f64, Coord, f64)> = None;

        for i in 0..self.points.len() - 1 {
            let a = self.points[i];
            let b = self.points[i + 1];

            let dx = b.lon() - a.lon();
            let dy = b.lat() - a.lat();
            let len2 = dx * dx + dy * dy;
            let t = if len2 > 0.0 {
                (((p.lon() - a.lon()) * dx + (p.lat() - a.lat()) * dy) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let nearest = Coord(a.lon() + t * dx, a.lat() + t * dy);
            let ex = p.lon() - nearest.lon();
            let ey = p.lat() - nearest.lat();
            let dist = (ex * ex + ey * ey).sqrt();

            if best.map(|(d, _, _)| dist < d).unwrap_or(true) {
                let along = self.cum[i] + t * (self.cum[i + 1] - self.cum[i]);
                best = Some((dist, nearest, along));
            }
        }

        match best {
            Some((dist, nearest, along)) => Ok(Projection {
                nearest,
                distance_from_start: along,
                lateral_deviation_m: dist * METERS_PER_DEGREE,
            }),
            None => Err(Error::InvalidGeometry(
                "no segment produced a projection".to_string(),
            )),
        }
    }

    /// Locates the way containing `distance` meters from the start.
    ///
    /// Out-of-range distances clamp to the first or last way and set the
    /// `clamped` flag.
    pub fn segment_at(&self, distance: f64) -> Result<SegmentLocation> {
        if self.ways.is_empty() {
            return Err(Error::EmptyRoute("route has no ways".to_string()));
        }

        if distance < 0.0 {
            log::warn!("segment query at {:.2} m is before the route start", distance);
            return Ok(self.locate_in_way(0, 0.0, true));
        }

        let mut cumulative = 0.0;
        for (i, &len) in self.way_lengths.iter().enumerate() {
            if distance >= cumulative && distance <= cumulative + len {
                return Ok(self.locate_in_way(i, distance - cumulative, false));
            }
            cumulative += len;
        }

        log::warn!(
            "segment query at {:.2} m is past the route end ({:.2} m)",
            distance,
            cumulative
        );
        let last = self.ways.len() - 1;
        Ok(self.locate_in_way(last, self.way_lengths[last], true))
    }

    fn locate_in_way(&self, index: usize, offset: f64, clamped: bool) -> SegmentLocation {
        let way = &self.ways[index];
        let length = self.way_lengths[index];
        let pct = if length > 0.0 {
            (offset / length) * 100.0
        } else {
            0.0
        };
        SegmentLocation {
            way_index: index,
            way_id: way.id.clone(),
            offset_in_way: offset,
            pct,
            way_length: length,
            start_node: way.start_node.clone(),
            end_node: way.end_node.clone(),
            clamped,
        }
    }

    /// The coordinate at `distance` meters from the start, by linear
    /// interpolation between the surrounding vertices. Out-of-range input
    /// clamps to the route ends.
    pub fn point_at(&self, distance: f64) -> Coord {
        if distance <= 0.0 {
            return self.points[0];
        }
        if distance >= self.total_length {
            return self.points[self.points.len() - 1];
        }

        let upper = self.cum.partition_point(|&c| c <= distance);
        let i = upper.saturating_sub(1);
        let span = self.cum[upper] - self.cum[i];
        if span <= 0.0 {
            return self.points[i];
        }
        let t = (distance - self.cum[i]) / span;
        let a = self.points[i];
        let b = self.points[upper];
        Coord(
            a.lon() + t * (b.lon() - a.lon()),
            a.lat() + t * (b.lat() - a.lat()),
        )
    }
}

/// Sum of haversine steps over the valid vertices of a polyline.
fn polyline_length(nodes: &[Coord]) -> f64 {
    let mut total = 0.0;
    let mut prev: Option<Coord> = None;
    for &coord in nodes {
        if !coord.is_valid() {
            continue;
        }
        if let Some(p) = prev {
            if let Ok(step) = geo::haversine(p, coord) {
                total += step;
            }
        }
        prev = Some(coord);
    }
    total
}
