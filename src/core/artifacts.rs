//! Persisted route artifacts
//!
//! One processed relation produces a directory of artifacts: the raw XML,
//! the ordered ways, the indexed stops, a GeoJSON overview and a plain-text
//! summary. The readers are deliberately tolerant so a tracking session can
//! be started from whichever artifact survived: ordered-ways JSON or
//! GeoJSON for the geometry, stops JSON, GeoJSON or the summary text for
//! the stops.

use std::fs;
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value as GeoValue};
use serde_json::json;

use crate::core::error::{Error, Result};
use crate::core::geo::Coord;
use crate::core::relation::RelationMeta;
use crate::core::stops::{Stop, StopRole};
use crate::core::wayset::Way;

/// Summary-line labels recognized by the decoder. The summary format is a
/// stable external contract; these strings must not change.
const SUMMARY_STOPS_HEADER: &str = "Przystanki";
const SUMMARY_STOP_ID: &str = "Stop ID:";
const SUMMARY_DIST_FROM_START: &str = "Odległość od początku trasy:";
const SUMMARY_DIST_FROM_PREV: &str = "Odległość od poprzedniego przystanku:";
const SUMMARY_DIST_TO_NEXT: &str = "Odległość do następnego przystanku:";
const SUMMARY_TOTAL_LENGTH: &str = "Całkowita długość trasy:";

/// Replaces Polish diacritics with their ASCII counterparts.
fn fold_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ą' => 'a',
            'ć' => 'c',
            'ę' => 'e',
            'ł' => 'l',
            'ń' => 'n',
            'ó' => 'o',
            'ś' => 's',
            'ź' | 'ż' => 'z',
            'Ą' => 'A',
            'Ć' => 'C',
            'Ę' => 'E',
            'Ł' => 'L',
            'Ń' => 'N',
            'Ó' => 'O',
            'Ś' => 'S',
            'Ź' | 'Ż' => 'Z',
            other => other,
        })
        .collect()
}

/// Makes a relation tag safe to use as a directory name.
pub fn sanitize_name(name: &str) -> String {
    let folded = fold_diacritics(name);
    let replaced: String = folded
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '=' | ' ' => '_',
            other => other,
        })
        .collect();
    replaced.trim_matches('_').to_string()
}

fn or_unknown(value: &str, fallback: &str) -> String {
    let sanitized = sanitize_name(value);
    if sanitized.is_empty() {
        fallback.to_string()
    } else {
        sanitized
    }
}

/// File locations for one processed relation.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub relation_id: String,
}

impl ArtifactPaths {
    /// Directory layout `base/<network>/<ref>_<from>_<to>/`, with sanitized
    /// components and `unknown_*` fallbacks for missing tags.
    pub fn layout(base: &Path, meta: &RelationMeta) -> ArtifactPaths {
        let network = or_unknown(&meta.network, "unknown_network");
        let line_ref = or_unknown(&meta.line_ref, "unknown_ref");
        let from = or_unknown(&meta.from, "unknown_from");
        let to = or_unknown(&meta.to, "unknown_to");

        ArtifactPaths {
            dir: base
                .join(network)
                .join(format!("{}_{}_{}", line_ref, from, to)),
            relation_id: meta.relation_id.clone(),
        }
    }

    fn named(&self, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("relation_{}_{}", self.relation_id, suffix))
    }

    pub fn xml(&self) -> PathBuf {
        self.dir.join(format!("relation_{}.xml", self.relation_id))
    }

    pub fn ways_ordered(&self) -> PathBuf {
        self.named("ways_ordered.json")
    }

    pub fn stops(&self) -> PathBuf {
        self.named("stops.json")
    }

    pub fn geojson(&self) -> PathBuf {
        self.dir
            .join(format!("relation_{}.geojson", self.relation_id))
    }

    pub fn summary(&self) -> PathBuf {
        self.named("summary.txt")
    }
}

/// Writes the raw relation document.
pub fn write_relation_xml(path: &Path, xml: &str) -> Result<()> {
    fs::write(path, xml)?;
    Ok(())
}

/// Writes the stitched ways as `ways_ordered.json`.
pub fn write_ways_ordered(path: &Path, ways: &[Way]) -> Result<()> {
    let text = serde_json::to_string_pretty(ways)?;
    fs::write(path, text)?;
    Ok(())
}

/// Writes the indexed stops as `stops.json`.
pub fn write_stops(path: &Path, stops: &[Stop]) -> Result<()> {
    let text = serde_json::to_string_pretty(stops)?;
    fs::write(path, text)?;
    Ok(())
}

fn way_feature(way: &Way, order: usize) -> Feature {
    let coordinates: Vec<Vec<f64>> = way
        .nodes
        .iter()
        .map(|coord| vec![coord.lon(), coord.lat()])
        .collect();
    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), json!(way.id));
    properties.insert("type".to_string(), json!("route_segment"));
    properties.insert("order".to_string(), json!(order));
    properties.insert("start_node".to_string(), json!(way.start_node));
    properties.insert("end_node".to_string(), json!(way.end_node));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::LineString(coordinates))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn stop_feature(stop: &Stop, order: usize) -> Option<Feature> {
    let position = stop.position?;
    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), json!(stop.id));
    properties.insert("type".to_string(), json!("stop"));
    properties.insert("order".to_string(), json!(order));
    properties.insert("role".to_string(), json!(stop.role.as_str()));
    properties.insert(
        "name".to_string(),
        json!(stop.name.clone().unwrap_or_default()),
    );
    properties.insert(
        "dist_from_start".to_string(),
        json!(stop.dist_from_start.unwrap_or(0.0)),
    );
    properties.insert(
        "distance_from_prev".to_string(),
        json!(stop.distance_from_prev.unwrap_or(0.0)),
    );
    properties.insert(
        "distance_to_next".to_string(),
        json!(stop.distance_to_next.unwrap_or(0.0)),
    );

    Some(Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Point(vec![
            position.lon(),
            position.lat(),
        ]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Writes `route.geojson`: LineString features per way, Point per stop.
pub fn write_geojson(path: &Path, ways: &[Way], stops: &[Stop]) -> Result<()> {
    let mut features: Vec<Feature> = ways
        .iter()
        .enumerate()
        .map(|(order, way)| way_feature(way, order))
        .collect();
    features.extend(
        stops
            .iter()
            .enumerate()
            .filter_map(|(order, stop)| stop_feature(stop, order)),
    );

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    let text = serde_json::to_string_pretty(&collection)?;
    fs::write(path, text)?;
    Ok(())
}

/// Writes the plain-text summary.
///
/// The stop section uses the fixed labels the decoder recognizes, so a
/// summary can stand in for `stops.json` later.
pub fn write_summary(
    path: &Path,
    relation_id: &str,
    ways: &[Way],
    stops: &[Stop],
    total_length: f64,
) -> Result<()> {
    let mut text = String::new();
    text.push_str(&format!("Relacja: {}\n", relation_id));
    text.push_str(&format!("Liczba odcinków trasy: {}\n", ways.len()));
    text.push_str(&format!(
        "{} {:.2} m ({:.2} km)\n\n",
        SUMMARY_TOTAL_LENGTH,
        total_length,
        total_length / 1000.0
    ));

    text.push_str("Odcinki trasy (kolejność):\n");
    for (i, way) in ways.iter().enumerate() {
        text.push_str(&format!(
            "{}. Way ID: {} (od węzła {} do {})\n",
            i + 1,
            way.id,
            way.start_node,
            way.end_node
        ));
    }

    if !stops.is_empty() {
        text.push_str(&format!("\n{} (od początku trasy):\n", SUMMARY_STOPS_HEADER));
        for (i, stop) in stops.iter().enumerate() {
            text.push_str(&format!(
                "{}. {} {} (role=\"{}\") - Nazwa: {}\n",
                i + 1,
                SUMMARY_STOP_ID,
                stop.id,
                stop.role.as_str(),
                stop.label()
            ));
            text.push_str(&format!(
                "   {} {:.2} m\n",
                SUMMARY_DIST_FROM_START,
                stop.dist_from_start.unwrap_or(0.0)
            ));
            text.push_str(&format!(
                "   {} {:.2} m\n",
                SUMMARY_DIST_FROM_PREV,
                stop.distance_from_prev.unwrap_or(0.0)
            ));
            text.push_str(&format!(
                "   {} {:.2} m\n",
                SUMMARY_DIST_TO_NEXT,
                stop.distance_to_next.unwrap_or(0.0)
            ));
        }
    }

    fs::write(path, text)?;
    Ok(())
}

fn ways_from_geojson(collection: &FeatureCollection) -> Vec<Way> {
    let mut ways = Vec::new();
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let GeoValue::LineString(coordinates) = &geometry.value else {
            continue;
        };
        let nodes: Vec<Coord> = coordinates
            .iter()
            .filter(|position| position.len() >= 2)
            .map(|position| Coord(position[0], position[1]))
            .collect();
        if nodes.len() < 2 {
            continue;
        }
        let id = feature
            .properties
            .as_ref()
            .and_then(|props| props.get("id"))
            .map(property_string)
            .unwrap_or_else(|| "unknown".to_string());
        let node_ids: Vec<String> = (0..nodes.len()).map(|_| "extracted".to_string()).collect();
        ways.push(Way::new(id, node_ids, nodes));
    }
    ways
}

fn property_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn stops_from_geojson(collection: &FeatureCollection) -> Vec<Stop> {
    let mut stops = Vec::new();
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let GeoValue::Point(position) = &geometry.value else {
            continue;
        };
        if position.len() < 2 {
            continue;
        }
        let props = feature.properties.as_ref();
        let id = props
            .and_then(|p| p.get("id"))
            .map(property_string)
            .unwrap_or_else(|| "unknown".to_string());
        let role = props
            .and_then(|p| p.get("role"))
            .and_then(|v| v.as_str())
            .and_then(StopRole::from_osm)
            .unwrap_or(StopRole::Stop);

        let mut stop = Stop::new(id, role, Coord(position[0], position[1]));
        stop.name = props
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        stop.dist_from_start = props
            .and_then(|p| p.get("dist_from_start").or_else(|| p.get("distance_from_start")))
            .and_then(|v| v.as_f64());
        stops.push(stop);
    }
    stops
}

/// Loads ways from `ways_ordered.json` or a GeoJSON FeatureCollection.
pub fn load_ways(path: &Path) -> Result<Vec<Way>> {
    let text = fs::read_to_string(path)?;

    if let Ok(ways) = serde_json::from_str::<Vec<Way>>(&text) {
        return Ok(ways);
    }

    let geo: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Error::ParseError(e.to_string()))?;
    match geo {
        GeoJson::FeatureCollection(collection) => {
            let ways = ways_from_geojson(&collection);
            log::info!("extracted {} route segments from GeoJSON", ways.len());
            Ok(ways)
        }
        _ => Err(Error::ParseError(format!(
            "{} is neither a way list nor a FeatureCollection",
            path.display()
        ))),
    }
}

/// Loads stops from `stops.json`, a GeoJSON FeatureCollection, or a
/// summary text file.
pub fn load_stops(path: &Path) -> Result<Vec<Stop>> {
    let text = fs::read_to_string(path)?;

    if let Ok(stops) = serde_json::from_str::<Vec<Stop>>(&text) {
        return Ok(stops);
    }

    if let Ok(GeoJson::FeatureCollection(collection)) = text.parse::<GeoJson>() {
        let stops = stops_from_geojson(&collection);
        log::info!("extracted {} stops from GeoJSON", stops.len());
        return Ok(stops);
    }

    let stops = parse_summary_stops(&text);
    if stops.is_empty() {
        return Err(Error::ParseError(format!(
            "no stops recognized in {}",
            path.display()
        )));
    }
    log::info!("extracted {} stops from summary text", stops.len());
    Ok(stops)
}

/// Extracts stop records from summary text.
///
/// Only lines after the stops header are considered; each `Stop ID:` line
/// opens a record and the following distance line fills it.
pub fn parse_summary_stops(text: &str) -> Vec<Stop> {
    let mut stops: Vec<Stop> = Vec::new();
    let mut in_stops_section = false;
    let mut current: Option<Stop> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.contains(SUMMARY_STOPS_HEADER) {
            in_stops_section = true;
            continue;
        }
        if !in_stops_section {
            continue;
        }

        if let Some(rest) = substring_after(line, SUMMARY_STOP_ID) {
            if let Some(stop) = current.take() {
                stops.push(stop);
            }
            let id = rest.split_whitespace().next().unwrap_or("").to_string();
            if !id.is_empty() {
                current = Some(Stop {
                    id,
                    role: StopRole::Stop,
                    position: None,
                    name: None,
                    dist_from_start: None,
                    distance_from_prev: None,
                    distance_to_next: None,
                });
            }
        } else if let Some(rest) = substring_after(line, SUMMARY_DIST_FROM_START) {
            if let Some(stop) = current.as_mut() {
                if let Some(value) = first_number(rest) {
                    stop.dist_from_start = Some(value);
                }
            }
        }
    }
    if let Some(stop) = current.take() {
        stops.push(stop);
    }

    // Records without a distance cannot be indexed later
    stops.retain(|stop| stop.dist_from_start.is_some());
    stops
}

/// Reads the canonical total route length from summary text.
pub fn summary_total_length(text: &str) -> Option<f64> {
    for line in text.lines() {
        if let Some(rest) = substring_after(line.trim(), SUMMARY_TOTAL_LENGTH) {
            if let Some(value) = first_number(rest) {
                return Some(value);
            }
        }
    }
    None
}

/// Locates the companion summary next to a ways or stops artifact and
/// reads its canonical length, when both exist.
pub fn companion_summary_length(artifact: &Path) -> Option<f64> {
    let name = artifact.file_name()?.to_str()?;
    let summary_name = if name.ends_with("_ways_ordered.json") {
        name.replace("_ways_ordered.json", "_summary.txt")
    } else if name.ends_with("_stops.json") {
        name.replace("_stops.json", "_summary.txt")
    } else {
        return None;
    };
    let summary_path = artifact.with_file_name(summary_name);
    let text = fs::read_to_string(summary_path).ok()?;
    summary_total_length(&text)
}

fn substring_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker)
        .map(|at| line[at + marker.len()..].trim_start())
}

fn first_number(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse::<f64>().ok()
}
