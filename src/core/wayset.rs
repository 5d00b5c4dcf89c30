//! Raw way storage with an endpoint adjacency index
//!
//! Holds the route-geometry ways of a relation (members with the empty
//! role) and answers degree queries about their endpoint nodes. This is the
//! input side of the stitcher.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::geo::Coord;

/// An ordered polyline segment with stable endpoint identifiers.
///
/// `nodes` and `node_ids` are parallel. After stitching, a way with
/// `reversed == true` carries its vertices in reversed-source order and has
/// its endpoint ids swapped accordingly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Way {
    pub id: String,
    pub nodes: Vec<Coord>,
    pub node_ids: Vec<String>,
    pub start_node: String,
    pub end_node: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reversed: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl Way {
    pub fn new(id: impl Into<String>, node_ids: Vec<String>, nodes: Vec<Coord>) -> Self {
        let id = id.into();
        let start_node = node_ids.first().cloned().unwrap_or_default();
        let end_node = node_ids.last().cloned().unwrap_or_default();
        Way {
            id,
            nodes,
            node_ids,
            start_node,
            end_node,
            reversed: false,
        }
    }

    /// A way whose two endpoints are the same node.
    pub fn is_loop(&self) -> bool {
        self.start_node == self.end_node
    }

    /// Flips vertex order, swaps the endpoint ids and toggles `reversed`.
    pub fn reverse(&mut self) {
        self.nodes.reverse();
        self.node_ids.reverse();
        std::mem::swap(&mut self.start_node, &mut self.end_node);
        self.reversed = !self.reversed;
    }
}

/// Which endpoint of a way a node occurrence refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WayEnd {
    Start,
    End,
}

/// The ways of a relation plus a `node id -> (way index, end)` index.
#[derive(Debug, Clone)]
pub struct WaySet {
    ways: Vec<Way>,
    index: HashMap<String, Vec<(usize, WayEnd)>>,
}

impl WaySet {
    /// Builds the set, rejecting ways with fewer than 2 resolved nodes.
    pub fn new(ways: Vec<Way>) -> Self {
        let ways: Vec<Way> = ways
            .into_iter()
            .filter(|way| {
                if way.nodes.len() < 2 {
                    log::warn!("way {} has fewer than 2 resolved nodes, dropped", way.id);
                    false
                } else {
                    true
                }
            })
            .collect();

        let mut index: HashMap<String, Vec<(usize, WayEnd)>> = HashMap::new();
        for (i, way) in ways.iter().enumerate() {
            index
                .entry(way.start_node.clone())
                .or_default()
                .push((i, WayEnd::Start));
            index
                .entry(way.end_node.clone())
                .or_default()
                .push((i, WayEnd::End));
        }

        WaySet { ways, index }
    }

    pub fn is_empty(&self) -> bool {
        self.ways.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ways.len()
    }

    pub fn ways(&self) -> &[Way] {
        &self.ways
    }

    /// Endpoint occurrences of `node` across all ways.
    pub fn incident(&self, node: &str) -> &[(usize, WayEnd)] {
        self.index.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of way endpoints meeting at `node`. A loop way contributes 2.
    pub fn degree(&self, node: &str) -> usize {
        self.incident(node).len()
    }

    /// Nodes where exactly one way terminates.
    pub fn endpoints(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self
            .index
            .iter()
            .filter(|(_, ends)| ends.len() == 1)
            .map(|(node, _)| node.as_str())
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Nodes where more than two way endpoints meet.
    pub fn junctions(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self
            .index
            .iter()
            .filter(|(_, ends)| ends.len() > 2)
            .map(|(node, _)| node.as_str())
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Descriptive connectivity report. Never consulted by the stitcher.
    pub fn analyze(&self) -> String {
        let endpoints = self.endpoints();
        let junctions = self.junctions();
        let interior = self
            .index
            .values()
            .filter(|ends| ends.len() == 2)
            .count();
        let loops = self.ways.iter().filter(|way| way.is_loop()).count();

        let mut report = String::new();
        let _ = writeln!(report, "ways: {}", self.ways.len());
        let _ = writeln!(report, "loop ways: {}", loops);
        let _ = writeln!(report, "terminal nodes (degree 1): {}", endpoints.len());
        let _ = writeln!(report, "pass-through nodes (degree 2): {}", interior);
        let _ = writeln!(report, "junction nodes (degree > 2): {}", junctions.len());
        if endpoints.len() > 2 {
            let _ = writeln!(
                report,
                "more than two terminal nodes; the chain is likely discontinuous"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn way(id: &str, ids: &[&str]) -> Way {
        let node_ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        let nodes: Vec<Coord> = (0..ids.len())
            .map(|i| Coord(i as f64 * 0.001, 0.0))
            .collect();
        Way::new(id, node_ids, nodes)
    }

    #[test]
    fn test_rejects_short_ways() {
        let set = WaySet::new(vec![way("w1", &["a", "b"]), way("w2", &["c"])]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.ways()[0].id, "w1");
    }

    #[test]
    fn test_degree_and_endpoints() {
        // a - b - c with a spur b - d
        let set = WaySet::new(vec![
            way("w1", &["a", "b"]),
            way("w2", &["b", "c"]),
            way("w3", &["b", "d"]),
        ]);
        assert_eq!(set.degree("a"), 1);
        assert_eq!(set.degree("b"), 3);
        assert_eq!(set.endpoints(), vec!["a", "c", "d"]);
        assert_eq!(set.junctions(), vec!["b"]);
    }

    #[test]
    fn test_loop_counts_twice() {
        let set = WaySet::new(vec![way("w1", &["a", "b", "a"])]);
        assert_eq!(set.degree("a"), 2);
        assert!(set.ways()[0].is_loop());
        assert!(set.endpoints().is_empty());
    }

    #[test]
    fn test_reverse_swaps_endpoints() {
        let mut w = way("w1", &["a", "b", "c"]);
        let first = w.nodes[0];
        w.reverse();
        assert_eq!(w.start_node, "c");
        assert_eq!(w.end_node, "a");
        assert!(w.reversed);
        assert_eq!(w.nodes[2], first);
        w.reverse();
        assert!(!w.reversed);
        assert_eq!(w.start_node, "a");
    }

    #[test]
    fn test_way_serde_omits_reversed_when_false() {
        let w = way("w1", &["a", "b"]);
        let json = serde_json::to_string(&w).unwrap();
        assert!(!json.contains("reversed"));

        let mut w = w;
        w.reverse();
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"reversed\":true"));
    }

    #[test]
    fn test_analyze_reports_counts() {
        let set = WaySet::new(vec![way("w1", &["a", "b"]), way("w2", &["b", "c"])]);
        let report = set.analyze();
        assert!(report.contains("ways: 2"));
        assert!(report.contains("terminal nodes (degree 1): 2"));
        assert!(report.contains("junction nodes (degree > 2): 0"));
    }
}
