//! Way stitching: ordering and orienting a relation's ways into one chain
//!
//! The relation gives ways in arbitrary order and arbitrary orientation.
//! This module assembles them into the best single chain by a greedy
//! oriented walk, collects residual chains for disconnected pieces, splices
//! the chains together by endpoint matching, and keeps the source
//! orientation wherever the majority of segments agrees. Self-loop ways are
//! carried through untouched at the end of the output.
//!
//! Stitching never fails. A geometric discontinuity between two spliced
//! chains is tolerated and counted; route construction later simply leaves
//! a gap there.

use std::collections::{HashMap, HashSet};

use crate::core::wayset::{Way, WayEnd, WaySet};

/// One way occurrence in a chain, with its traversal orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Oriented {
    way: usize,
    reversed: bool,
}

/// Result of stitching: oriented ways plus observability counters.
#[derive(Debug, Clone)]
pub struct StitchOutcome {
    /// Stitched ways in traversal order, loops appended last. Reversed ways
    /// carry flipped vertex lists and swapped endpoint ids.
    pub ways: Vec<Way>,
    /// Number of orientation-flipped segments in the non-loop chain
    pub reversed_count: usize,
    /// Chain splices that could not match endpoints
    pub discontinuities: usize,
}

/// Orders and orients the ways of `set` into a single chain.
pub fn stitch(set: &WaySet) -> StitchOutcome {
    let all = set.ways();

    let mut loop_indices = Vec::new();
    let mut route_indices = Vec::new();
    for (i, way) in all.iter().enumerate() {
        if way.is_loop() {
            loop_indices.push(i);
        } else {
            route_indices.push(i);
        }
    }

    if route_indices.is_empty() {
        return StitchOutcome {
            ways: all.to_vec(),
            reversed_count: 0,
            discontinuities: 0,
        };
    }

    // Endpoint adjacency over the non-loop ways only, in discovery order.
    let mut adjacency: HashMap<&str, Vec<(usize, WayEnd)>> = HashMap::new();
    for &i in &route_indices {
        adjacency
            .entry(all[i].start_node.as_str())
            .or_default()
            .push((i, WayEnd::Start));
        adjacency
            .entry(all[i].end_node.as_str())
            .or_default()
            .push((i, WayEnd::End));
    }

    // Terminal nodes of the original graph, used to seed residual chains.
    let terminals: HashSet<&str> = adjacency
        .iter()
        .filter(|(_, ends)| ends.len() == 1)
        .map(|(node, _)| *node)
        .collect();

    let start_node = select_start(all, &route_indices, &adjacency);
    log::debug!("stitch start node: {}", start_node);

    let mut used: HashSet<usize> = HashSet::new();
    let mut chains: Vec<Vec<Oriented>> = Vec::new();

    let main = grow_chain(all, &adjacency, &mut used, start_node);
    if !main.is_empty() {
        chains.push(main);
    }

    // Residual chains for whatever the first walk could not reach.
    while used.len() < route_indices.len() {
        let seed = select_seed(all, &route_indices, &used, &terminals);
        used.insert(seed);

        let natural_room = unused_incident(&adjacency, &used, &all[seed].end_node);
        let reversed_room = unused_incident(&adjacency, &used, &all[seed].start_node);
        let reversed = reversed_room > natural_room;

        let far_end = if reversed {
            all[seed].start_node.clone()
        } else {
            all[seed].end_node.clone()
        };

        let mut chain = vec![Oriented {
            way: seed,
            reversed,
        }];
        chain.extend(grow_chain(all, &adjacency, &mut used, far_end));
        chains.push(chain);
    }

    let (chain, discontinuities) = consolidate(all, chains);

    let mut reversed_count = chain.iter().filter(|o| o.reversed).count();
    let chain = if reversed_count > chain.len() / 2 {
        reversed_count = chain.len() - reversed_count;
        flip(chain)
    } else {
        chain
    };

    if discontinuities > 0 {
        log::warn!(
            "stitched chain has {} discontinuit{}",
            discontinuities,
            if discontinuities == 1 { "y" } else { "ies" }
        );
    }

    let mut ways = Vec::with_capacity(all.len());
    for oriented in &chain {
        let mut way = all[oriented.way].clone();
        if oriented.reversed {
            way.reverse();
        }
        ways.push(way);
    }
    for &i in &loop_indices {
        ways.push(all[i].clone());
    }

    StitchOutcome {
        ways,
        reversed_count,
        discontinuities,
    }
}

/// Start priority: first discovered degree-1 node, else the node of
/// smallest degree, else the first way's start.
fn select_start(
    all: &[Way],
    route_indices: &[usize],
    adjacency: &HashMap<&str, Vec<(usize, WayEnd)>>,
) -> String {
    for &i in route_indices {
        for node in [&all[i].start_node, &all[i].end_node] {
            if adjacency.get(node.as_str()).map(Vec::len) == Some(1) {
                return node.clone();
            }
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for &i in route_indices {
        for node in [&all[i].start_node, &all[i].end_node] {
            let degree = adjacency.get(node.as_str()).map(Vec::len).unwrap_or(0);
            if best.map(|(_, d)| degree < d).unwrap_or(true) {
                best = Some((node.as_str(), degree));
            }
        }
    }
    match best {
        Some((node, _)) => node.to_string(),
        None => all[route_indices[0]].start_node.clone(),
    }
}

/// Greedy oriented walk from `current`: prefer a way leaving in its natural
/// orientation, fall back to a reversed one, tie-break by discovery order.
fn grow_chain(
    all: &[Way],
    adjacency: &HashMap<&str, Vec<(usize, WayEnd)>>,
    used: &mut HashSet<usize>,
    mut current: String,
) -> Vec<Oriented> {
    let mut chain = Vec::new();

    loop {
        let mut natural = None;
        let mut reversed = None;
        if let Some(ends) = adjacency.get(current.as_str()) {
            for &(way, end) in ends {
                if used.contains(&way) {
                    continue;
                }
                match end {
                    WayEnd::Start if natural.is_none() => natural = Some(way),
                    WayEnd::End if reversed.is_none() => reversed = Some(way),
                    _ => {}
                }
            }
        }

        let (way, is_reversed) = match (natural, reversed) {
            (Some(way), _) => (way, false),
            (None, Some(way)) => (way, true),
            (None, None) => break,
        };

        used.insert(way);
        chain.push(Oriented {
            way,
            reversed: is_reversed,
        });
        current = if is_reversed {
            all[way].start_node.clone()
        } else {
            all[way].end_node.clone()
        };
    }

    chain
}

/// Residual seed: prefer a way still touching an original terminal node.
fn select_seed(
    all: &[Way],
    route_indices: &[usize],
    used: &HashSet<usize>,
    terminals: &HashSet<&str>,
) -> usize {
    for &i in route_indices {
        if used.contains(&i) {
            continue;
        }
        if terminals.contains(all[i].start_node.as_str())
            || terminals.contains(all[i].end_node.as_str())
        {
            return i;
        }
    }
    route_indices
        .iter()
        .copied()
        .find(|i| !used.contains(i))
        .unwrap_or(route_indices[0])
}

fn unused_incident(
    adjacency: &HashMap<&str, Vec<(usize, WayEnd)>>,
    used: &HashSet<usize>,
    node: &str,
) -> usize {
    adjacency
        .get(node)
        .map(|ends| ends.iter().filter(|(way, _)| !used.contains(way)).count())
        .unwrap_or(0)
}

fn chain_start_node<'a>(all: &'a [Way], chain: &[Oriented]) -> &'a str {
    match chain.first() {
        Some(first) if first.reversed => &all[first.way].end_node,
        Some(first) => &all[first.way].start_node,
        None => "",
    }
}

fn chain_end_node<'a>(all: &'a [Way], chain: &[Oriented]) -> &'a str {
    match chain.last() {
        Some(last) if last.reversed => &all[last.way].start_node,
        Some(last) => &all[last.way].end_node,
        None => "",
    }
}

fn flip(chain: Vec<Oriented>) -> Vec<Oriented> {
    chain
        .into_iter()
        .rev()
        .map(|o| Oriented {
            way: o.way,
            reversed: !o.reversed,
        })
        .collect()
}

/// Splices every chain onto the longest one by endpoint matching. Chains
/// that match nowhere are appended anyway and counted as discontinuities.
fn consolidate(all: &[Way], mut chains: Vec<Vec<Oriented>>) -> (Vec<Oriented>, usize) {
    chains.sort_by(|a, b| b.len().cmp(&a.len()));
    let mut iter = chains.into_iter();
    let mut main = match iter.next() {
        Some(chain) => chain,
        None => return (Vec::new(), 0),
    };

    let mut discontinuities = 0;
    for chain in iter {
        let main_start = chain_start_node(all, &main).to_string();
        let main_end = chain_end_node(all, &main).to_string();
        let chain_start = chain_start_node(all, &chain).to_string();
        let chain_end = chain_end_node(all, &chain).to_string();

        if main_end == chain_start {
            main.extend(chain);
        } else if main_start == chain_end {
            let mut joined = chain;
            joined.extend(main);
            main = joined;
        } else if main_end == chain_end {
            main.extend(flip(chain));
        } else if main_start == chain_start {
            let mut joined = flip(chain);
            joined.extend(main);
            main = joined;
        } else {
            discontinuities += 1;
            main.extend(chain);
        }
    }

    (main, discontinuities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Coord;

    fn way(id: &str, ids: &[&str], coords: &[(f64, f64)]) -> Way {
        Way::new(
            id,
            ids.iter().map(|s| s.to_string()).collect(),
            coords.iter().map(|&(lon, lat)| Coord(lon, lat)).collect(),
        )
    }

    fn ids(outcome: &StitchOutcome) -> Vec<&str> {
        outcome.ways.iter().map(|w| w.id.as_str()).collect()
    }

    #[test]
    fn test_already_ordered_chain_passes_through() {
        let set = WaySet::new(vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.001, 0.001)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(ids(&outcome), vec!["a", "b"]);
        assert_eq!(outcome.reversed_count, 0);
        assert!(!outcome.ways[0].reversed);
        assert!(!outcome.ways[1].reversed);
    }

    #[test]
    fn test_reversed_way_is_oriented() {
        // b is drawn end-to-start relative to the travel direction
        let set = WaySet::new(vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["3", "2"], &[(0.001, 0.001), (0.0, 0.001)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(ids(&outcome), vec!["a", "b"]);
        assert!(outcome.ways[1].reversed);
        assert_eq!(outcome.ways[1].start_node, "2");
        assert_eq!(outcome.ways[1].end_node, "3");
        assert_eq!(outcome.ways[1].nodes[0], Coord(0.0, 0.001));
        assert_eq!(outcome.reversed_count, 1);
    }

    #[test]
    fn test_shuffled_input_is_reassembled() {
        let set = WaySet::new(vec![
            way("mid", &["2", "3"], &[(0.0, 0.001), (0.0, 0.002)]),
            way("last", &["3", "4"], &[(0.0, 0.002), (0.0, 0.003)]),
            way("first", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(ids(&outcome), vec!["first", "mid", "last"]);
        assert_eq!(outcome.reversed_count, 0);
        assert_eq!(outcome.discontinuities, 0);
    }

    #[test]
    fn test_every_way_appears_exactly_once() {
        let set = WaySet::new(vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["4", "3"], &[(0.0, 0.004), (0.0, 0.002)]),
            way("c", &["2", "3"], &[(0.0, 0.001), (0.0, 0.002)]),
            way("loop", &["5", "6", "5"], &[(0.01, 0.0), (0.01, 0.001), (0.01, 0.0)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(outcome.ways.len(), 4);
        let mut seen: Vec<&str> = ids(&outcome);
        seen.sort_unstable();
        assert_eq!(seen, vec!["a", "b", "c", "loop"]);
    }

    #[test]
    fn test_loops_are_appended_last() {
        let set = WaySet::new(vec![
            way("loop", &["9", "8", "9"], &[(0.01, 0.0), (0.01, 0.001), (0.01, 0.0)]),
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.0, 0.002)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(ids(&outcome), vec!["a", "b", "loop"]);
        assert!(!outcome.ways[2].reversed);
    }

    #[test]
    fn test_all_loops_returns_input_unchanged() {
        let set = WaySet::new(vec![
            way("l1", &["1", "2", "1"], &[(0.0, 0.0), (0.0, 0.001), (0.0, 0.0)]),
            way("l2", &["3", "4", "3"], &[(0.01, 0.0), (0.01, 0.001), (0.01, 0.0)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(ids(&outcome), vec!["l1", "l2"]);
        assert_eq!(outcome.reversed_count, 0);
    }

    #[test]
    fn test_majority_orientation_is_preserved() {
        // All three ways are drawn against the walk direction; flipping the
        // whole chain keeps the source orientation for every segment.
        let set = WaySet::new(vec![
            way("a", &["2", "1"], &[(0.0, 0.001), (0.0, 0.0)]),
            way("b", &["3", "2"], &[(0.0, 0.002), (0.0, 0.001)]),
            way("c", &["4", "3"], &[(0.0, 0.003), (0.0, 0.002)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(outcome.reversed_count, 0);
        assert!(outcome.ways.iter().all(|w| !w.reversed));
        // The chain runs 4 -> 1
        assert_eq!(outcome.ways[0].id, "c");
        assert_eq!(outcome.ways[2].id, "a");
    }

    #[test]
    fn test_orientation_minimality_property() {
        let set = WaySet::new(vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["3", "2"], &[(0.0, 0.002), (0.0, 0.001)]),
            way("c", &["3", "4"], &[(0.0, 0.002), (0.0, 0.003)]),
            way("d", &["5", "4"], &[(0.0, 0.004), (0.0, 0.003)]),
        ]);
        let outcome = stitch(&set);
        let non_loop = outcome.ways.iter().filter(|w| !w.is_loop()).count();
        assert!(outcome.reversed_count <= non_loop / 2);
    }

    #[test]
    fn test_disconnected_chains_are_spliced_with_discontinuity() {
        // Two islands that share no node at all
        let set = WaySet::new(vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.0, 0.002)]),
            way("x", &["10", "11"], &[(0.01, 0.0), (0.01, 0.001)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(outcome.ways.len(), 3);
        assert_eq!(outcome.discontinuities, 1);
    }

    #[test]
    fn test_greedy_walk_follows_reversed_fallback_across_the_chain() {
        let set = WaySet::new(vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.0, 0.002)]),
            way("c", &["4", "3"], &[(0.0, 0.003), (0.0, 0.002)]),
            way("d", &["4", "5"], &[(0.0, 0.003), (0.0, 0.004)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(outcome.ways.len(), 4);
        assert_eq!(outcome.discontinuities, 0);
        // Chain must be node-continuous end to end
        for pair in outcome.ways.windows(2) {
            assert_eq!(pair[0].end_node, pair[1].start_node);
        }
    }

    #[test]
    fn test_branch_at_junction_becomes_residual_chain() {
        // Node 2 is a three-way junction; the greedy walk exhausts one
        // branch, the other comes back as a residual chain seeded from the
        // terminal at node 5.
        let set = WaySet::new(vec![
            way("a", &["1", "2"], &[(0.0, 0.0), (0.0, 0.001)]),
            way("b", &["2", "3"], &[(0.0, 0.001), (0.0, 0.002)]),
            way("c", &["2", "4"], &[(0.0, 0.001), (0.001, 0.001)]),
            way("d", &["4", "5"], &[(0.001, 0.001), (0.002, 0.001)]),
        ]);
        let outcome = stitch(&set);
        assert_eq!(outcome.ways.len(), 4);
        // The main walk takes a then b; the c-d branch is appended after it
        assert_eq!(outcome.ways[0].id, "a");
        assert_eq!(outcome.ways[1].id, "b");
        assert_eq!(outcome.discontinuities, 1);
        let mut seen: Vec<&str> = ids(&outcome);
        seen.sort_unstable();
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }
}
