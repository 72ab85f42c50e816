//! Crossing minimization inside layers.
//!
//! The objective is the number of inverted neighbor pairs between every two
//! adjacent layers. Each round is either kept (objective went down) or rolled
//! back, so the reported total never increases from one round to the next.

use crate::config::{Budgets, OrderingHeuristic};

use super::budget::Budget;
use super::graph::LayoutGraph;
use super::{LayerId, NodeId, Side};

#[derive(Debug, Clone, Default)]
pub(super) struct OrderingOutcome {
    pub(super) crossings_before: usize,
    pub(super) crossings_after: usize,
    pub(super) rounds: usize,
    pub(super) timed_out: bool,
    /// Objective after every accepted round.
    pub(super) round_totals: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GreedySides {
    /// Downward passes look at the lower side, upward passes at the higher.
    Single,
    Both,
}

pub(super) fn minimize_crossings(
    graph: &mut LayoutGraph,
    heuristic: OrderingHeuristic,
    budgets: &Budgets,
    min_improvement: f32,
) -> OrderingOutcome {
    let keys: Vec<LayerId> = graph.layers.keys().cloned().collect();
    resolve_indices(graph, &keys);

    let before = total_crossings(graph);
    let mut outcome = OrderingOutcome {
        crossings_before: before,
        crossings_after: before,
        ..OrderingOutcome::default()
    };
    if keys.len() < 2 || before == 0 {
        return outcome;
    }

    let mut budget = Budget::new(budgets.ordering_ms, budgets.ordering_rounds);
    match heuristic {
        OrderingHeuristic::BarycenterSinglePass => {
            if budget.next_iteration() {
                barycenter_round(graph, &keys, &mut budget);
            }
            outcome.crossings_after = total_crossings(graph);
        }
        OrderingHeuristic::Barycenter => {
            run_rounds(graph, &keys, &mut budget, 0.0, &mut outcome, barycenter_round);
        }
        OrderingHeuristic::GreedyInsertion => {
            for sides in [GreedySides::Single, GreedySides::Both] {
                run_rounds(graph, &keys, &mut budget, min_improvement, &mut outcome, |g, k, b| {
                    greedy_round(g, k, sides, b)
                });
                if outcome.crossings_after == 0 || budget.timed_out() {
                    break;
                }
            }
        }
    }

    outcome.rounds = budget.used();
    outcome.timed_out = budget.timed_out();
    tracing::debug!(
        heuristic = ?heuristic,
        before = outcome.crossings_before,
        after = outcome.crossings_after,
        rounds = outcome.rounds,
        timed_out = outcome.timed_out,
        "ordered layers"
    );
    outcome
}

/// Repeat `round` while it strictly lowers the objective by at least the
/// relative `min_improvement`. A worse or interrupted round is undone.
fn run_rounds(
    graph: &mut LayoutGraph,
    keys: &[LayerId],
    budget: &mut Budget,
    min_improvement: f32,
    outcome: &mut OrderingOutcome,
    mut round: impl FnMut(&mut LayoutGraph, &[LayerId], &mut Budget) -> bool,
) {
    let mut best = outcome.crossings_after;
    while best > 0 && budget.next_iteration() {
        let snapshot = snapshot(graph, keys);
        let completed = round(graph, keys, budget);
        let crossings = total_crossings(graph);
        if !completed || crossings >= best {
            restore(graph, snapshot);
            break;
        }
        let improvement = (best - crossings) as f32 / best as f32;
        best = crossings;
        outcome.round_totals.push(best);
        if improvement < min_improvement {
            break;
        }
    }
    outcome.crossings_after = best;
}

/// Hand out dense indices lowest layer first. Nodes created this pass have
/// no index yet; a layer holding one is ordered by barycenter over its lower
/// neighbors, other layers keep their order.
fn resolve_indices(graph: &mut LayoutGraph, keys: &[LayerId]) {
    for key in keys {
        let order = layer_order(graph, key);
        let pending = order.iter().any(|id| graph.index_of(*id).is_none());
        if pending && barycenter_layer(graph, key, Side::Lower) {
            continue;
        }
        if pending {
            tracing::debug!(layer = %key, "lower neighbors unindexed, keeping insertion order");
        }
        write_layer(graph, key, order);
    }
}

/// One downward sweep against lower neighbors and one upward sweep against
/// higher neighbors. Returns `false` if the deadline cut the round short.
fn barycenter_round(graph: &mut LayoutGraph, keys: &[LayerId], budget: &mut Budget) -> bool {
    for key in keys.iter().skip(1) {
        if budget.expired() || !barycenter_layer(graph, key, Side::Lower) {
            return false;
        }
    }
    for key in keys.iter().rev().skip(1) {
        if budget.expired() || !barycenter_layer(graph, key, Side::Higher) {
            return false;
        }
    }
    true
}

/// Every `side` neighbor of `id` already has its index.
fn neighbors_indexed(graph: &LayoutGraph, id: NodeId, side: Side) -> bool {
    graph.node(id).is_none_or(|node| {
        node.neighbors(side)
            .iter()
            .all(|other| graph.index_of(*other).is_some())
    })
}

/// Sort moveable nodes by the mean index of their `side` neighbors; nodes
/// without neighbors there keep their position. Leaves the layer untouched
/// and returns `false` while any node waits on an unindexed neighbor.
fn barycenter_layer(graph: &mut LayoutGraph, key: &LayerId, side: Side) -> bool {
    let order = layer_order(graph, key);
    if !order.iter().all(|id| neighbors_indexed(graph, *id, side)) {
        return false;
    }
    let mut fixed: Vec<Option<NodeId>> = vec![None; order.len()];
    let mut movers: Vec<(f32, usize, NodeId)> = Vec::new();

    for (idx, id) in order.iter().enumerate() {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        if !node.moveable {
            fixed[idx] = Some(*id);
            continue;
        }
        let positions = neighbor_positions(graph, *id, side);
        let barycenter = if positions.is_empty() {
            idx as f32
        } else {
            positions.iter().sum::<usize>() as f32 / positions.len() as f32
        };
        movers.push((barycenter, idx, *id));
    }
    movers.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut movers = movers.into_iter().map(|(_, _, id)| id);
    let next: Vec<NodeId> = fixed
        .into_iter()
        .filter_map(|slot| slot.or_else(|| movers.next()))
        .collect();
    write_layer(graph, key, next);
    true
}

fn greedy_round(
    graph: &mut LayoutGraph,
    keys: &[LayerId],
    sides: GreedySides,
    budget: &mut Budget,
) -> bool {
    let down: &[Side] = match sides {
        GreedySides::Single => &[Side::Lower],
        GreedySides::Both => &Side::BOTH,
    };
    let up: &[Side] = match sides {
        GreedySides::Single => &[Side::Higher],
        GreedySides::Both => &Side::BOTH,
    };
    for key in keys.iter().skip(1) {
        if budget.expired() {
            return false;
        }
        greedy_layer(graph, key, down);
    }
    for key in keys.iter().rev().skip(1) {
        if budget.expired() {
            return false;
        }
        greedy_layer(graph, key, up);
    }
    true
}

/// Detach moveable nodes by descending degree and put each back at the slot
/// with the fewest local crossings, preferring the smallest displacement.
fn greedy_layer(graph: &mut LayoutGraph, key: &LayerId, sides: &[Side]) {
    let mut order = layer_order(graph, key);
    let mut candidates: Vec<(usize, usize, NodeId)> = order
        .iter()
        .enumerate()
        .filter_map(|(idx, id)| {
            let node = graph.node(*id)?;
            node.moveable.then(|| (node.degree(), idx, *id))
        })
        .collect();
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (_, _, id) in candidates {
        let Some(current) = order.iter().position(|other| *other == id) else {
            continue;
        };
        order.remove(current);
        let own = side_positions(graph, id, sides);
        let others: Vec<[Vec<usize>; 2]> = order
            .iter()
            .map(|other| side_positions(graph, *other, sides))
            .collect();

        // cost(p) = sum over v before p of c(v, u) + sum over v from p of c(u, v)
        let mut cost: isize = others
            .iter()
            .map(|theirs| pair_crossings(&own, theirs) as isize)
            .sum();
        let mut best = (cost, 0usize.abs_diff(current), 0usize);
        for (p, theirs) in others.iter().enumerate() {
            cost += pair_crossings(theirs, &own) as isize - pair_crossings(&own, theirs) as isize;
            let slot = p + 1;
            let candidate = (cost, slot.abs_diff(current), slot);
            if (candidate.0, candidate.1) < (best.0, best.1) {
                best = candidate;
            }
        }
        order.insert(best.2, id);
    }
    write_layer(graph, key, order);
}

/// Sorted neighbor indices per side; sides not evaluated stay empty.
fn side_positions(graph: &LayoutGraph, id: NodeId, sides: &[Side]) -> [Vec<usize>; 2] {
    let mut out = [Vec::new(), Vec::new()];
    for side in sides {
        out[side.slot()] = neighbor_positions(graph, id, *side);
    }
    out
}

/// Crossings contributed when `left` is placed before `right`.
fn pair_crossings(left: &[Vec<usize>; 2], right: &[Vec<usize>; 2]) -> usize {
    count_inversions(&left[0], &right[0]) + count_inversions(&left[1], &right[1])
}

/// Pairs `(a, b)` with `a > b`, for two ascending lists.
pub(super) fn count_inversions(left: &[usize], right: &[usize]) -> usize {
    let mut i = 0;
    let mut count = 0;
    for b in right {
        while i < left.len() && left[i] <= *b {
            i += 1;
        }
        count += left.len() - i;
    }
    count
}

fn neighbor_positions(graph: &LayoutGraph, id: NodeId, side: Side) -> Vec<usize> {
    let mut positions: Vec<usize> = graph
        .node(id)
        .map(|node| {
            node.neighbors(side)
                .iter()
                .filter_map(|other| graph.index_of(*other))
                .collect()
        })
        .unwrap_or_default();
    positions.sort_unstable();
    positions
}

/// Sum of crossings between every pair of adjacent layers, using an
/// accumulator tree over the higher layer's positions.
pub(super) fn total_crossings(graph: &LayoutGraph) -> usize {
    let keys: Vec<&LayerId> = graph.layers.keys().collect();
    keys.windows(2)
        .map(|pair| {
            let lower = &graph.layers[pair[0]].nodes;
            let higher_len = graph.layers[pair[1]].nodes.len();
            two_layer_crossings(graph, lower, higher_len)
        })
        .sum()
}

fn two_layer_crossings(graph: &LayoutGraph, lower: &[NodeId], higher_len: usize) -> usize {
    if higher_len == 0 {
        return 0;
    }
    let mut entries: Vec<usize> = Vec::new();
    for id in lower {
        entries.extend(neighbor_positions(graph, *id, Side::Higher));
    }

    let mut first_index = 1usize;
    while first_index < higher_len {
        first_index <<= 1;
    }
    let mut tree = vec![0usize; 2 * first_index - 1];
    first_index -= 1;

    let mut crossings = 0;
    for pos in entries {
        let mut index = pos + first_index;
        if index >= tree.len() {
            continue;
        }
        tree[index] += 1;
        let mut weight_sum = 0;
        while index > 0 {
            if index % 2 == 1 {
                weight_sum += tree[index + 1];
            }
            index = (index - 1) >> 1;
            tree[index] += 1;
        }
        crossings += weight_sum;
    }
    crossings
}

fn layer_order(graph: &LayoutGraph, key: &LayerId) -> Vec<NodeId> {
    graph
        .layers
        .get(key)
        .map(|layer| layer.nodes.clone())
        .unwrap_or_default()
}

/// Store `order` as the layer's node list and give every node its dense index.
pub(super) fn write_layer(graph: &mut LayoutGraph, key: &LayerId, order: Vec<NodeId>) {
    for (idx, id) in order.iter().enumerate() {
        if let Some(node) = graph.node_mut(*id) {
            node.index_in_layer = Some(idx);
        }
    }
    if let Some(layer) = graph.layers.get_mut(key) {
        layer.nodes = order;
    }
}

fn snapshot(graph: &LayoutGraph, keys: &[LayerId]) -> Vec<(LayerId, Vec<NodeId>)> {
    keys.iter()
        .map(|key| (key.clone(), layer_order(graph, key)))
        .collect()
}

fn restore(graph: &mut LayoutGraph, snapshot: Vec<(LayerId, Vec<NodeId>)>) {
    for (key, order) in snapshot {
        write_layer(graph, &key, order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsertionMode;
    use crate::ir::{Identifier, Publication, PublicationSet};
    use crate::layout::{Diagnostics, PublicationInfo};
    use crate::theme::Color;
    use std::collections::{BTreeMap, BTreeSet};

    fn build(pubs: Vec<Publication>, layers: &[(&str, &str)]) -> LayoutGraph {
        let set: PublicationSet = pubs.into_iter().collect();
        let layer_of: BTreeMap<Identifier, LayerId> = layers
            .iter()
            .map(|(id, date)| (Identifier::new(*id), LayerId::new(*date, 0)))
            .collect();
        let info: BTreeMap<Identifier, PublicationInfo> = layer_of
            .keys()
            .map(|id| {
                (
                    id.clone(),
                    PublicationInfo {
                        date: None,
                        reverse_degree: 0,
                        color: Color::BLACK,
                        show_label: true,
                        referenced_only: false,
                    },
                )
            })
            .collect();
        let included: BTreeSet<Identifier> = layer_of.keys().cloned().collect();
        let mut graph = LayoutGraph::default();
        graph.rebuild(
            &set,
            &included,
            &layer_of,
            &layer_of.values().cloned().collect(),
            &info,
            InsertionMode::Fixed,
            &mut Diagnostics::default(),
        );
        graph
    }

    fn id_of(graph: &LayoutGraph, name: &str) -> NodeId {
        graph.publication_node(&Identifier::new(name)).unwrap()
    }

    fn crossed_pair() -> LayoutGraph {
        let mut graph = build(
            vec![
                Publication::new("c").citing("a"),
                Publication::new("d").citing("b"),
                Publication::new("a"),
                Publication::new("b"),
            ],
            &[("a", "1"), ("b", "1"), ("c", "2"), ("d", "2")],
        );
        let (a, b, c, d) = (
            id_of(&graph, "a"),
            id_of(&graph, "b"),
            id_of(&graph, "c"),
            id_of(&graph, "d"),
        );
        write_layer(&mut graph, &LayerId::new("1", 0), vec![a, b]);
        write_layer(&mut graph, &LayerId::new("2", 0), vec![d, c]);
        graph
    }

    fn tangled() -> LayoutGraph {
        let names = ["p0", "p1", "p2", "p3", "p4"];
        let mut pubs = Vec::new();
        let mut layers = Vec::new();
        for (layer, date) in ["1", "2", "3"].iter().enumerate() {
            for (i, name) in names.iter().enumerate() {
                let id = format!("{name}_{layer}");
                let mut publication = Publication::new(id.as_str());
                if layer > 0 {
                    publication = publication
                        .citing(format!("{}_{}", names[(i * 3 + 1) % 5], layer - 1).as_str())
                        .citing(format!("{}_{}", names[(i + 2) % 5], layer - 1).as_str());
                }
                pubs.push(publication);
                layers.push((id, *date));
            }
        }
        let layers: Vec<(&str, &str)> = layers.iter().map(|(id, d)| (id.as_str(), *d)).collect();
        build(pubs, &layers)
    }

    #[test]
    fn inversion_count_matches_brute_force() {
        let left = [1, 3, 5, 7];
        let right = [0, 2, 2, 6, 8];
        let brute = left
            .iter()
            .flat_map(|a| right.iter().map(move |b| (a, b)))
            .filter(|(a, b)| a > b)
            .count();
        assert_eq!(count_inversions(&left, &right), brute);
        assert_eq!(count_inversions(&[], &right), 0);
    }

    #[test]
    fn counts_single_crossing() {
        let graph = crossed_pair();
        assert_eq!(total_crossings(&graph), 1);
    }

    #[test]
    fn barycenter_untangles_simple_crossing() {
        let mut graph = crossed_pair();
        let outcome = minimize_crossings(
            &mut graph,
            OrderingHeuristic::Barycenter,
            &Budgets::default(),
            0.0,
        );
        assert_eq!(outcome.crossings_before, 1);
        assert_eq!(outcome.crossings_after, 0);
        assert_eq!(total_crossings(&graph), 0);
    }

    #[test]
    fn greedy_untangles_simple_crossing() {
        let mut graph = crossed_pair();
        let outcome = minimize_crossings(
            &mut graph,
            OrderingHeuristic::GreedyInsertion,
            &Budgets::default(),
            0.0,
        );
        assert_eq!(outcome.crossings_after, 0);
    }

    #[test]
    fn rounds_never_increase_crossings() {
        for heuristic in [OrderingHeuristic::Barycenter, OrderingHeuristic::GreedyInsertion] {
            let mut graph = tangled();
            let outcome = minimize_crossings(&mut graph, heuristic, &Budgets::default(), 0.0);
            let mut previous = outcome.crossings_before;
            for total in &outcome.round_totals {
                assert!(*total <= previous, "{heuristic:?} went from {previous} to {total}");
                previous = *total;
            }
            assert!(outcome.crossings_after <= outcome.crossings_before);
            assert_eq!(total_crossings(&graph), outcome.crossings_after);
        }
    }

    #[test]
    fn indices_are_dense_after_ordering() {
        let mut graph = tangled();
        minimize_crossings(
            &mut graph,
            OrderingHeuristic::GreedyInsertion,
            &Budgets::default(),
            0.005,
        );
        for layer in graph.layers.values() {
            for (idx, id) in layer.nodes.iter().enumerate() {
                assert_eq!(graph.index_of(*id), Some(idx));
            }
        }
    }

    #[test]
    fn fixed_nodes_keep_their_slot() {
        let mut graph = crossed_pair();
        let d = id_of(&graph, "d");
        graph.node_mut(d).unwrap().moveable = false;
        let c = id_of(&graph, "c");
        graph.node_mut(c).unwrap().moveable = false;
        minimize_crossings(
            &mut graph,
            OrderingHeuristic::Barycenter,
            &Budgets::default(),
            0.0,
        );
        assert_eq!(graph.index_of(d), Some(0));
        assert_eq!(graph.index_of(c), Some(1));
    }

    #[test]
    fn exhausted_budget_keeps_previous_order() {
        let mut graph = tangled();
        let keys: Vec<LayerId> = graph.layers.keys().cloned().collect();
        resolve_indices(&mut graph, &keys);
        let before: Vec<Vec<NodeId>> = graph.layers.values().map(|l| l.nodes.clone()).collect();
        let budgets = Budgets {
            ordering_ms: 0,
            ..Budgets::default()
        };
        let outcome = minimize_crossings(&mut graph, OrderingHeuristic::Barycenter, &budgets, 0.0);
        let after: Vec<Vec<NodeId>> = graph.layers.values().map(|l| l.nodes.clone()).collect();
        assert_eq!(before, after);
        assert_eq!(outcome.crossings_after, outcome.crossings_before);
    }

    #[test]
    fn new_node_waits_for_indexed_lower_neighbors() {
        let mut graph = build(
            vec![
                Publication::new("c").citing("b"),
                Publication::new("a"),
                Publication::new("b"),
            ],
            &[("a", "1"), ("b", "1"), ("c", "2")],
        );
        let (low, high) = (LayerId::new("1", 0), LayerId::new("2", 0));
        let c = id_of(&graph, "c");
        assert_eq!(graph.index_of(id_of(&graph, "b")), None);

        assert!(!barycenter_layer(&mut graph, &high, Side::Lower));
        assert_eq!(graph.index_of(c), None);

        assert!(barycenter_layer(&mut graph, &low, Side::Lower));
        assert!(barycenter_layer(&mut graph, &high, Side::Lower));
        assert_eq!(graph.index_of(c), Some(0));
    }

    #[test]
    fn new_node_is_placed_by_its_neighbors_not_its_insertion_slot() {
        let mut graph = build(
            vec![
                Publication::new("d").citing("a"),
                Publication::new("e").citing("b"),
                Publication::new("a"),
                Publication::new("b"),
            ],
            &[("a", "1"), ("b", "1"), ("d", "2"), ("e", "2")],
        );
        let (low, high) = (LayerId::new("1", 0), LayerId::new("2", 0));
        let (a, b, d, e) = (
            id_of(&graph, "a"),
            id_of(&graph, "b"),
            id_of(&graph, "d"),
            id_of(&graph, "e"),
        );
        write_layer(&mut graph, &low, vec![a, b]);
        write_layer(&mut graph, &high, vec![e, d]);
        // `e` arrives this pass at the front of its layer
        graph.node_mut(e).unwrap().index_in_layer = None;

        let outcome = minimize_crossings(
            &mut graph,
            OrderingHeuristic::GreedyInsertion,
            &Budgets::default(),
            0.0,
        );
        assert_eq!(outcome.crossings_before, 0);
        assert_eq!(graph.layers[&high].nodes, vec![d, e]);
        assert_eq!(graph.index_of(e), Some(1));
    }
}
