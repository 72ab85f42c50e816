//! Continuous coordinates: node sizes, vertical relaxation and layer columns.

use std::collections::BTreeMap;

use crate::config::{Budgets, LayoutConfig};
use crate::ir::Identifier;

use super::budget::Budget;
use super::graph::LayoutGraph;
use super::{LayerId, NodeId, PublicationInfo, Side};

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct RelaxOutcome {
    pub(super) iterations: usize,
    pub(super) timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct LayerColumn {
    pub(super) x: f32,
    pub(super) width: f32,
}

pub(super) fn node_radius(reverse_degree: usize, config: &LayoutConfig) -> f32 {
    (reverse_degree as f32).sqrt() * config.radius_k + config.radius_base
}

pub(super) fn assign_sizes(
    graph: &mut LayoutGraph,
    info: &BTreeMap<Identifier, PublicationInfo>,
    config: &LayoutConfig,
) {
    for node in graph.nodes_mut() {
        node.size = match node.kind.publication() {
            Some(id) => {
                let degree = info.get(id).map(|i| i.reverse_degree).unwrap_or(0);
                2.0 * node_radius(degree, config) + config.spacing
            }
            None => config.edge_thickness + config.spacing,
        };
    }
}

/// Stack every layer from zero by cumulative size, in index order.
pub(super) fn initial_stack(graph: &mut LayoutGraph) {
    let orders: Vec<Vec<NodeId>> = graph.layers.values().map(|l| l.nodes.clone()).collect();
    for order in orders {
        let mut top = 0.0f32;
        for id in order {
            if let Some(node) = graph.node_mut(id) {
                node.y = top + node.size / 2.0;
                node.new_y = node.y;
                top += node.size;
            }
        }
    }
}

/// Alternate forward and backward layer sweeps pulling every node toward
/// the mean of its neighbors, until nothing moves more than `epsilon` or the
/// budget runs out. Within-layer order is never changed.
pub(super) fn relax(graph: &mut LayoutGraph, config: &LayoutConfig, budgets: &Budgets) -> RelaxOutcome {
    let keys: Vec<LayerId> = graph.layers.keys().cloned().collect();
    let mut budget = Budget::new(budgets.relaxation_ms, budgets.relaxation_iterations);
    let epsilon = config.relaxation_epsilon.max(f32::EPSILON);

    while budget.next_iteration() {
        let mut moved = 0.0f32;
        for key in &keys {
            moved = moved.max(relax_layer(graph, key, epsilon));
        }
        for key in keys.iter().rev() {
            moved = moved.max(relax_layer(graph, key, epsilon));
        }
        if moved < epsilon {
            break;
        }
    }

    let outcome = RelaxOutcome {
        iterations: budget.used(),
        timed_out: budget.timed_out(),
    };
    tracing::debug!(
        iterations = outcome.iterations,
        timed_out = outcome.timed_out,
        "relaxed coordinates"
    );
    outcome
}

/// Returns the largest displacement applied in this layer.
fn relax_layer(graph: &mut LayoutGraph, key: &LayerId, epsilon: f32) -> f32 {
    let Some(order) = graph.layers.get(key).map(|l| l.nodes.clone()) else {
        return 0.0;
    };
    let mut current = Vec::with_capacity(order.len());
    let mut targets = Vec::with_capacity(order.len());
    let mut gaps = Vec::with_capacity(order.len());
    let mut previous_size: Option<f32> = None;

    for id in &order {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        let neighbor_ys: Vec<f32> = Side::BOTH
            .iter()
            .flat_map(|side| node.neighbors(*side).iter())
            .filter_map(|other| graph.node(*other).map(|n| n.y))
            .collect();
        let target = if neighbor_ys.is_empty() {
            node.y
        } else {
            neighbor_ys.iter().sum::<f32>() / neighbor_ys.len() as f32
        };
        current.push(node.y);
        targets.push(target);
        gaps.push(previous_size.map_or(0.0, |prev| (prev + node.size) / 2.0));
        previous_size = Some(node.size);
    }

    let mut ys = targets.clone();
    settle(&mut ys, &targets, &gaps, epsilon);

    let mut moved = 0.0f32;
    for ((id, y), (before, target)) in order.iter().zip(&ys).zip(current.iter().zip(&targets)) {
        if let Some(node) = graph.node_mut(*id) {
            node.new_y = *target;
            node.y = *y;
        }
        moved = moved.max((y - before).abs());
    }
    moved
}

/// Place `ys` as close to `targets` as the minimum center gaps allow.
///
/// `gaps[i]` is the required distance between entries `i - 1` and `i`.
/// A forward pass clamps each entry below its predecessor; tight runs of
/// entries (blocks) then shift by the mean of their members' remaining
/// deltas, bounded by the neighbouring blocks, until no block moves more
/// than `epsilon`.
pub(super) fn settle(ys: &mut [f32], targets: &[f32], gaps: &[f32], epsilon: f32) {
    let n = ys.len();
    for i in 1..n {
        ys[i] = ys[i].max(ys[i - 1] + gaps[i]);
    }

    let tight = epsilon * 1e-3;
    for _ in 0..(2 * n + 8) {
        let mut moved = 0.0f32;
        let mut start = 0;
        while start < n {
            let mut end = start + 1;
            while end < n && ys[end] - ys[end - 1] - gaps[end] <= tight {
                end += 1;
            }

            let len = (end - start) as f32;
            let mut shift = (start..end).map(|j| targets[j] - ys[j]).sum::<f32>() / len;
            if start > 0 {
                shift = shift.max(ys[start - 1] + gaps[start] - ys[start]);
            }
            if end < n {
                shift = shift.min(ys[end] - gaps[end] - ys[end - 1]);
            }
            for y in &mut ys[start..end] {
                *y += shift;
            }
            moved = moved.max(shift.abs());
            start = end;
        }
        if moved < epsilon {
            break;
        }
    }
}

/// Shift every node so that the smallest center `y` is zero.
pub(super) fn normalize(graph: &mut LayoutGraph) {
    let min_y = graph
        .nodes()
        .map(|(_, node)| node.y)
        .fold(f32::INFINITY, f32::min);
    if !min_y.is_finite() {
        return;
    }
    for node in graph.nodes_mut() {
        node.y -= min_y;
        node.new_y -= min_y;
    }
}

/// Left-to-right layer columns. A column is at least `min_layer_width`
/// wide, at least as wide as its widest node, and wide enough that no edge
/// to the next layer is steeper than `max_edge_slope`.
pub(super) fn layer_columns(
    graph: &mut LayoutGraph,
    config: &LayoutConfig,
) -> BTreeMap<LayerId, LayerColumn> {
    let mut columns = BTreeMap::new();
    let mut x = 0.0f32;
    for (key, layer) in &graph.layers {
        let mut width = config.min_layer_width;
        for id in &layer.nodes {
            let Some(node) = graph.node(*id) else {
                continue;
            };
            width = width.max(node.size);
            if config.max_edge_slope > 0.0 {
                for other in node.neighbors(Side::Higher) {
                    if let Some(higher) = graph.node(*other) {
                        width = width.max((higher.y - node.y).abs() / config.max_edge_slope);
                    }
                }
            }
        }
        columns.insert(key.clone(), LayerColumn { x, width });
        x += width;
    }

    let placements: Vec<(NodeId, f32)> = graph
        .layers
        .iter()
        .flat_map(|(key, layer)| {
            let x = columns.get(key).map_or(0.0, |c| c.x);
            layer.nodes.iter().map(move |id| (*id, x))
        })
        .collect();
    for (id, x) in placements {
        if let Some(node) = graph.node_mut(id) {
            node.x = x;
        }
    }
    columns
}
