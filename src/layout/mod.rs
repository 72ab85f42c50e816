mod budget;
mod graph;
mod label_placement;
mod ordering;
mod position;
mod ranking;
mod text;
pub(crate) mod types;
pub use types::*;

pub use ranking::UNDATED_BUCKET;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::{LayoutConfig, LayoutOptions};
use crate::ir::{Identifier, PublicationSet};
use crate::theme::{Color, Theme};

use budget::Budget;
use graph::LayoutGraph;
use label_placement::{LabelRequest, place_labels};
use position::{LayerColumn, assign_sizes, initial_stack, layer_columns, node_radius, normalize, relax};

/// Stateful layered layout of a citation graph.
///
/// The engine keeps its node arena between calls to [`LayoutEngine::layout`],
/// so nodes whose identity survives a pass keep their id and place in their
/// layer. Callers must not run two passes concurrently.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
    theme: Theme,
    graph: LayoutGraph,
    publications: PublicationSet,
    info: BTreeMap<Identifier, PublicationInfo>,
    sublevels: BTreeMap<Identifier, usize>,
    layer_of: BTreeMap<Identifier, LayerId>,
    hidden_labels: BTreeSet<Identifier>,
    label_slots: HashMap<Identifier, LabelPosition>,
    stats: PassStats,
    diagnostics: Diagnostics,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            theme: Theme::default(),
            graph: LayoutGraph::default(),
            publications: PublicationSet::new(),
            info: BTreeMap::new(),
            sublevels: BTreeMap::new(),
            layer_of: BTreeMap::new(),
            hidden_labels: BTreeSet::new(),
            label_slots: HashMap::new(),
            stats: PassStats::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Replace the continuous parameters. Takes effect on the next
    /// [`relayout`](Self::relayout) or [`layout`](Self::layout).
    pub fn set_config(&mut self, config: LayoutConfig) {
        self.config = config;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    /// Full pass: layers, graph, ordering, coordinates and labels.
    pub fn layout(&mut self, publications: &PublicationSet, options: &LayoutOptions) -> LayoutResult {
        let mut diagnostics = Diagnostics::default();
        let included = included_publications(publications, options.show_isolated_nodes, &mut diagnostics);

        let layering = ranking::assign_layers(publications, &included, &mut diagnostics);
        self.info = self.publication_info(publications, &included, &layering.dates);

        let build = self.graph.rebuild(
            publications,
            &included,
            &layering.layer_of,
            &layering.active,
            &self.info,
            options.insertion,
            &mut diagnostics,
        );
        let ordering = ordering::minimize_crossings(
            &mut self.graph,
            options.heuristic,
            &options.budgets,
            self.config.greedy_min_improvement,
        );

        self.publications = publications.clone();
        self.sublevels = layering.sublevels;
        self.layer_of = layering.layer_of;
        self.label_slots.retain(|id, _| included.contains(id));
        self.stats = PassStats {
            publications: included.len(),
            edges: build.edges,
            created_nodes: build.created,
            removed_nodes: build.removed,
            crossings_before: ordering.crossings_before,
            crossings_after: ordering.crossings_after,
            ordering_rounds: ordering.rounds,
            ordering_timed_out: ordering.timed_out,
            ..PassStats::default()
        };
        self.diagnostics = diagnostics;

        let result = self.place(options);
        tracing::info!(
            publications = result.stats.publications,
            layers = result.stats.layers,
            nodes = result.stats.real_nodes + result.stats.dummy_nodes,
            crossings = result.stats.crossings_after,
            "layout pass complete"
        );
        result
    }

    /// Coordinates and labels only, keeping layers and in-layer order from
    /// the last [`layout`](Self::layout) call.
    pub fn relayout(&mut self, options: &LayoutOptions) -> LayoutResult {
        for (id, info) in self.info.iter_mut() {
            let (s, v) = if info.referenced_only {
                (self.config.additional_node_saturation, self.config.additional_node_value)
            } else {
                (self.config.node_saturation, self.config.node_value)
            };
            info.color = Color::from_hash(id.stable_hash(), s, v);
        }
        self.place(options)
    }

    pub fn selected_node(&self, id: &Identifier) -> Option<NodeDetails> {
        let publication = self.publications.get(id)?;
        let info = self.info.get(id);
        let cited_by = match info {
            Some(info) => info.reverse_degree,
            None => self
                .publications
                .iter()
                .filter(|other| other.id != *id && other.references.contains(id))
                .count(),
        };
        Some(NodeDetails {
            id: id.clone(),
            title: publication.non_empty_title().to_string(),
            dates: publication.dates.clone(),
            representative_date: info.and_then(|i| i.date.clone()),
            references: publication.references.iter().cloned().collect(),
            cited_by,
            layer: self.layer_of.get(id).cloned(),
            node: self.graph.publication_node(id),
        })
    }

    /// Show or hide one publication's label; persists across passes.
    pub fn set_label_visible(&mut self, id: &Identifier, visible: bool) {
        if visible {
            self.hidden_labels.remove(id);
        } else {
            self.hidden_labels.insert(id.clone());
        }
        if let Some(info) = self.info.get_mut(id) {
            info.show_label = visible;
        }
    }

    pub fn sublevel(&self, id: &Identifier) -> Option<usize> {
        self.sublevels.get(id).copied()
    }

    pub fn layer_of(&self, id: &Identifier) -> Option<&LayerId> {
        self.layer_of.get(id)
    }

    fn publication_info(
        &self,
        publications: &PublicationSet,
        included: &BTreeSet<Identifier>,
        dates: &BTreeMap<Identifier, Option<String>>,
    ) -> BTreeMap<Identifier, PublicationInfo> {
        let mut reverse_degree: BTreeMap<&Identifier, usize> = BTreeMap::new();
        for id in included {
            let Some(publication) = publications.get(id) else {
                continue;
            };
            for reference in &publication.references {
                if reference != id && included.contains(reference) {
                    *reverse_degree.entry(reference).or_default() += 1;
                }
            }
        }

        included
            .iter()
            .filter_map(|id| {
                let publication = publications.get(id)?;
                let referenced_only = publication.dates.is_empty() && publication.references.is_empty();
                let (s, v) = if referenced_only {
                    (self.config.additional_node_saturation, self.config.additional_node_value)
                } else {
                    (self.config.node_saturation, self.config.node_value)
                };
                Some((
                    id.clone(),
                    PublicationInfo {
                        date: dates.get(id).cloned().flatten(),
                        reverse_degree: reverse_degree.get(id).copied().unwrap_or(0),
                        color: Color::from_hash(id.stable_hash(), s, v),
                        show_label: !self.hidden_labels.contains(id),
                        referenced_only,
                    },
                ))
            })
            .collect()
    }

    /// Sizes, relaxation, columns and labels over the current graph.
    fn place(&mut self, options: &LayoutOptions) -> LayoutResult {
        assign_sizes(&mut self.graph, &self.info, &self.config);
        initial_stack(&mut self.graph);
        let relaxation = relax(&mut self.graph, &self.config, &options.budgets);
        normalize(&mut self.graph);
        let columns = layer_columns(&mut self.graph, &self.config);

        let mut stats = self.stats.clone();
        stats.layers = self.graph.layers.len();
        stats.real_nodes = self.graph.nodes().filter(|(_, n)| !n.is_dummy()).count();
        stats.dummy_nodes = self.graph.node_count() - stats.real_nodes;
        stats.relaxation_iterations = relaxation.iterations;
        stats.relaxation_timed_out = relaxation.timed_out;

        let layers = self.layer_geometry(&columns);
        let edges = self.edge_segments();

        let mut budget = Budget::new(options.budgets.label_ms, options.budgets.label_passes);
        let (requests, node_boxes) = self.label_requests();
        let labels = place_labels(&requests, &node_boxes, self.config.label_padding, &mut budget);
        for placement in &labels.placements {
            self.label_slots.insert(placement.publication.clone(), placement.position);
        }
        stats.label_passes = labels.passes;
        stats.labels_timed_out = labels.timed_out;
        tracing::debug!(
            labels = labels.placements.len(),
            passes = labels.passes,
            timed_out = labels.timed_out,
            "placed labels"
        );

        let mut width: f32 = columns.values().map(|c| c.x + c.width).fold(0.0, f32::max);
        let mut height: f32 = self
            .graph
            .nodes()
            .map(|(_, n)| n.y + n.size / 2.0)
            .fold(0.0, f32::max);
        for placement in &labels.placements {
            width = width.max(placement.rect.right());
            height = height.max(placement.rect.bottom());
        }

        LayoutResult {
            layers,
            edges,
            labels: labels.placements,
            width,
            height,
            stats,
            diagnostics: self.diagnostics.clone(),
        }
    }

    fn edge_color(&self, base: Color) -> Color {
        base.recolored(self.config.edge_saturation, self.config.edge_value)
            .with_alpha(self.config.edge_alpha)
    }

    fn layer_geometry(&mut self, columns: &BTreeMap<LayerId, LayerColumn>) -> Vec<LayerGeometry> {
        let mut layers = Vec::with_capacity(self.graph.layers.len());
        for (key, layer) in &self.graph.layers {
            let column = columns.get(key).copied().unwrap_or(LayerColumn { x: 0.0, width: 0.0 });
            let nodes = layer
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(idx, id)| {
                    let node = self.graph.node(*id)?;
                    let (radius, color, label) = match node.kind.publication() {
                        Some(pid) => {
                            let info = self.info.get(pid);
                            let degree = info.map(|i| i.reverse_degree).unwrap_or(0);
                            let title = self
                                .publications
                                .get(pid)
                                .map(|p| p.non_empty_title().to_string())
                                .unwrap_or_else(|| pid.to_string());
                            (
                                node_radius(degree, &self.config),
                                info.map(|i| i.color).unwrap_or(Color::BLACK),
                                title,
                            )
                        }
                        None => {
                            let base = node.edge_colors.values().next().copied().unwrap_or(Color::BLACK);
                            (0.0, self.edge_color(base), String::new())
                        }
                    };
                    Some(NodeGeometry {
                        node: *id,
                        kind: node.kind.clone(),
                        index_in_layer: node.index_in_layer.unwrap_or(idx),
                        x: node.x,
                        y: node.y,
                        size: node.size,
                        radius,
                        color,
                        label,
                    })
                })
                .collect();
            layers.push(LayerGeometry {
                id: key.clone(),
                x: column.x,
                width: column.width,
                nodes,
            });
        }

        let labels: Vec<(NodeId, String)> = layers
            .iter()
            .flat_map(|layer| layer.nodes.iter().map(|n| (n.node, n.label.clone())))
            .collect();
        for (id, label) in labels {
            if let Some(node) = self.graph.node_mut(id) {
                node.label = label;
            }
        }
        layers
    }

    fn edge_segments(&self) -> Vec<EdgeSegment> {
        let mut edges = Vec::new();
        for layer in self.graph.layers.values() {
            for id in &layer.nodes {
                let Some(node) = self.graph.node(*id) else {
                    continue;
                };
                for other in node.neighbors(Side::Higher) {
                    let Some(higher) = self.graph.node(*other) else {
                        continue;
                    };
                    let base = node.edge_colors.get(other).copied().unwrap_or(Color::BLACK);
                    edges.push(EdgeSegment {
                        from: *id,
                        to: *other,
                        start: (node.x, node.y),
                        end: (higher.x, higher.y),
                        color: self.edge_color(base),
                    });
                }
            }
        }
        edges
    }

    fn label_requests(&self) -> (Vec<LabelRequest>, Vec<(NodeId, Rect)>) {
        let mut requests = Vec::new();
        let mut boxes = Vec::new();
        for (id, node) in self.graph.nodes() {
            let Some(pid) = node.kind.publication() else {
                continue;
            };
            let Some(info) = self.info.get(pid) else {
                continue;
            };
            let radius = node_radius(info.reverse_degree, &self.config);
            boxes.push((id, Rect::centered(node.x, node.y, 2.0 * radius, 2.0 * radius)));
            if !info.show_label {
                continue;
            }
            let title = self
                .publications
                .get(pid)
                .map(|p| p.non_empty_title())
                .unwrap_or(pid.as_str());
            requests.push(LabelRequest {
                node: id,
                publication: pid.clone(),
                center: (node.x, node.y),
                radius,
                text: text::measure_label(title, &self.theme, &self.config),
                color: info
                    .color
                    .recolored(self.config.text_saturation, self.config.text_value),
                previous: self.label_slots.get(pid).copied(),
            });
        }
        (requests, boxes)
    }
}

/// Publications taking part in the pass. With `show_isolated` off, those
/// with no citation link to another member of the set are left out.
fn included_publications(
    publications: &PublicationSet,
    show_isolated: bool,
    diagnostics: &mut Diagnostics,
) -> BTreeSet<Identifier> {
    let mut linked: BTreeSet<&Identifier> = BTreeSet::new();
    for publication in publications.iter() {
        for reference in &publication.references {
            if reference == &publication.id {
                continue;
            }
            if publications.contains(reference) {
                linked.insert(&publication.id);
                linked.insert(reference);
            } else {
                tracing::debug!(citer = %publication.id, cited = %reference, "reference outside the set");
                diagnostics.dangling_references += 1;
            }
        }
    }
    publications
        .iter()
        .map(|p| &p.id)
        .filter(|id| show_isolated || linked.contains(id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Budgets, OrderingHeuristic};
    use crate::ir::Publication;

    fn sample() -> PublicationSet {
        [
            Publication::new("A").with_date("2020").with_title("Alpha").citing("B"),
            Publication::new("B").with_date("2020").with_title("Beta").citing("C"),
            Publication::new("C").with_date("2020").with_title("Gamma"),
            Publication::new("old").with_date("2001").citing("ghost"),
            Publication::new("lonely").with_date("2010"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn isolated_publications_can_be_hidden() {
        let set = sample();
        let mut engine = LayoutEngine::default();
        let options = LayoutOptions {
            show_isolated_nodes: false,
            ..LayoutOptions::default()
        };
        let result = engine.layout(&set, &options);
        assert!(result.find_publication(&Identifier::new("lonely")).is_none());
        assert!(result.find_publication(&Identifier::new("old")).is_none());
        assert!(result.find_publication(&Identifier::new("A")).is_some());
        assert_eq!(result.diagnostics.dangling_references, 1);
    }

    #[test]
    fn selected_node_reports_details() {
        let set = sample();
        let mut engine = LayoutEngine::default();
        engine.layout(&set, &LayoutOptions::default());
        let details = engine.selected_node(&Identifier::new("B")).unwrap();
        assert_eq!(details.title, "Beta");
        assert_eq!(details.cited_by, 1);
        assert_eq!(details.layer, Some(LayerId::new("2020", 1)));
        assert!(details.node.is_some());
        assert!(engine.selected_node(&Identifier::new("missing")).is_none());
    }

    #[test]
    fn hidden_label_persists_across_passes() {
        let set = sample();
        let mut engine = LayoutEngine::default();
        engine.layout(&set, &LayoutOptions::default());
        engine.set_label_visible(&Identifier::new("A"), false);
        let result = engine.layout(&set, &LayoutOptions::default());
        assert!(result.label_for(&Identifier::new("A")).is_none());
        assert!(result.label_for(&Identifier::new("B")).is_some());
    }

    #[test]
    fn relayout_keeps_order_and_applies_new_spacing() {
        let set = sample();
        let mut engine = LayoutEngine::default();
        let options = LayoutOptions {
            heuristic: OrderingHeuristic::GreedyInsertion,
            budgets: Budgets::default(),
            ..LayoutOptions::default()
        };
        let first = engine.layout(&set, &options);
        engine.set_config(LayoutConfig {
            min_layer_width: 250.0,
            ..LayoutConfig::default()
        });
        let second = engine.relayout(&options);
        assert_eq!(first.layers.len(), second.layers.len());
        for (a, b) in first.layers.iter().zip(&second.layers) {
            let a_ids: Vec<NodeId> = a.nodes.iter().map(|n| n.node).collect();
            let b_ids: Vec<NodeId> = b.nodes.iter().map(|n| n.node).collect();
            assert_eq!(a_ids, b_ids);
            assert!(b.width >= 250.0);
        }
        assert_eq!(first.stats.crossings_after, second.stats.crossings_after);
    }

    #[test]
    fn empty_input_gives_empty_result() {
        let mut engine = LayoutEngine::default();
        let result = engine.layout(&PublicationSet::new(), &LayoutOptions::default());
        assert_eq!(result.node_count(), 0);
        assert!(result.edges.is_empty());
        assert_eq!(result.width, 0.0);
    }
}
