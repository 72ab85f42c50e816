//! Layout graph: an arena of real and dummy nodes grouped into ordered layers.
//!
//! Nodes are addressed by [`NodeId`] and looked up by their layer plus
//! identity (`publication` or `(edge_start, edge_end)`), so a node that is
//! still needed on the next pass keeps its id, position and layer slot.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::InsertionMode;
use crate::ir::{Identifier, PublicationSet};
use crate::theme::Color;

use super::{Diagnostics, LayerId, LayoutNode, NodeId, NodeKind, PublicationInfo, Side};

#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutGraph {
    slots: Vec<Option<LayoutNode>>,
    free: Vec<usize>,
    by_key: HashMap<(LayerId, NodeKind), NodeId>,
    by_publication: HashMap<Identifier, NodeId>,
    pub layers: BTreeMap<LayerId, Layer>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct BuildStats {
    pub(super) created: usize,
    pub(super) removed: usize,
    pub(super) edges: usize,
}

impl LayoutGraph {
    pub fn node(&self, id: NodeId) -> Option<&LayoutNode> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub(super) fn node_mut(&mut self, id: NodeId) -> Option<&mut LayoutNode> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    /// Node for `kind` inside `layer`.
    pub fn find(&self, layer: &LayerId, kind: &NodeKind) -> Option<NodeId> {
        self.by_key.get(&(layer.clone(), kind.clone())).copied()
    }

    pub fn publication_node(&self, id: &Identifier) -> Option<NodeId> {
        self.by_publication.get(id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &LayoutNode)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|node| (NodeId(idx), node)))
    }

    pub(super) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut LayoutNode> {
        self.slots.iter_mut().flatten()
    }

    pub(super) fn index_of(&self, id: NodeId) -> Option<usize> {
        self.node(id).and_then(|node| node.index_in_layer)
    }

    fn allocate(&mut self, node: LayoutNode) -> NodeId {
        let key = (node.layer.clone(), node.kind.clone());
        let publication = node.kind.publication().cloned();
        let id = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                NodeId(idx)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        self.by_key.insert(key, id);
        if let Some(publication) = publication {
            self.by_publication.insert(publication, id);
        }
        id
    }

    fn release(&mut self, id: NodeId) {
        if let Some(node) = self.slots.get_mut(id.0).and_then(Option::take) {
            if let Some(publication) = node.kind.publication() {
                if self.by_publication.get(publication) == Some(&id) {
                    self.by_publication.remove(publication);
                }
            }
            self.by_key.remove(&(node.layer, node.kind));
            self.free.push(id.0);
        }
    }

    /// Make the layer map match `active`: new layers appear empty, layers no
    /// longer used are dropped together with their nodes.
    pub(super) fn sync_layers(&mut self, active: &BTreeSet<LayerId>) -> usize {
        let stale: Vec<LayerId> = self
            .layers
            .keys()
            .filter(|key| !active.contains(*key))
            .cloned()
            .collect();
        let mut removed = 0;
        for key in stale {
            if let Some(layer) = self.layers.remove(&key) {
                for id in layer.nodes {
                    self.release(id);
                    removed += 1;
                }
            }
        }
        for key in active {
            self.layers.entry(key.clone()).or_default();
        }
        removed
    }

    /// Forget adjacency before edges are re-added; surviving nodes become
    /// fixed for ordering unless a later step marks them moveable.
    pub(super) fn clear_adjacency(&mut self) {
        for node in self.slots.iter_mut().flatten() {
            node.neighbors[0].clear();
            node.neighbors[1].clear();
            node.edge_colors.clear();
            node.moveable = false;
            node.updated = false;
        }
    }

    /// Drop every node not touched since the last `clear_adjacency`.
    pub(super) fn remove_stale_nodes(&mut self) -> usize {
        let mut stale = Vec::new();
        for layer in self.layers.values_mut() {
            layer.nodes.retain(|id| {
                let keep = self.slots[id.0].as_ref().is_some_and(|node| node.updated);
                if !keep {
                    stale.push(*id);
                }
                keep
            });
        }
        let removed = stale.len();
        for id in stale {
            self.release(id);
        }
        removed
    }

    /// Find or create the node for `kind` inside `layer`.
    fn touch(&mut self, kind: NodeKind, layer: &LayerId, rng: &mut InsertionRng) -> (NodeId, bool) {
        if let Some(id) = self.find(layer, &kind) {
            if let Some(node) = self.node_mut(id) {
                node.updated = true;
                if !node.is_dummy() {
                    node.moveable = true;
                }
            }
            return (id, false);
        }
        if let Some(id) = kind.publication().and_then(|p| self.publication_node(p)) {
            // The publication moved to another layer: start a fresh node there.
            let old_layer = self.node(id).map(|node| node.layer.clone());
            if let Some(old) = old_layer.and_then(|key| self.layers.get_mut(&key)) {
                old.nodes.retain(|other| *other != id);
            }
            self.release(id);
        }

        let mut node = LayoutNode::new(kind, layer.clone());
        node.updated = true;
        node.moveable = true;
        let id = self.allocate(node);
        let nodes = &mut self.layers.entry(layer.clone()).or_default().nodes;
        let position = rng.position(nodes.len());
        nodes.insert(position, id);
        (id, true)
    }

    fn link(&mut self, lower: NodeId, higher: NodeId, color: Color) {
        if let Some(node) = self.node_mut(lower) {
            if !node.neighbors[Side::Higher.slot()].contains(&higher) {
                node.neighbors[Side::Higher.slot()].push(higher);
            }
            node.edge_colors.insert(higher, color);
        }
        if let Some(node) = self.node_mut(higher) {
            if !node.neighbors[Side::Lower.slot()].contains(&lower) {
                node.neighbors[Side::Lower.slot()].push(lower);
            }
            node.edge_colors.insert(lower, color);
        }
    }

    /// Walk every layer between the endpoints' layers, reusing or creating
    /// one node per layer and linking consecutive nodes.
    fn add_edge(
        &mut self,
        citer: &Identifier,
        cited: &Identifier,
        layer_of: &BTreeMap<Identifier, LayerId>,
        color: Color,
        rng: &mut InsertionRng,
        stats: &mut BuildStats,
    ) {
        let (Some(a_layer), Some(b_layer)) = (layer_of.get(citer), layer_of.get(cited)) else {
            return;
        };
        let (low, high) = if a_layer <= b_layer {
            (a_layer.clone(), b_layer.clone())
        } else {
            (b_layer.clone(), a_layer.clone())
        };
        let span: Vec<LayerId> = self.layers.range(low..=high).map(|(key, _)| key.clone()).collect();

        let mut prev: Option<NodeId> = None;
        for key in span {
            let kind = if &key == a_layer {
                NodeKind::Publication { id: citer.clone() }
            } else if &key == b_layer {
                NodeKind::Publication { id: cited.clone() }
            } else {
                NodeKind::Dummy {
                    edge_start: citer.clone(),
                    edge_end: cited.clone(),
                }
            };
            let (id, created) = self.touch(kind, &key, rng);
            if created {
                stats.created += 1;
            }
            if let Some(prev) = prev {
                self.link(prev, id, color);
            }
            prev = Some(id);
        }
    }

    /// Rebuild adjacency for `included` publications against the `active`
    /// layers, then drop nodes no edge touched.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn rebuild(
        &mut self,
        publications: &PublicationSet,
        included: &BTreeSet<Identifier>,
        layer_of: &BTreeMap<Identifier, LayerId>,
        active: &BTreeSet<LayerId>,
        info: &BTreeMap<Identifier, PublicationInfo>,
        insertion: InsertionMode,
        diagnostics: &mut Diagnostics,
    ) -> BuildStats {
        let mut stats = BuildStats {
            removed: self.sync_layers(active),
            ..BuildStats::default()
        };
        self.clear_adjacency();
        let mut rng = InsertionRng::new(insertion);

        for id in included {
            let Some(publication) = publications.get(id) else {
                continue;
            };
            let color = info.get(id).map(|i| i.color).unwrap_or(Color::BLACK);
            self.add_edge(id, id, layer_of, color, &mut rng, &mut stats);

            for reference in &publication.references {
                if reference == id || !included.contains(reference) {
                    continue;
                }
                if layer_of.get(id) == layer_of.get(reference) {
                    tracing::debug!(citer = %id, cited = %reference, "skipping edge inside one layer");
                    diagnostics.same_layer_edges.push((id.clone(), reference.clone()));
                    continue;
                }
                self.add_edge(id, reference, layer_of, color, &mut rng, &mut stats);
                stats.edges += 1;
            }
        }

        stats.removed += self.remove_stale_nodes();
        self.layers.retain(|_, layer| !layer.nodes.is_empty());
        tracing::debug!(
            created = stats.created,
            removed = stats.removed,
            nodes = self.node_count(),
            "rebuilt layout graph"
        );
        stats
    }
}

/// Position source for newly created nodes.
struct InsertionRng {
    state: Option<u64>,
}

impl InsertionRng {
    fn new(mode: InsertionMode) -> Self {
        let state = match mode {
            InsertionMode::Fixed => None,
            // xorshift must not start at zero
            InsertionMode::Randomized { seed } => Some((seed ^ 0x9E37_79B9_7F4A_7C15) | 1),
        };
        Self { state }
    }

    /// Index in `0..=len` at which to insert.
    fn position(&mut self, len: usize) -> usize {
        let Some(state) = self.state.as_mut() else {
            return 0;
        };
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *state = x;
        (x % (len as u64 + 1)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Publication;

    fn layer_map(entries: &[(&str, &str, usize)]) -> BTreeMap<Identifier, LayerId> {
        entries
            .iter()
            .map(|(id, date, sub)| (Identifier::new(*id), LayerId::new(*date, *sub)))
            .collect()
    }

    fn info_for(layer_of: &BTreeMap<Identifier, LayerId>) -> BTreeMap<Identifier, PublicationInfo> {
        layer_of
            .keys()
            .map(|id| {
                (
                    id.clone(),
                    PublicationInfo {
                        date: None,
                        reverse_degree: 0,
                        color: Color::from_hash(id.stable_hash(), 1.0, 1.0),
                        show_label: true,
                        referenced_only: false,
                    },
                )
            })
            .collect()
    }

    fn build(
        graph: &mut LayoutGraph,
        set: &PublicationSet,
        layer_of: &BTreeMap<Identifier, LayerId>,
    ) -> BuildStats {
        let included: BTreeSet<Identifier> = layer_of.keys().cloned().collect();
        graph.rebuild(
            set,
            &included,
            layer_of,
            &layer_of.values().cloned().collect(),
            &info_for(layer_of),
            InsertionMode::Fixed,
            &mut Diagnostics::default(),
        )
    }

    #[test]
    fn long_edge_gets_dummy_chain() {
        let set: PublicationSet = [
            Publication::new("new").citing("old"),
            Publication::new("mid"),
            Publication::new("old"),
        ]
        .into_iter()
        .collect();
        let layer_of = layer_map(&[("new", "2003", 0), ("mid", "2002", 0), ("old", "2001", 0)]);
        let mut graph = LayoutGraph::default();
        build(&mut graph, &set, &layer_of);

        let dummy = NodeKind::Dummy {
            edge_start: Identifier::new("new"),
            edge_end: Identifier::new("old"),
        };
        let dummy_id = graph.find(&LayerId::new("2002", 0), &dummy).unwrap();
        let node = graph.node(dummy_id).unwrap();
        assert_eq!(node.layer, LayerId::new("2002", 0));
        let old = graph.publication_node(&Identifier::new("old")).unwrap();
        let new = graph.publication_node(&Identifier::new("new")).unwrap();
        assert_eq!(node.neighbors(Side::Lower), &[old]);
        assert_eq!(node.neighbors(Side::Higher), &[new]);
    }

    #[test]
    fn unchanged_rebuild_keeps_every_node() {
        let set: PublicationSet = [
            Publication::new("c").citing("a").citing("b"),
            Publication::new("b").citing("a"),
            Publication::new("a"),
        ]
        .into_iter()
        .collect();
        let layer_of = layer_map(&[("c", "3", 0), ("b", "2", 0), ("a", "1", 0)]);
        let mut graph = LayoutGraph::default();
        build(&mut graph, &set, &layer_of);
        let before: Vec<(NodeId, NodeKind)> =
            graph.nodes().map(|(id, node)| (id, node.kind.clone())).collect();

        let stats = build(&mut graph, &set, &layer_of);
        let after: Vec<(NodeId, NodeKind)> =
            graph.nodes().map(|(id, node)| (id, node.kind.clone())).collect();
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.created, 0);
        assert_eq!(before, after);
    }

    #[test]
    fn removed_publication_drops_its_nodes() {
        let full: PublicationSet = [
            Publication::new("c").citing("a"),
            Publication::new("b"),
            Publication::new("a"),
        ]
        .into_iter()
        .collect();
        let layer_of = layer_map(&[("c", "3", 0), ("b", "2", 0), ("a", "1", 0)]);
        let mut graph = LayoutGraph::default();
        build(&mut graph, &full, &layer_of);
        assert_eq!(graph.node_count(), 4);

        let reduced: PublicationSet = [Publication::new("b"), Publication::new("a")]
            .into_iter()
            .collect();
        let layer_of = layer_map(&[("b", "2", 0), ("a", "1", 0)]);
        let stats = build(&mut graph, &reduced, &layer_of);
        assert_eq!(stats.removed, 2);
        assert_eq!(graph.node_count(), 2);
        assert!(!graph.layers.contains_key(&LayerId::new("3", 0)));
    }

    #[test]
    fn randomized_positions_are_reproducible() {
        let mut a = InsertionRng::new(InsertionMode::Randomized { seed: 42 });
        let mut b = InsertionRng::new(InsertionMode::Randomized { seed: 42 });
        for len in 0..32 {
            let pa = a.position(len);
            assert_eq!(pa, b.position(len));
            assert!(pa <= len);
        }
        assert_eq!(InsertionRng::new(InsertionMode::Fixed).position(9), 0);
    }
}
