use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::ir::Identifier;
use crate::theme::Color;

/// Diagram rank: date bucket first, then same-date citation depth.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LayerId {
    pub date: String,
    pub sublevel: usize,
}

impl LayerId {
    pub fn new(date: impl Into<String>, sublevel: usize) -> Self {
        Self {
            date: date.into(),
            sublevel,
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.date.is_empty() {
            write!(f, "(undated)/{}", self.sublevel)
        } else {
            write!(f, "{}/{}", self.date, self.sublevel)
        }
    }
}

/// Stable arena index of a [`LayoutNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Publication {
        id: Identifier,
    },
    /// One hop of a citation edge spanning several layers.
    Dummy {
        edge_start: Identifier,
        edge_end: Identifier,
    },
}

impl NodeKind {
    pub fn publication(&self) -> Option<&Identifier> {
        match self {
            NodeKind::Publication { id } => Some(id),
            NodeKind::Dummy { .. } => None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self, NodeKind::Dummy { .. })
    }
}

/// Neighbor direction relative to the node's own layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Lower,
    Higher,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Lower, Side::Higher];

    pub fn slot(self) -> usize {
        match self {
            Side::Lower => 0,
            Side::Higher => 1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Lower => Side::Higher,
            Side::Higher => Side::Lower,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub kind: NodeKind,
    pub neighbors: [Vec<NodeId>; 2],
    pub edge_colors: BTreeMap<NodeId, Color>,
    pub layer: LayerId,
    /// Dense rank inside the layer; `None` while (re)ordering is in progress.
    pub index_in_layer: Option<usize>,
    pub size: f32,
    pub x: f32,
    pub y: f32,
    pub new_y: f32,
    pub label: String,
    pub color: Color,
    pub updated: bool,
    pub moveable: bool,
}

impl LayoutNode {
    pub fn new(kind: NodeKind, layer: LayerId) -> Self {
        Self {
            kind,
            neighbors: [Vec::new(), Vec::new()],
            edge_colors: BTreeMap::new(),
            layer,
            index_in_layer: None,
            size: 0.0,
            x: 0.0,
            y: 0.0,
            new_y: 0.0,
            label: String::new(),
            color: Color::BLACK,
            updated: true,
            moveable: true,
        }
    }

    pub fn neighbors(&self, side: Side) -> &[NodeId] {
        &self.neighbors[side.slot()]
    }

    pub fn degree(&self) -> usize {
        self.neighbors[0].len() + self.neighbors[1].len()
    }

    pub fn is_dummy(&self) -> bool {
        self.kind.is_dummy()
    }
}

/// Engine-owned per-publication data rebuilt on every pass.
#[derive(Debug, Clone)]
pub struct PublicationInfo {
    pub date: Option<String>,
    pub reverse_degree: usize,
    pub color: Color,
    pub show_label: bool,
    /// Only known as a reference target: no date and no references of its own.
    pub referenced_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn overlap_area(&self, other: &Rect) -> f32 {
        let w = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let h = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        w * h
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }
}

#[derive(Debug, Clone)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
}

/// One of the eight label slots around a node's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelPosition {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl LabelPosition {
    pub const ALL: [LabelPosition; 8] = [
        LabelPosition::TopLeft,
        LabelPosition::Top,
        LabelPosition::TopRight,
        LabelPosition::Right,
        LabelPosition::BottomRight,
        LabelPosition::Bottom,
        LabelPosition::BottomLeft,
        LabelPosition::Left,
    ];
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeGeometry {
    pub node: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub index_in_layer: usize,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    /// Drawn radius; zero for dummy nodes.
    pub radius: f32,
    pub color: Color,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerGeometry {
    pub id: LayerId,
    pub x: f32,
    pub width: f32,
    pub nodes: Vec<NodeGeometry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeSegment {
    pub from: NodeId,
    pub to: NodeId,
    pub start: (f32, f32),
    pub end: (f32, f32),
    pub color: Color,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelPlacement {
    pub node: NodeId,
    pub publication: Identifier,
    pub lines: Vec<String>,
    pub position: LabelPosition,
    pub rect: Rect,
    pub color: Color,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassStats {
    pub publications: usize,
    pub layers: usize,
    pub real_nodes: usize,
    pub dummy_nodes: usize,
    pub edges: usize,
    pub created_nodes: usize,
    pub removed_nodes: usize,
    pub crossings_before: usize,
    pub crossings_after: usize,
    pub ordering_rounds: usize,
    pub ordering_timed_out: bool,
    pub relaxation_iterations: usize,
    pub relaxation_timed_out: bool,
    pub label_passes: usize,
    pub labels_timed_out: bool,
}

/// Recovered data problems. None of these abort a pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// Same-date ordering edges (citer, cited) dropped to break a cycle.
    pub dropped_cycle_edges: Vec<(Identifier, Identifier)>,
    /// Publications whose date was taken from a neighbor.
    pub recovered_dates: Vec<(Identifier, String)>,
    /// Publications left in the undated bucket.
    pub undated: Vec<Identifier>,
    /// References to identifiers outside the publication set.
    pub dangling_references: usize,
    /// Citation edges whose endpoints share a layer.
    pub same_layer_edges: Vec<(Identifier, Identifier)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutResult {
    pub layers: Vec<LayerGeometry>,
    pub edges: Vec<EdgeSegment>,
    pub labels: Vec<LabelPlacement>,
    pub width: f32,
    pub height: f32,
    pub stats: PassStats,
    pub diagnostics: Diagnostics,
}

impl LayoutResult {
    pub fn node_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.nodes.len()).sum()
    }

    pub fn find_publication(&self, id: &Identifier) -> Option<&NodeGeometry> {
        self.layers
            .iter()
            .flat_map(|layer| layer.nodes.iter())
            .find(|node| node.kind.publication() == Some(id))
    }

    pub fn label_for(&self, id: &Identifier) -> Option<&LabelPlacement> {
        self.labels.iter().find(|label| &label.publication == id)
    }
}

/// Drill-down view of one publication for a selection handler.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDetails {
    pub id: Identifier,
    pub title: String,
    pub dates: Vec<String>,
    pub representative_date: Option<String>,
    pub references: Vec<Identifier>,
    pub cited_by: usize,
    pub layer: Option<LayerId>,
    pub node: Option<NodeId>,
}
