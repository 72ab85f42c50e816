use crate::layout::{Diagnostics, LabelPosition, LayoutResult, NodeKind, PassStats};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Flat, presentation-ready view of a [`LayoutResult`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub layers: Vec<LayerDump>,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub labels: Vec<LabelDump>,
    pub stats: PassStats,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDump {
    pub date: String,
    pub sublevel: usize,
    pub x: f32,
    pub width: f32,
    pub node_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDump {
    pub node: usize,
    /// Publication id, or `start->end` for an edge hop.
    pub key: String,
    pub dummy: bool,
    pub layer: usize,
    pub index: usize,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDump {
    pub from: usize,
    pub to: usize,
    pub points: [[f32; 2]; 2],
    pub color: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDump {
    pub publication: String,
    pub position: LabelPosition,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub lines: Vec<String>,
}

impl LayoutDump {
    pub fn from_result(result: &LayoutResult) -> Self {
        let layers = result
            .layers
            .iter()
            .map(|layer| LayerDump {
                date: layer.id.date.clone(),
                sublevel: layer.id.sublevel,
                x: layer.x,
                width: layer.width,
                node_count: layer.nodes.len(),
            })
            .collect();

        let nodes = result
            .layers
            .iter()
            .enumerate()
            .flat_map(|(layer_idx, layer)| {
                layer.nodes.iter().map(move |node| NodeDump {
                    node: node.node.0,
                    key: match &node.kind {
                        NodeKind::Publication { id } => id.to_string(),
                        NodeKind::Dummy {
                            edge_start,
                            edge_end,
                        } => format!("{edge_start}->{edge_end}"),
                    },
                    dummy: node.kind.is_dummy(),
                    layer: layer_idx,
                    index: node.index_in_layer,
                    x: node.x,
                    y: node.y,
                    radius: node.radius,
                    color: node.color.to_hex(),
                })
            })
            .collect();

        let edges = result
            .edges
            .iter()
            .map(|edge| EdgeDump {
                from: edge.from.0,
                to: edge.to.0,
                points: [[edge.start.0, edge.start.1], [edge.end.0, edge.end.1]],
                color: edge.color.to_hex(),
            })
            .collect();

        let labels = result
            .labels
            .iter()
            .map(|label| LabelDump {
                publication: label.publication.to_string(),
                position: label.position,
                x: label.rect.x,
                y: label.rect.y,
                width: label.rect.width,
                height: label.rect.height,
                lines: label.lines.clone(),
            })
            .collect();

        LayoutDump {
            width: result.width,
            height: result.height,
            layers,
            nodes,
            edges,
            labels,
            stats: result.stats.clone(),
            diagnostics: result.diagnostics.clone(),
        }
    }
}

pub fn write_layout_dump_to(writer: impl Write, result: &LayoutResult) -> anyhow::Result<()> {
    let dump = LayoutDump::from_result(result);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}

pub fn write_layout_dump(path: &Path, result: &LayoutResult) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_layout_dump_to(&mut writer, result)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutOptions;
    use crate::ir::{Publication, PublicationSet};
    use crate::layout::LayoutEngine;

    #[test]
    fn dump_lists_every_node_and_edge() {
        let set: PublicationSet = [
            Publication::new("new").with_date("2003").citing("old"),
            Publication::new("mid").with_date("2002").citing("old"),
            Publication::new("old").with_date("2001"),
        ]
        .into_iter()
        .collect();
        let result = LayoutEngine::default().layout(&set, &LayoutOptions::default());
        let dump = LayoutDump::from_result(&result);
        assert_eq!(dump.layers.len(), 3);
        assert_eq!(dump.nodes.len(), 4);
        assert!(dump.nodes.iter().any(|n| n.dummy && n.key == "new->old"));
        assert_eq!(dump.edges.len(), result.edges.len());

        let mut buf = Vec::new();
        write_layout_dump_to(&mut buf, &result).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["layers"][0]["date"], "2001");
        assert!(value["stats"]["dummyNodes"].is_null());
        assert_eq!(value["stats"]["dummy_nodes"], 1);
    }
}
