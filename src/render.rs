use crate::config::{LayoutConfig, RenderConfig};
use crate::layout::{LabelPlacement, LayoutResult, Rect};
use crate::theme::{Color, Theme};
use anyhow::Result;
use std::path::Path;

pub fn render_svg(
    result: &LayoutResult,
    theme: &Theme,
    config: &LayoutConfig,
    render_cfg: &RenderConfig,
) -> String {
    let bounds = content_bounds(result);
    let pad = render_cfg.padding.max(0.0);
    let min_x = bounds.x - pad;
    let min_y = bounds.y - pad;
    let width = (bounds.width + 2.0 * pad).max(1.0);
    let height = (bounds.height + 2.0 * pad).max(1.0);

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width:.2}\" height=\"{height:.2}\" viewBox=\"{min_x:.2} {min_y:.2} {width:.2} {height:.2}\">",
    ));
    svg.push_str(&format!(
        "<rect x=\"{min_x:.2}\" y=\"{min_y:.2}\" width=\"{width:.2}\" height=\"{height:.2}\" fill=\"{}\"/>",
        theme.background
    ));

    if render_cfg.draw_layer_guides {
        // alternate columns are shaded so same-date layers read as bands
        for layer in result.layers.iter().skip(1).step_by(2) {
            svg.push_str(&format!(
                "<rect x=\"{:.2}\" y=\"{min_y:.2}\" width=\"{:.2}\" height=\"{height:.2}\" fill=\"{}\"/>",
                layer.x, layer.width, theme.layer_guide
            ));
        }
    }

    svg.push_str("<g class=\"edges\" fill=\"none\" stroke-linecap=\"round\">");
    for edge in &result.edges {
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" {} stroke-width=\"{:.2}\"/>",
            edge.start.0,
            edge.start.1,
            edge.end.0,
            edge.end.1,
            paint("stroke", edge.color),
            config.edge_thickness
        ));
    }
    svg.push_str("</g>");

    svg.push_str("<g class=\"nodes\">");
    for node in result.layers.iter().flat_map(|layer| layer.nodes.iter()) {
        if node.kind.is_dummy() {
            continue;
        }
        svg.push_str(&format!(
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" {} stroke=\"{}\"><title>{}</title></circle>",
            node.x,
            node.y,
            node.radius,
            paint("fill", node.color),
            theme.node_stroke,
            escape_xml(&node.label)
        ));
    }
    svg.push_str("</g>");

    svg.push_str("<g class=\"labels\">");
    for label in &result.labels {
        svg.push_str(&label_svg(label, theme, config));
    }
    svg.push_str("</g>");

    svg.push_str("</svg>");
    svg
}

/// Box around everything drawn, labels included. Labels may sit left of or
/// above the first layer.
fn content_bounds(result: &LayoutResult) -> Rect {
    let mut bounds = Rect::new(0.0, 0.0, result.width, result.height);
    for node in result.layers.iter().flat_map(|layer| layer.nodes.iter()) {
        let r = node.radius.max(node.size / 2.0);
        bounds = bounds.union(&Rect::centered(node.x, node.y, 2.0 * r, 2.0 * r));
    }
    for label in &result.labels {
        bounds = bounds.union(&label.rect);
    }
    bounds
}

fn label_svg(label: &LabelPlacement, theme: &Theme, config: &LayoutConfig) -> String {
    let rect = &label.rect;
    let line_height = config.font_size * config.label_line_height;
    let mut out = format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"2\" ry=\"2\" fill=\"{}\"/>",
        rect.x, rect.y, rect.width, rect.height, theme.label_background
    );
    out.push_str(&format!(
        "<text font-family=\"{}\" font-size=\"{}\" {}>",
        escape_xml(&theme.font_family),
        config.font_size,
        paint("fill", label.color)
    ));
    for (idx, line) in label.lines.iter().enumerate() {
        let baseline = rect.y + idx as f32 * line_height + config.font_size;
        out.push_str(&format!(
            "<tspan x=\"{:.2}\" y=\"{baseline:.2}\">{}</tspan>",
            rect.x,
            escape_xml(line)
        ));
    }
    out.push_str("</text>");
    out
}

/// `fill`/`stroke` attribute pair with a separate opacity, which every SVG
/// consumer understands.
fn paint(attr: &str, color: Color) -> String {
    let hex = Color { a: 1.0, ..color }.to_hex();
    if color.a >= 1.0 {
        format!("{attr}=\"{hex}\"")
    } else {
        format!("{attr}=\"{hex}\" {attr}-opacity=\"{:.3}\"", color.a)
    }
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig, theme: &Theme) -> Result<()> {
    let mut opt = usvg::Options::default();
    if let Some(first) = theme.font_family.split(',').next() {
        opt.font_family = first.trim().trim_matches('"').to_string();
    }
    opt.fontdb_mut().load_system_fonts();
    if let Some(size) = usvg::Size::from_wh(render_cfg.width, render_cfg.height) {
        opt.default_size = size;
    }

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
