use citemap::config::{InsertionMode, OrderingHeuristic};
use citemap::layout_dump::LayoutDump;
use citemap::parser::{InputFormat, parse_document};
use citemap::{RenderOptions, layout_publications, render_with_options};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitemapOptions {
    theme: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
    format: Option<String>,
    heuristic: Option<OrderingHeuristic>,
    seed: Option<u64>,
    show_isolated_nodes: Option<bool>,
}

fn build_render_options(options: &CitemapOptions) -> RenderOptions {
    let mut render_options = if options.theme.as_deref() == Some("dark") {
        RenderOptions::dark()
    } else {
        RenderOptions::light()
    };
    let config = &mut render_options.config;

    if let Some(font_family) = &options.font_family {
        config.theme.font_family = font_family.clone();
    }
    if let Some(font_size) = options.font_size {
        config.layout.font_size = font_size;
    }
    // no system fonts in the browser
    config.layout.fast_text_metrics = true;
    if let Some(heuristic) = options.heuristic {
        config.options.heuristic = heuristic;
    }
    if let Some(seed) = options.seed {
        config.options.insertion = InsertionMode::Randomized { seed };
    }
    if let Some(show) = options.show_isolated_nodes {
        config.options.show_isolated_nodes = show;
    }
    render_options
}

fn parse_options(options_json: Option<String>) -> Result<CitemapOptions, JsValue> {
    match options_json {
        Some(raw) => serde_json::from_str(&raw).map_err(|error| JsValue::from_str(&error.to_string())),
        None => Ok(CitemapOptions::default()),
    }
}

fn input_format(options: &CitemapOptions) -> Result<InputFormat, JsValue> {
    match options.format.as_deref() {
        Some(name) => name.parse().map_err(|error: citemap::parser::ParseError| JsValue::from_str(&error.to_string())),
        None => Ok(InputFormat::Json),
    }
}

/// Lay out a publication document and return the layout as JSON.
#[wasm_bindgen]
pub fn layout_citations_json(input: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let options = parse_options(options_json)?;
    let format = input_format(&options)?;
    let config = build_render_options(&options).config;
    let publications = parse_document(input, format, &config.dataset)
        .map_err(|error| JsValue::from_str(&error.to_string()))?;
    let result = layout_publications(&publications, &config);
    serde_json::to_string(&LayoutDump::from_result(&result)).map_err(|error| JsValue::from_str(&error.to_string()))
}

#[wasm_bindgen]
pub fn render_citations_svg(input: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let options = parse_options(options_json)?;
    let format = input_format(&options)?;
    render_with_options(input, format, build_render_options(&options))
        .map_err(|error| JsValue::from_str(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use citemap::InputFormat;
    use citemap::render_with_options;

    use crate::{CitemapOptions, build_render_options};

    #[test]
    fn renders_small_citation_graph() {
        let input = r#"[
            {"id": "a", "title": "Newer", "date": "2012", "references": ["b", "c"]},
            {"id": "b", "title": "Middle", "date": "2008", "references": ["c"]},
            {"id": "c", "title": "Oldest", "date": "1999"}
        ]"#;

        let svg = render_with_options(input, InputFormat::Json, build_render_options(&CitemapOptions::default()))
            .expect("citation graph should render");

        assert!(svg.contains("<svg"));
        assert!(svg.contains("Newer"));
        assert!(svg.contains("Oldest"));
    }
}
