#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dataset;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod parser;
pub mod render;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, LayoutOptions, RenderConfig};
pub use ir::{Identifier, Publication, PublicationSet};
pub use layout::{LayoutEngine, LayoutResult};
pub use parser::InputFormat;
pub use theme::Theme;

/// Everything needed to go from a document to a picture in one call.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub config: Config,
}

impl RenderOptions {
    pub fn light() -> Self {
        Self::default()
    }

    pub fn dark() -> Self {
        let mut options = Self::default();
        options.config.theme = Theme::dark();
        options
    }
}

/// One-shot layout with a fresh engine.
pub fn layout_publications(publications: &PublicationSet, config: &Config) -> LayoutResult {
    LayoutEngine::new(config.layout.clone())
        .with_theme(config.theme.clone())
        .layout(publications, &config.options)
}

/// Parse `input`, lay it out and render it as SVG.
pub fn render_with_options(input: &str, format: InputFormat, options: RenderOptions) -> anyhow::Result<String> {
    let config = options.config;
    let publications = parser::parse_document(input, format, &config.dataset)?;
    let result = layout_publications(&publications, &config);
    Ok(render::render_svg(&result, &config.theme, &config.layout, &config.render))
}
