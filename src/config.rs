use crate::dataset::DatasetConfig;
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingHeuristic {
    /// Barycenter sweeps repeated while the crossing count keeps dropping.
    #[default]
    Barycenter,
    /// One downward + upward barycenter sweep, no objective evaluation.
    BarycenterSinglePass,
    /// Degree-ordered greedy reinsertion, single-sided then two-sided.
    GreedyInsertion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum InsertionMode {
    /// New nodes enter at the front of their layer.
    #[default]
    Fixed,
    /// New nodes enter at a seeded pseudo-random position.
    Randomized { seed: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budgets {
    pub ordering_ms: u64,
    pub ordering_rounds: usize,
    pub relaxation_ms: u64,
    pub relaxation_iterations: usize,
    pub label_ms: u64,
    pub label_passes: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            ordering_ms: 500,
            ordering_rounds: 32,
            relaxation_ms: 250,
            relaxation_iterations: 200,
            label_ms: 100,
            label_passes: 16,
        }
    }
}

/// Per-pass choices of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub show_isolated_nodes: bool,
    pub heuristic: OrderingHeuristic,
    pub insertion: InsertionMode,
    pub budgets: Budgets,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            show_isolated_nodes: true,
            heuristic: OrderingHeuristic::default(),
            insertion: InsertionMode::default(),
            budgets: Budgets::default(),
        }
    }
}

/// Continuous parameters. Changing only these allows a coordinate + label
/// re-run without re-layering or re-ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub radius_base: f32,
    pub radius_k: f32,
    pub spacing: f32,
    pub min_layer_width: f32,
    pub max_edge_slope: f32,
    pub edge_thickness: f32,
    pub font_size: f32,
    pub label_line_height: f32,
    pub label_padding: f32,
    pub max_label_width_chars: usize,
    pub fast_text_metrics: bool,
    pub node_saturation: f32,
    pub node_value: f32,
    pub edge_saturation: f32,
    pub edge_value: f32,
    pub edge_alpha: f32,
    pub text_saturation: f32,
    pub text_value: f32,
    pub additional_node_saturation: f32,
    pub additional_node_value: f32,
    pub relaxation_epsilon: f32,
    pub greedy_min_improvement: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            radius_base: 5.0,
            radius_k: 5.0,
            spacing: 5.0,
            min_layer_width: 100.0,
            max_edge_slope: 2.0,
            edge_thickness: 1.5,
            font_size: 10.0,
            label_line_height: 1.3,
            label_padding: 2.0,
            max_label_width_chars: 32,
            fast_text_metrics: false,
            node_saturation: 1.0,
            node_value: 1.0,
            edge_saturation: 0.7,
            edge_value: 0.8,
            edge_alpha: 0.5,
            text_saturation: 0.9,
            text_value: 0.45,
            additional_node_saturation: 0.25,
            additional_node_value: 0.85,
            relaxation_epsilon: 0.05,
            greedy_min_improvement: 0.005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    pub draw_layer_guides: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1600.0,
            height: 1000.0,
            padding: 24.0,
            draw_layer_guides: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub options: LayoutOptions,
    pub render: RenderConfig,
    pub dataset: DatasetConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid JSON5 config {path}: {source}")]
    Json5 {
        path: PathBuf,
        #[source]
        source: json5::Error,
    },
    #[error("unknown theme `{0}` (expected `light` or `dark`)")]
    UnknownTheme(String),
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    font_family: Option<String>,
    layout: Option<LayoutConfigFile>,
    budgets: Option<BudgetsFile>,
    heuristic: Option<OrderingHeuristic>,
    insertion: Option<InsertionMode>,
    show_isolated_nodes: Option<bool>,
    render: Option<RenderConfigFile>,
    dataset: Option<DatasetConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    radius_base: Option<f32>,
    radius_k: Option<f32>,
    spacing: Option<f32>,
    min_layer_width: Option<f32>,
    max_edge_slope: Option<f32>,
    edge_thickness: Option<f32>,
    font_size: Option<f32>,
    label_line_height: Option<f32>,
    label_padding: Option<f32>,
    max_label_width_chars: Option<usize>,
    fast_text_metrics: Option<bool>,
    node_saturation: Option<f32>,
    node_value: Option<f32>,
    edge_saturation: Option<f32>,
    edge_value: Option<f32>,
    edge_alpha: Option<f32>,
    text_saturation: Option<f32>,
    text_value: Option<f32>,
    additional_node_saturation: Option<f32>,
    additional_node_value: Option<f32>,
    relaxation_epsilon: Option<f32>,
    greedy_min_improvement: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BudgetsFile {
    ordering_ms: Option<u64>,
    ordering_rounds: Option<usize>,
    relaxation_ms: Option<u64>,
    relaxation_iterations: Option<usize>,
    label_ms: Option<u64>,
    label_passes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    padding: Option<f32>,
    draw_layer_guides: Option<bool>,
}

macro_rules! apply_overrides {
    ($target:expr, $source:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $source.$field {
                $target.$field = value;
            }
        )*
    };
}

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json5 = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false);
    let parsed: ConfigFile = if is_json5 {
        json5::from_str(&contents).map_err(|source| ConfigError::Json5 {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?
    };

    merge_config_file(config, parsed)
}

fn merge_config_file(mut config: Config, parsed: ConfigFile) -> Result<Config, ConfigError> {
    if let Some(theme_name) = parsed.theme.as_deref() {
        config.theme = match theme_name {
            "light" | "default" => Theme::light(),
            "dark" => Theme::dark(),
            other => return Err(ConfigError::UnknownTheme(other.to_string())),
        };
    }
    if let Some(font_family) = parsed.font_family {
        config.theme.font_family = font_family;
    }

    if let Some(layout) = parsed.layout {
        apply_overrides!(
            config.layout,
            layout,
            [
                radius_base,
                radius_k,
                spacing,
                min_layer_width,
                max_edge_slope,
                edge_thickness,
                font_size,
                label_line_height,
                label_padding,
                max_label_width_chars,
                fast_text_metrics,
                node_saturation,
                node_value,
                edge_saturation,
                edge_value,
                edge_alpha,
                text_saturation,
                text_value,
                additional_node_saturation,
                additional_node_value,
                relaxation_epsilon,
                greedy_min_improvement,
            ]
        );
    }

    if let Some(budgets) = parsed.budgets {
        apply_overrides!(
            config.options.budgets,
            budgets,
            [
                ordering_ms,
                ordering_rounds,
                relaxation_ms,
                relaxation_iterations,
                label_ms,
                label_passes,
            ]
        );
    }
    if let Some(heuristic) = parsed.heuristic {
        config.options.heuristic = heuristic;
    }
    if let Some(insertion) = parsed.insertion {
        config.options.insertion = insertion;
    }
    if let Some(show) = parsed.show_isolated_nodes {
        config.options.show_isolated_nodes = show;
    }

    if let Some(render) = parsed.render {
        apply_overrides!(config.render, render, [width, height, padding, draw_layer_guides]);
    }
    if let Some(dataset) = parsed.dataset {
        config.dataset = dataset;
    }

    Ok(config)
}
