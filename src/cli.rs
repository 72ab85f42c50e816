use crate::config::{Config, InsertionMode, OrderingHeuristic, load_config};
use crate::layout::LayoutEngine;
use crate::layout_dump::{write_layout_dump, write_layout_dump_to};
use crate::parser::{InputFormat, parse_document};
use crate::render::{render_svg, write_output_svg};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "citemap", version, about = "Layered layout of citation graphs")]
pub struct Args {
    /// Input file (.json, .json5, .tsv) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Input format; guessed from the file extension when omitted
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<FormatArg>,

    /// Output file. JSON and SVG go to stdout when omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "json")]
    pub output_format: OutputFormat,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Crossing minimization heuristic
    #[arg(long = "heuristic", value_enum)]
    pub heuristic: Option<HeuristicArg>,

    /// Insert new nodes at seeded random positions
    #[arg(long = "randomize-seed")]
    pub randomize_seed: Option<u64>,

    /// Leave out publications without citation links
    #[arg(long = "hide-isolated")]
    pub hide_isolated: bool,

    /// Predicate carrying publication dates (triples input)
    #[arg(long = "date-predicate")]
    pub date_predicate: Option<String>,

    /// Predicate carrying publication titles (triples input)
    #[arg(long = "title-predicate")]
    pub title_predicate: Option<String>,

    /// Predicate linking a publication to a cited one (triples input)
    #[arg(long = "reference-predicate")]
    pub reference_predicate: Option<String>,

    /// Pattern whose last match in a date value is kept
    #[arg(long = "date-regex")]
    pub date_regex: Option<String>,

    /// Debug logging (overridden by CITEMAP_LOG)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Svg,
    Png,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Json5,
    Triples,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicArg {
    Barycenter,
    BarycenterSinglePass,
    #[value(alias = "greedy")]
    GreedyInsertion,
}

impl From<FormatArg> for InputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => InputFormat::Json,
            FormatArg::Json5 => InputFormat::Json5,
            FormatArg::Triples => InputFormat::Triples,
        }
    }
}

impl From<HeuristicArg> for OrderingHeuristic {
    fn from(value: HeuristicArg) -> Self {
        match value {
            HeuristicArg::Barycenter => OrderingHeuristic::Barycenter,
            HeuristicArg::BarycenterSinglePass => OrderingHeuristic::BarycenterSinglePass,
            HeuristicArg::GreedyInsertion => OrderingHeuristic::GreedyInsertion,
        }
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    apply_args(&mut config, &args);

    let input = read_input(args.input.as_deref())?;
    let format = resolve_format(&args)?;
    let publications = parse_document(&input, format, &config.dataset).context("failed to parse input")?;
    tracing::debug!(publications = publications.len(), ?format, "parsed input");

    let mut engine = LayoutEngine::new(config.layout.clone()).with_theme(config.theme.clone());
    let result = engine.layout(&publications, &config.options);
    if !result.diagnostics.dropped_cycle_edges.is_empty() {
        tracing::warn!(
            dropped = result.diagnostics.dropped_cycle_edges.len(),
            "same-date citation cycles were broken"
        );
    }

    match args.output_format {
        OutputFormat::Json => match args.output.as_deref() {
            Some(path) => write_layout_dump(path, &result)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => write_layout_dump_to(io::stdout().lock(), &result)?,
        },
        OutputFormat::Svg => {
            let svg = render_svg(&result, &config.theme, &config.layout, &config.render);
            write_output_svg(&svg, args.output.as_deref())?;
        }
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            write_png(&result, &config, &output)?;
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
fn write_png(result: &crate::layout::LayoutResult, config: &Config, output: &Path) -> Result<()> {
    let svg = render_svg(result, &config.theme, &config.layout, &config.render);
    crate::render::write_output_png(&svg, output, &config.render, &config.theme)
}

#[cfg(not(feature = "png"))]
fn write_png(_result: &crate::layout::LayoutResult, _config: &Config, _output: &Path) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the `png` feature"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "citemap=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("CITEMAP_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn apply_args(config: &mut Config, args: &Args) {
    if let Some(heuristic) = args.heuristic {
        config.options.heuristic = heuristic.into();
    }
    if let Some(seed) = args.randomize_seed {
        config.options.insertion = InsertionMode::Randomized { seed };
    }
    if args.hide_isolated {
        config.options.show_isolated_nodes = false;
    }
    if let Some(predicate) = &args.date_predicate {
        config.dataset.date_predicate = predicate.clone();
    }
    if let Some(predicate) = &args.title_predicate {
        config.dataset.title_predicate = predicate.clone();
    }
    if let Some(predicate) = &args.reference_predicate {
        config.dataset.reference_predicate = predicate.clone();
    }
    if let Some(pattern) = &args.date_regex {
        config.dataset.date_regex = pattern.clone();
    }
}

fn resolve_format(args: &Args) -> Result<InputFormat> {
    if let Some(format) = args.format {
        return Ok(format.into());
    }
    match args.input.as_deref() {
        Some(path) if path != Path::new("-") => InputFormat::from_path(path).ok_or_else(|| {
            anyhow::anyhow!(
                "can't tell the format of {}; pass --format",
                path.display()
            )
        }),
        _ => Ok(InputFormat::Json),
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()));
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "citemap",
            "--heuristic",
            "greedy",
            "--randomize-seed",
            "7",
            "--hide-isolated",
            "--date-predicate",
            "dc:date",
        ]);
        let mut config = Config::default();
        apply_args(&mut config, &args);
        assert_eq!(config.options.heuristic, OrderingHeuristic::GreedyInsertion);
        assert_eq!(config.options.insertion, InsertionMode::Randomized { seed: 7 });
        assert!(!config.options.show_isolated_nodes);
        assert_eq!(config.dataset.date_predicate, "dc:date");
        assert_eq!(args.output_format, OutputFormat::Json);
    }

    #[test]
    fn format_comes_from_flag_or_extension() {
        let args = Args::parse_from(["citemap", "-i", "graph.tsv"]);
        assert_eq!(resolve_format(&args).unwrap(), InputFormat::Triples);
        let args = Args::parse_from(["citemap", "-i", "graph.txt", "-f", "json5"]);
        assert_eq!(resolve_format(&args).unwrap(), InputFormat::Json5);
        let args = Args::parse_from(["citemap", "-i", "graph.txt"]);
        assert!(resolve_format(&args).is_err());
        let args = Args::parse_from(["citemap"]);
        assert_eq!(resolve_format(&args).unwrap(), InputFormat::Json);
    }

    #[test]
    fn png_needs_an_output_path() {
        assert!(ensure_output(&None, "png").is_err());
        assert_eq!(
            ensure_output(&Some(PathBuf::from("out.png")), "png").unwrap(),
            PathBuf::from("out.png")
        );
    }
}
