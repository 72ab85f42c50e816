use citemap::config::{LayoutOptions, OrderingHeuristic, RenderConfig};
use citemap::ir::{Publication, PublicationSet};
use citemap::layout::LayoutEngine;
use citemap::parser::parse_json;
use citemap::render::render_svg;
use citemap::{LayoutConfig, Theme};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// `years` layers of `per_year` papers. Each paper cites `fanout` papers of
/// earlier years, chosen by a fixed stride so the graph is reproducible.
fn synthetic_citations(years: usize, per_year: usize, fanout: usize) -> PublicationSet {
    let mut publications = Vec::with_capacity(years * per_year);
    for year in 0..years {
        for idx in 0..per_year {
            let mut publication = Publication::new(format!("y{year}p{idx}"))
                .with_date(format!("{}", 1980 + year))
                .with_title(format!("Paper {idx} from {}", 1980 + year));
            for k in 0..fanout.min(year * per_year) {
                let step = 7 * k + idx * 13 + year;
                let cited_year = year - 1 - (step % year.min(4));
                let cited_idx = (step * 31) % per_year;
                publication = publication.citing(format!("y{cited_year}p{cited_idx}"));
            }
            publications.push(publication);
        }
    }
    publications.into_iter().collect()
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let options = LayoutOptions::default();
    for (years, per_year, fanout) in [(5usize, 4usize, 2usize), (10, 10, 3), (20, 20, 4)] {
        let name = format!("synthetic_{years}x{per_year}_{fanout}");
        let set = synthetic_citations(years, per_year, fanout);
        group.bench_with_input(BenchmarkId::from_parameter(name), &set, |b, set| {
            b.iter(|| {
                let result = LayoutEngine::default().layout(black_box(set), &options);
                black_box(result.node_count());
            });
        });
    }
    group.finish();
}

fn bench_heuristics(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_ordering");
    let set = synthetic_citations(12, 12, 3);
    for heuristic in [
        OrderingHeuristic::Barycenter,
        OrderingHeuristic::BarycenterSinglePass,
        OrderingHeuristic::GreedyInsertion,
    ] {
        let options = LayoutOptions {
            heuristic,
            ..LayoutOptions::default()
        };
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{heuristic:?}")),
            &set,
            |b, set| {
                b.iter(|| {
                    let result = LayoutEngine::default().layout(black_box(set), &options);
                    black_box(result.stats.crossings_after);
                });
            },
        );
    }
    group.finish();
}

fn bench_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_incremental");
    let set = synthetic_citations(10, 10, 3);
    let options = LayoutOptions::default();
    let mut engine = LayoutEngine::default();
    engine.layout(&set, &options);
    group.bench_function("unchanged_relayout", |b| {
        b.iter(|| {
            let result = engine.layout(black_box(&set), &options);
            black_box(result.stats.removed_nodes);
        });
    });
    group.bench_function("coordinates_only", |b| {
        b.iter(|| {
            let result = engine.relayout(&options);
            black_box(result.width);
        });
    });
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");
    let set = synthetic_citations(8, 8, 3);
    let input = serde_json::to_string(
        &set.iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "title": p.title,
                    "dates": p.dates,
                    "references": p.references,
                })
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or_default();
    let theme = Theme::light();
    let config = LayoutConfig::default();
    let render_cfg = RenderConfig::default();
    group.bench_function("parse_layout_render", |b| {
        b.iter(|| {
            let set = parse_json(black_box(&input)).expect("parse failed");
            let result = LayoutEngine::new(config.clone()).layout(&set, &LayoutOptions::default());
            let svg = render_svg(&result, &theme, &config, &render_cfg);
            black_box(svg.len());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_layout,
    bench_heuristics,
    bench_incremental,
    bench_end_to_end
);
criterion_main!(benches);
