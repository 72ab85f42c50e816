use std::collections::{HashMap, HashSet};

use crate::ir::Identifier;
use crate::theme::Color;

use super::budget::Budget;
use super::{LabelPlacement, LabelPosition, NodeId, Rect, TextBlock};

const GRID_CELL: f32 = 48.0;

/// A real node asking for a label.
#[derive(Debug, Clone)]
pub(super) struct LabelRequest {
    pub(super) node: NodeId,
    pub(super) publication: Identifier,
    pub(super) center: (f32, f32),
    pub(super) radius: f32,
    pub(super) text: TextBlock,
    pub(super) color: Color,
    /// Slot from the previous layout, kept on ties.
    pub(super) previous: Option<LabelPosition>,
}

#[derive(Debug, Clone, Default)]
pub(super) struct LabelOutcome {
    pub(super) placements: Vec<LabelPlacement>,
    pub(super) passes: usize,
    pub(super) timed_out: bool,
}

/// Rectangle for `position` around a node box of half-size `radius`.
pub(super) fn candidate_rect(
    center: (f32, f32),
    radius: f32,
    width: f32,
    height: f32,
    position: LabelPosition,
    padding: f32,
) -> Rect {
    let (cx, cy) = center;
    let near = radius + padding;
    let (x, y) = match position {
        LabelPosition::TopLeft => (cx - near - width, cy - near - height),
        LabelPosition::Top => (cx - width / 2.0, cy - near - height),
        LabelPosition::TopRight => (cx + near, cy - near - height),
        LabelPosition::Right => (cx + near, cy - height / 2.0),
        LabelPosition::BottomRight => (cx + near, cy + near),
        LabelPosition::Bottom => (cx - width / 2.0, cy + near),
        LabelPosition::BottomLeft => (cx - near - width, cy + near),
        LabelPosition::Left => (cx - near - width, cy - height / 2.0),
    };
    Rect::new(x, y, width, height)
}

/// Discrete local search over the eight slots of every label.
///
/// A pass revisits all labels in order and moves each one to its cheapest
/// slot, where cost is the overlap area with node boxes and with the other
/// labels as currently placed. Passes repeat until one changes nothing.
pub(super) fn place_labels(
    requests: &[LabelRequest],
    node_boxes: &[(NodeId, Rect)],
    padding: f32,
    budget: &mut Budget,
) -> LabelOutcome {
    let node_rects: Vec<Rect> = node_boxes.iter().map(|(_, rect)| *rect).collect();
    let node_grid = ObstacleGrid::new(GRID_CELL, &node_rects);

    let candidates: Vec<[Rect; 8]> = requests
        .iter()
        .map(|request| {
            LabelPosition::ALL.map(|position| {
                candidate_rect(
                    request.center,
                    request.radius,
                    request.text.width,
                    request.text.height,
                    position,
                    padding,
                )
            })
        })
        .collect();

    let mut chosen: Vec<Option<usize>> = vec![None; requests.len()];
    let mut label_grid = ObstacleGrid::new(GRID_CELL, &[]);

    let mut changed = true;
    while changed && budget.next_iteration() {
        changed = false;
        for (i, request) in requests.iter().enumerate() {
            if budget.expired() {
                break;
            }
            let current = chosen[i].or_else(|| {
                request
                    .previous
                    .and_then(|prev| LabelPosition::ALL.iter().position(|p| *p == prev))
            });

            let mut best: Option<(f32, usize)> = None;
            for (slot, rect) in candidates[i].iter().enumerate() {
                let mut cost = 0.0;
                for idx in node_grid.query(rect) {
                    if node_boxes[idx].0 != request.node {
                        cost += rect.overlap_area(&node_rects[idx]);
                    }
                }
                for other in label_grid.query(rect) {
                    if other == i {
                        continue;
                    }
                    if let Some(other_slot) = chosen[other] {
                        cost += rect.overlap_area(&candidates[other][other_slot]);
                    }
                }
                let better = match best {
                    None => true,
                    Some((best_cost, best_slot)) => {
                        cost + 1e-6 < best_cost
                            || ((cost - best_cost).abs() <= 1e-6
                                && Some(slot) == current
                                && Some(best_slot) != current)
                    }
                };
                if better {
                    best = Some((cost, slot));
                }
            }

            let Some((_, slot)) = best else {
                continue;
            };
            if chosen[i] != Some(slot) {
                changed = true;
                chosen[i] = Some(slot);
                label_grid.insert(i, &candidates[i][slot]);
            }
        }
    }

    let placements = requests
        .iter()
        .enumerate()
        .filter_map(|(i, request)| {
            let slot = chosen[i].or_else(|| {
                request
                    .previous
                    .and_then(|prev| LabelPosition::ALL.iter().position(|p| *p == prev))
            });
            let slot = slot.unwrap_or(0);
            Some(LabelPlacement {
                node: request.node,
                publication: request.publication.clone(),
                lines: request.text.lines.clone(),
                position: *LabelPosition::ALL.get(slot)?,
                rect: candidates[i][slot],
                color: request.color,
            })
        })
        .collect();

    LabelOutcome {
        placements,
        passes: budget.used(),
        timed_out: budget.timed_out(),
    }
}

/// Uniform-grid index over rectangles; `query` may return indices whose
/// rectangle has since moved, callers re-check the actual overlap.
struct ObstacleGrid {
    cell: f32,
    /// Maps grid cell (ix, iy) to indices into the caller's rectangle list.
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl ObstacleGrid {
    fn new(cell: f32, rects: &[Rect]) -> Self {
        let mut grid = Self {
            cell: cell.max(16.0),
            cells: HashMap::new(),
        };
        for (i, rect) in rects.iter().enumerate() {
            grid.insert(i, rect);
        }
        grid
    }

    fn span(&self, rect: &Rect) -> (i32, i32, i32, i32) {
        (
            (rect.x / self.cell).floor() as i32,
            (rect.y / self.cell).floor() as i32,
            (rect.right() / self.cell).floor() as i32,
            (rect.bottom() / self.cell).floor() as i32,
        )
    }

    fn insert(&mut self, idx: usize, rect: &Rect) {
        let (x0, y0, x1, y1) = self.span(rect);
        for ix in x0..=x1 {
            for iy in y0..=y1 {
                let cell = self.cells.entry((ix, iy)).or_default();
                if !cell.contains(&idx) {
                    cell.push(idx);
                }
            }
        }
    }

    fn query(&self, rect: &Rect) -> impl Iterator<Item = usize> + '_ {
        let (x0, y0, x1, y1) = self.span(rect);
        let mut seen = HashSet::new();
        (x0..=x1)
            .flat_map(move |ix| (y0..=y1).map(move |iy| (ix, iy)))
            .flat_map(move |key| {
                self.cells
                    .get(&key)
                    .map(|v| v.as_slice())
                    .unwrap_or(&[])
                    .iter()
                    .copied()
            })
            .filter(move |idx| seen.insert(*idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(node: usize, center: (f32, f32), width: f32) -> LabelRequest {
        LabelRequest {
            node: NodeId(node),
            publication: Identifier::new(format!("p{node}")),
            center,
            radius: 5.0,
            text: TextBlock {
                lines: vec!["label".to_string()],
                width,
                height: 10.0,
            },
            color: Color::BLACK,
            previous: None,
        }
    }

    fn boxes(requests: &[LabelRequest]) -> Vec<(NodeId, Rect)> {
        requests
            .iter()
            .map(|r| (r.node, Rect::centered(r.center.0, r.center.1, 10.0, 10.0)))
            .collect()
    }

    fn run(requests: &[LabelRequest]) -> LabelOutcome {
        let mut budget = Budget::new(60_000, 16);
        place_labels(requests, &boxes(requests), 2.0, &mut budget)
    }

    #[test]
    fn candidates_surround_the_node() {
        for position in LabelPosition::ALL {
            let rect = candidate_rect((0.0, 0.0), 5.0, 20.0, 8.0, position, 1.0);
            let node = Rect::centered(0.0, 0.0, 10.0, 10.0);
            assert_eq!(rect.overlap_area(&node), 0.0, "{position:?}");
        }
    }

    #[test]
    fn lone_label_takes_first_slot() {
        let outcome = run(&[request(0, (100.0, 100.0), 30.0)]);
        assert_eq!(outcome.placements[0].position, LabelPosition::TopLeft);
        assert_eq!(outcome.passes, 2);
    }

    #[test]
    fn close_neighbors_get_disjoint_labels() {
        let requests = [request(0, (0.0, 0.0), 40.0), request(1, (30.0, 0.0), 40.0)];
        let outcome = run(&requests);
        let a = outcome.placements[0].rect;
        let b = outcome.placements[1].rect;
        assert_eq!(a.overlap_area(&b), 0.0);
    }

    #[test]
    fn labels_avoid_other_nodes() {
        let requests = [request(0, (0.0, 0.0), 30.0)];
        let mut node_boxes = boxes(&requests);
        // Sits exactly where the top-left label would go.
        node_boxes.push((NodeId(9), Rect::new(-37.0, -17.0, 30.0, 10.0)));
        let mut budget = Budget::new(60_000, 16);
        let outcome = place_labels(&requests, &node_boxes, 2.0, &mut budget);
        let rect = outcome.placements[0].rect;
        assert_eq!(rect.overlap_area(&node_boxes[1].1), 0.0);
        assert_ne!(outcome.placements[0].position, LabelPosition::TopLeft);
    }

    #[test]
    fn previous_slot_wins_ties() {
        let mut lone = request(0, (0.0, 0.0), 30.0);
        lone.previous = Some(LabelPosition::Bottom);
        let outcome = run(&[lone]);
        assert_eq!(outcome.placements[0].position, LabelPosition::Bottom);
    }

    #[test]
    fn grid_query_deduplicates() {
        let rects = [Rect::new(0.0, 0.0, 200.0, 200.0)];
        let grid = ObstacleGrid::new(GRID_CELL, &rects);
        let hits: Vec<usize> = grid.query(&Rect::new(10.0, 10.0, 150.0, 150.0)).collect();
        assert_eq!(hits, vec![0]);
    }
}
