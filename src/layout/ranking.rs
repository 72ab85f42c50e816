use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::ir::{Identifier, PublicationSet};

use super::{Diagnostics, LayerId};

/// Date bucket used for publications whose date cannot be recovered.
pub const UNDATED_BUCKET: &str = "";

#[derive(Debug, Clone, Default)]
pub(super) struct Layering {
    pub(super) dates: BTreeMap<Identifier, Option<String>>,
    pub(super) sublevels: BTreeMap<Identifier, usize>,
    pub(super) layer_of: BTreeMap<Identifier, LayerId>,
    pub(super) active: BTreeSet<LayerId>,
}

pub(super) fn assign_layers(
    publications: &PublicationSet,
    included: &BTreeSet<Identifier>,
    diagnostics: &mut Diagnostics,
) -> Layering {
    let dates = resolve_dates(publications, included, diagnostics);
    let edges = same_date_edges(publications, included, &dates);
    let (sublevels, dropped) = compute_sublevels(&edges, included.iter());
    diagnostics.dropped_cycle_edges.extend(dropped);

    let mut layer_of = BTreeMap::new();
    let mut active = BTreeSet::new();
    for id in included {
        let date = dates
            .get(id)
            .cloned()
            .flatten()
            .unwrap_or_else(|| UNDATED_BUCKET.to_string());
        let layer = LayerId::new(date, sublevels.get(id).copied().unwrap_or(0));
        active.insert(layer.clone());
        layer_of.insert(id.clone(), layer);
    }

    let max_sublevel = sublevels.values().copied().max().unwrap_or(0);
    tracing::debug!(layers = active.len(), max_sublevel, "assigned layers");

    Layering {
        dates,
        sublevels,
        layer_of,
        active,
    }
}

/// Representative date per publication. A missing date is taken from the
/// latest referenced publication, else from the earliest citing one.
pub(super) fn resolve_dates(
    publications: &PublicationSet,
    included: &BTreeSet<Identifier>,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<Identifier, Option<String>> {
    let own: BTreeMap<Identifier, Option<String>> = included
        .iter()
        .map(|id| {
            let date = publications.get(id).and_then(|p| p.representative_date());
            (id.clone(), date)
        })
        .collect();

    let mut earliest_citer: BTreeMap<&Identifier, &String> = BTreeMap::new();
    for id in included {
        let (Some(publication), Some(Some(date))) = (publications.get(id), own.get(id)) else {
            continue;
        };
        for reference in &publication.references {
            if !included.contains(reference) {
                continue;
            }
            let entry = earliest_citer.entry(reference).or_insert(date);
            if date < *entry {
                *entry = date;
            }
        }
    }

    let mut resolved = own.clone();
    for (id, date) in &own {
        if date.is_some() {
            continue;
        }
        tracing::warn!(publication = %id, "no date for publication");
        let from_references = publications.get(id).and_then(|p| {
            p.references
                .iter()
                .filter_map(|reference| own.get(reference).cloned().flatten())
                .max()
        });
        let recovered = from_references.or_else(|| earliest_citer.get(id).map(|d| (*d).clone()));
        match recovered {
            Some(date) => {
                tracing::debug!(publication = %id, date = %date, "changed date");
                diagnostics.recovered_dates.push((id.clone(), date.clone()));
                resolved.insert(id.clone(), Some(date));
            }
            None => {
                tracing::warn!(publication = %id, "date could not be recovered, leaving undated");
                diagnostics.undated.push(id.clone());
            }
        }
    }
    resolved
}

/// Same-date, self-excluded references between included publications.
pub(super) fn same_date_edges(
    publications: &PublicationSet,
    included: &BTreeSet<Identifier>,
    dates: &BTreeMap<Identifier, Option<String>>,
) -> BTreeMap<Identifier, Vec<Identifier>> {
    let mut edges: BTreeMap<Identifier, Vec<Identifier>> = BTreeMap::new();
    for id in included {
        let Some(Some(date)) = dates.get(id) else {
            continue;
        };
        let Some(publication) = publications.get(id) else {
            continue;
        };
        for reference in &publication.references {
            if reference == id || !included.contains(reference) {
                continue;
            }
            if dates.get(reference).and_then(|d| d.as_ref()) == Some(date) {
                edges.entry(id.clone()).or_default().push(reference.clone());
            }
        }
    }
    edges
}

struct Frame {
    id: Identifier,
    next: usize,
    level: usize,
}

/// `sublevel(p) = 1 + max(sublevel(q))` over same-date references `q`.
///
/// Depth-first with memoization and an in-progress set; a reference back into
/// the in-progress set closes a cycle and is dropped from the ordering graph.
/// Returns the sublevels and the dropped `(citer, cited)` pairs.
pub(super) fn compute_sublevels<'a>(
    edges: &BTreeMap<Identifier, Vec<Identifier>>,
    roots: impl Iterator<Item = &'a Identifier>,
) -> (BTreeMap<Identifier, usize>, Vec<(Identifier, Identifier)>) {
    let mut levels: BTreeMap<Identifier, usize> = BTreeMap::new();
    let mut in_progress: HashSet<Identifier> = HashSet::new();
    let mut dropped = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for root in roots {
        if levels.contains_key(root) {
            continue;
        }
        in_progress.insert(root.clone());
        stack.push(Frame {
            id: root.clone(),
            next: 0,
            level: 0,
        });

        while let Some(top) = stack.len().checked_sub(1) {
            let next_ref = edges
                .get(&stack[top].id)
                .and_then(|refs| refs.get(stack[top].next))
                .cloned();
            let Some(reference) = next_ref else {
                let Some(done) = stack.pop() else {
                    break;
                };
                in_progress.remove(&done.id);
                if let Some(parent) = stack.last_mut() {
                    parent.level = parent.level.max(done.level + 1);
                }
                levels.insert(done.id, done.level);
                continue;
            };
            stack[top].next += 1;

            if let Some(level) = levels.get(&reference) {
                stack[top].level = stack[top].level.max(level + 1);
                continue;
            }
            if in_progress.contains(&reference) {
                tracing::warn!(
                    citer = %stack[top].id,
                    cited = %reference,
                    "cycle found, ignoring ordering edge"
                );
                dropped.push((stack[top].id.clone(), reference));
                continue;
            }
            in_progress.insert(reference.clone());
            stack.push(Frame {
                id: reference,
                next: 0,
                level: 0,
            });
        }
    }

    (levels, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Publication;

    fn ids(names: &[&str]) -> BTreeSet<Identifier> {
        names.iter().map(|n| Identifier::new(*n)).collect()
    }

    fn chain_set() -> PublicationSet {
        [
            Publication::new("A").with_date("2020").citing("B"),
            Publication::new("B").with_date("2020").citing("C"),
            Publication::new("C").with_date("2020"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn chain_gets_increasing_sublevels() {
        let set = chain_set();
        let mut diagnostics = Diagnostics::default();
        let layering = assign_layers(&set, &ids(&["A", "B", "C"]), &mut diagnostics);
        assert_eq!(layering.sublevels[&Identifier::new("A")], 2);
        assert_eq!(layering.sublevels[&Identifier::new("B")], 1);
        assert_eq!(layering.sublevels[&Identifier::new("C")], 0);
        assert_eq!(layering.active.len(), 3);
        assert!(diagnostics.dropped_cycle_edges.is_empty());
    }

    #[test]
    fn two_cycle_drops_exactly_one_edge() {
        let mut edges = BTreeMap::new();
        edges.insert(Identifier::new("A"), vec![Identifier::new("B")]);
        edges.insert(Identifier::new("B"), vec![Identifier::new("A")]);
        let roots = ids(&["A", "B"]);
        let (levels, dropped) = compute_sublevels(&edges, roots.iter());
        assert_eq!(dropped.len(), 1);
        assert_eq!(levels.len(), 2);
        let (citer, cited) = &dropped[0];
        assert!(levels[cited] > levels[citer]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let n = 20_000;
        let mut edges = BTreeMap::new();
        for i in 0..n {
            edges.insert(
                Identifier::new(format!("p{i}")),
                vec![Identifier::new(format!("p{}", i + 1))],
            );
        }
        let roots: Vec<Identifier> = (0..=n).map(|i| Identifier::new(format!("p{i}"))).collect();
        let (levels, dropped) = compute_sublevels(&edges, roots.iter());
        assert!(dropped.is_empty());
        assert_eq!(levels[&Identifier::new("p0")], n);
    }

    #[test]
    fn missing_date_is_recovered_from_references() {
        let set: PublicationSet = [
            Publication::new("new").citing("old1").citing("old2"),
            Publication::new("old1").with_date("2001"),
            Publication::new("old2").with_date("2003"),
        ]
        .into_iter()
        .collect();
        let mut diagnostics = Diagnostics::default();
        let dates = resolve_dates(&set, &ids(&["new", "old1", "old2"]), &mut diagnostics);
        assert_eq!(dates[&Identifier::new("new")].as_deref(), Some("2003"));
        assert_eq!(diagnostics.recovered_dates.len(), 1);
    }

    #[test]
    fn missing_date_falls_back_to_earliest_citer() {
        let set: PublicationSet = [
            Publication::new("a").with_date("2015").citing("x"),
            Publication::new("b").with_date("2012").citing("x"),
            Publication::new("x"),
            Publication::new("lonely"),
        ]
        .into_iter()
        .collect();
        let mut diagnostics = Diagnostics::default();
        let layering = assign_layers(&set, &ids(&["a", "b", "x", "lonely"]), &mut diagnostics);
        assert_eq!(layering.layer_of[&Identifier::new("x")].date, "2012");
        assert_eq!(layering.layer_of[&Identifier::new("lonely")].date, UNDATED_BUCKET);
        assert_eq!(diagnostics.undated, vec![Identifier::new("lonely")]);
    }

    #[test]
    fn layering_is_deterministic() {
        let set = chain_set();
        let included = ids(&["A", "B", "C"]);
        let first = assign_layers(&set, &included, &mut Diagnostics::default());
        let second = assign_layers(&set, &included, &mut Diagnostics::default());
        assert_eq!(first.layer_of, second.layer_of);
    }
}
