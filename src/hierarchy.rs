//! Parent/child relations between two span annotations
//!
//! Given a parent annotation (sentences, say) and a child annotation
//! (tokens), finds which parent contains each child with a single merge-join
//! over both sequences sorted into document order `(start, -end)`:
//!
//! 1. Keep a cursor on the current parent, starting at the first.
//! 2. For each child, advance the cursor while the child ends after the
//!    current parent.
//! 3. The child belongs to the current parent if the parent starts at or
//!    before it; otherwise it is an orphan.
//!
//! Both sequences are sorted stably, so identical parents keep their
//! original order and the first of them receives the children. Results are
//! indexed by the original (unsorted) positions.
//!
//! Orphans are normal in real source data and never an error. With
//! [`HierarchyOptions::orphan_alert`] each orphan is logged as a warning and
//! reported in [`ParentChildMap::alerts`].

use crate::error::Result;
use crate::source::SpanSource;
use crate::span::Span;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HierarchyOptions {
    /// Warn about every child without a parent.
    pub orphan_alert: bool,
}

impl HierarchyOptions {
    pub fn alert() -> Self {
        Self { orphan_alert: true }
    }
}

/// A child without an enclosing parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orphan {
    /// Original index of the child.
    pub child: usize,
    /// Original index of the parent the cursor stood on (the nearest
    /// following parent), or of the last parent when the child lies beyond
    /// all of them.
    pub nearest_parent: Option<usize>,
}

/// Children of every parent, plus the children that have none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentChildMap {
    /// `children[p]` lists the children of parent `p` in document order.
    pub children: Vec<Vec<usize>>,
    /// Children without a parent, in document order; absent child spans
    /// come last.
    pub orphans: Vec<usize>,
    /// One entry per orphan when alerts are enabled.
    pub alerts: Vec<Orphan>,
}

/// Parent of every child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildParents {
    /// `parents[c]` is the parent of child `c`, or `None` for an orphan.
    pub parents: Vec<Option<usize>>,
    /// One entry per orphan when alerts are enabled.
    pub alerts: Vec<Orphan>,
}

/// Assign children to parents.
pub fn get_children(
    parents: &[Option<Span>],
    children: &[Option<Span>],
    options: HierarchyOptions,
) -> ParentChildMap {
    let mut map = ParentChildMap {
        children: vec![Vec::new(); parents.len()],
        ..Default::default()
    };
    merge_join(parents, children, options, &mut map.alerts, |child, parent| {
        match parent {
            Some(parent) => map.children[parent].push(child),
            None => map.orphans.push(child),
        }
    });
    map
}

/// Find the parent of each child.
pub fn get_parents(
    parents: &[Option<Span>],
    children: &[Option<Span>],
    options: HierarchyOptions,
) -> ChildParents {
    let mut links = ChildParents {
        parents: vec![None; children.len()],
        ..Default::default()
    };
    merge_join(parents, children, options, &mut links.alerts, |child, parent| {
        links.parents[child] = parent;
    });
    links
}

// Calls `assign(child, parent)` once per child, in sorted child order.
fn merge_join<F>(
    parents: &[Option<Span>],
    children: &[Option<Span>],
    options: HierarchyOptions,
    alerts: &mut Vec<Orphan>,
    mut assign: F,
) where
    F: FnMut(usize, Option<usize>),
{
    let strip = !(all_have_subpositions(parents) && all_have_subpositions(children));
    let sorted_parents = sorted_present(parents, strip);
    let sorted_children = sorted_present(children, strip);

    let mut orphan = |child: usize, nearest_parent: Option<usize>, assign: &mut F| {
        if options.orphan_alert {
            tracing::warn!(
                "Child '{}' missing parent; closest parent is {:?}",
                child,
                nearest_parent
            );
            alerts.push(Orphan { child, nearest_parent });
        }
        assign(child, None);
    };

    let mut cursor = 0;
    let mut previous: Option<usize> = None;
    for &(child, child_span) in &sorted_children {
        while let Some(&(parent, parent_span)) = sorted_parents.get(cursor) {
            if child_span.end <= parent_span.end {
                break;
            }
            previous = Some(parent);
            cursor += 1;
        }
        match sorted_parents.get(cursor) {
            Some(&(parent, parent_span)) if parent_span.start <= child_span.start => {
                assign(child, Some(parent));
            }
            Some(&(parent, _)) => orphan(child, Some(parent), &mut assign),
            None => orphan(child, previous, &mut assign),
        }
    }

    // Absent child spans cannot be placed
    for (child, span) in children.iter().enumerate() {
        if span.is_none() {
            orphan(child, None, &mut assign);
        }
    }
}

fn all_have_subpositions(spans: &[Option<Span>]) -> bool {
    spans.iter().flatten().all(Span::has_subpositions)
}

fn sorted_present(spans: &[Option<Span>], strip: bool) -> Vec<(usize, Span)> {
    let mut sorted: Vec<(usize, Span)> = spans
        .iter()
        .enumerate()
        .filter_map(|(i, span)| {
            let span = (*span)?;
            Some((i, if strip { span.without_subpositions() } else { span }))
        })
        .collect();
    sorted.sort_by_key(|(_, span)| span.doc_order_key());
    sorted
}

impl Store {
    /// Children of every parent; see [`get_children`].
    pub fn get_children(
        &self,
        parent: impl Into<SpanSource>,
        child: impl Into<SpanSource>,
        options: HierarchyOptions,
    ) -> Result<ParentChildMap> {
        let parents = parent.into().load(self, true)?;
        let children = child.into().load(self, true)?;
        Ok(get_children(&parents, &children, options))
    }

    /// Parent of every child; see [`get_parents`].
    pub fn get_parents(
        &self,
        parent: impl Into<SpanSource>,
        child: impl Into<SpanSource>,
        options: HierarchyOptions,
    ) -> Result<ChildParents> {
        let parents = parent.into().load(self, true)?;
        let children = child.into().load(self, true)?;
        Ok(get_parents(&parents, &children, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::key::AnnotationKey;
    use crate::span::Position;
    use tempfile::tempdir;

    fn spans(pairs: &[(i64, i64)]) -> Vec<Option<Span>> {
        pairs.iter().map(|&(s, e)| Some(Span::at(s, e))).collect()
    }

    #[test]
    fn test_sentences_and_tokens() {
        let parents = spans(&[(0, 10), (10, 20)]);
        let children = spans(&[(0, 3), (4, 9), (11, 15)]);

        let map = get_children(&parents, &children, HierarchyOptions::default());
        assert_eq!(map.children, vec![vec![0, 1], vec![2]]);
        assert!(map.orphans.is_empty());

        let links = get_parents(&parents, &children, HierarchyOptions::default());
        assert_eq!(links.parents, vec![Some(0), Some(0), Some(1)]);
    }

    #[test]
    fn test_orphan_before_first_parent() {
        let parents = spans(&[(0, 10), (10, 20)]);
        let children = spans(&[(-5, -1), (0, 3)]);

        let quiet = get_children(&parents, &children, HierarchyOptions::default());
        assert_eq!(quiet.orphans, vec![0]);
        assert_eq!(quiet.children, vec![vec![1], vec![]]);
        assert!(quiet.alerts.is_empty());

        let loud = get_children(&parents, &children, HierarchyOptions::alert());
        assert_eq!(
            loud.alerts,
            vec![Orphan {
                child: 0,
                nearest_parent: Some(0)
            }]
        );
    }

    #[test]
    fn test_orphan_after_last_parent() {
        let parents = spans(&[(0, 10)]);
        let children = spans(&[(2, 3), (12, 14)]);
        let links = get_parents(&parents, &children, HierarchyOptions::alert());
        assert_eq!(links.parents, vec![Some(0), None]);
        assert_eq!(links.alerts[0].nearest_parent, Some(0));
    }

    #[test]
    fn test_child_straddling_parents_is_orphan() {
        let parents = spans(&[(0, 10), (10, 20)]);
        let children = spans(&[(8, 12)]);
        let map = get_children(&parents, &children, HierarchyOptions::default());
        assert_eq!(map.orphans, vec![0]);
        assert_eq!(map.children, vec![vec![], vec![]]);
    }

    #[test]
    fn test_trailing_parents_without_children() {
        let parents = spans(&[(0, 5), (5, 10), (10, 15)]);
        let children = spans(&[(1, 2)]);
        let map = get_children(&parents, &children, HierarchyOptions::default());
        assert_eq!(map.children, vec![vec![0], vec![], vec![]]);
    }

    #[test]
    fn test_duplicate_parents_first_wins() {
        let parents = spans(&[(0, 10), (0, 10)]);
        let children = spans(&[(1, 2), (3, 4)]);
        let map = get_children(&parents, &children, HierarchyOptions::default());
        assert_eq!(map.children, vec![vec![0, 1], vec![]]);
    }

    #[test]
    fn test_unsorted_inputs_keep_original_indices() {
        let parents = spans(&[(10, 20), (0, 10)]);
        let children = spans(&[(11, 15), (0, 3), (4, 9)]);
        let map = get_children(&parents, &children, HierarchyOptions::default());
        assert_eq!(map.children, vec![vec![0], vec![1, 2]]);
        let links = get_parents(&parents, &children, HierarchyOptions::default());
        assert_eq!(links.parents, vec![Some(0), Some(1), Some(1)]);
    }

    #[test]
    fn test_zero_width_children() {
        let parents = spans(&[(0, 10), (10, 20)]);
        let children = spans(&[(0, 0), (10, 10), (20, 20)]);
        let links = get_parents(&parents, &children, HierarchyOptions::default());
        // A boundary at 10 still fits the first sentence, which ends there
        assert_eq!(links.parents, vec![Some(0), Some(0), Some(1)]);
    }

    #[test]
    fn test_absent_spans() {
        let parents = vec![Some(Span::at(0, 10)), None];
        let children = vec![None, Some(Span::at(1, 2))];
        let map = get_children(&parents, &children, HierarchyOptions::default());
        assert_eq!(map.children, vec![vec![1], vec![]]);
        assert_eq!(map.orphans, vec![0]);
    }

    #[test]
    fn test_subpositions_used_only_when_both_have_them() {
        let p = |s: i64, ss: u32, e: i64, es: u32| {
            Some(Span::new(Position::with_sub(s, ss), Position::with_sub(e, es)))
        };
        // Two zero-width-at-5 parents told apart by sub-position
        let parents = vec![p(0, 0, 5, 0), p(5, 1, 9, 0)];
        let children = vec![p(5, 2, 6, 0)];
        let links = get_parents(&parents, &children, HierarchyOptions::default());
        assert_eq!(links.parents, vec![Some(1)]);

        // Without sub-positions on the child, both sides are compared plainly
        let plain_child = vec![Some(Span::at(5, 6))];
        let links = get_parents(&parents, &plain_child, HierarchyOptions::default());
        assert_eq!(links.parents, vec![Some(1)]);
    }

    #[test]
    fn test_empty_inputs() {
        let map = get_children(&[], &spans(&[(0, 1)]), HierarchyOptions::alert());
        assert!(map.children.is_empty());
        assert_eq!(map.orphans, vec![0]);
        assert_eq!(map.alerts[0].nearest_parent, None);
        let map = get_children(&spans(&[(0, 1)]), &[], HierarchyOptions::default());
        assert_eq!(map.children, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_store_resolves_references() {
        let dir = tempdir().unwrap();
        let store = Store::new(StoreConfig::default().with_work_dir(dir.path()));
        let sentence = AnnotationKey::span("doc", "sentence").unwrap();
        let token = AnnotationKey::span("doc", "token").unwrap();
        store
            .write_span_annotation(&sentence, vec![Span::at(0, 10), Span::at(10, 20)], false)
            .unwrap();
        store
            .write_span_annotation(
                &token,
                vec![Span::at(0, 3), Span::at(4, 9), Span::at(11, 15)],
                false,
            )
            .unwrap();

        let map = store
            .get_children(&sentence, &token, HierarchyOptions::default())
            .unwrap();
        assert_eq!(map.children, vec![vec![0, 1], vec![2]]);

        // Mixed: stored parents, loaded children
        let links = store
            .get_parents(&sentence, vec![Span::at(12, 13)], HierarchyOptions::default())
            .unwrap();
        assert_eq!(links.parents, vec![Some(1)]);

        let missing = AnnotationKey::span("doc", "paragraph").unwrap();
        assert!(store
            .get_children(&missing, &token, HierarchyOptions::default())
            .unwrap_err()
            .is_missing());
    }
}
