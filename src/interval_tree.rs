//src/interval_tree.rs

//! Per-reference gene intervals backed by a `coitrees` overlap index.
//!
//! Intervals are collected with [`IntervalTreeBuilder`], sorted once by
//! `(start, end)` and kept in that order; the `COITree` stores each
//! interval's position in the sorted list as metadata. Overlap hits are
//! reported in sorted order whatever order the index visits them in.

use coitrees::{COITree, IntervalTree as _};
use std::fmt;

/// A closed interval `[start, end]` carrying a value. `start <= end`.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    pub start: i32,
    pub end: i32,
    pub value: T,
}

#[derive(Debug, Clone)]
pub struct IntervalTreeBuilder<T> {
    intervals: Vec<Interval<T>>,
}

impl<T> Default for IntervalTreeBuilder<T> {
    fn default() -> Self {
        Self { intervals: Vec::new() }
    }
}

impl<T> IntervalTreeBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            intervals: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, start: i32, end: i32, value: T) {
        debug_assert!(start <= end, "interval start must not exceed end");
        self.intervals.push(Interval { start, end, value });
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Sorts (stable, so equal intervals keep insertion order) and indexes.
    pub fn build(mut self) -> IntervalTree<T> {
        self.intervals.sort_by_key(|iv| (iv.start, iv.end));
        IntervalTree::from_sorted(self.intervals)
    }
}

/// Read-only interval set; see the module docs for ordering guarantees.
pub struct IntervalTree<T> {
    intervals: Vec<Interval<T>>,
    index: Option<COITree<u32, u32>>,
}

impl<T> IntervalTree<T> {
    fn from_sorted(intervals: Vec<Interval<T>>) -> Self {
        let index = if intervals.is_empty() {
            None
        } else {
            let nodes: Vec<coitrees::Interval<u32>> = intervals
                .iter()
                .enumerate()
                .map(|(i, iv)| coitrees::Interval::new(iv.start, iv.end, i as u32))
                .collect();
            Some(COITree::new(&nodes))
        };
        Self { intervals, index }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// All intervals in `(start, end)` order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval<T>> {
        self.intervals.iter()
    }

    /// Calls `f` for every interval overlapping `[start, end]`, in sorted order.
    /// Stops early when `f` returns `false`.
    pub fn for_each_overlap<'a, F>(&'a self, start: i32, end: i32, mut f: F)
    where
        F: FnMut(&'a Interval<T>) -> bool,
    {
        let Some(index) = &self.index else {
            return;
        };
        if start > end {
            return;
        }

        let mut hits: Vec<u32> = Vec::new();
        index.query(start, end, |node| hits.push(node.metadata.to_owned()));
        hits.sort_unstable();

        for i in hits {
            if !f(&self.intervals[i as usize]) {
                return;
            }
        }
    }

    /// Collects references to every interval overlapping `[start, end]`.
    pub fn overlapping(&self, start: i32, end: i32) -> Vec<&Interval<T>> {
        let mut out = Vec::new();
        self.for_each_overlap(start, end, |iv| {
            out.push(iv);
            true
        });
        out
    }
}

impl<T: Clone> Clone for IntervalTree<T> {
    fn clone(&self) -> Self {
        Self::from_sorted(self.intervals.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for IntervalTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalTree")
            .field("intervals", &self.intervals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(intervals: &[(i32, i32)], start: i32, end: i32) -> Vec<(i32, i32)> {
        let mut v: Vec<(i32, i32)> = intervals
            .iter()
            .copied()
            .filter(|&(s, e)| s <= end && start <= e)
            .collect();
        v.sort();
        v
    }

    #[test]
    fn finds_overlapping_genes() {
        let mut b = IntervalTreeBuilder::new();
        b.push(100, 500, "a");
        b.push(450, 700, "b");
        b.push(800, 900, "c");
        let tree = b.build();

        let hits: Vec<&str> = tree.overlapping(480, 490).iter().map(|iv| iv.value).collect();
        assert_eq!(hits, vec!["a", "b"]);

        // closed on both ends
        let hits: Vec<&str> = tree.overlapping(700, 800).iter().map(|iv| iv.value).collect();
        assert_eq!(hits, vec!["b", "c"]);

        assert!(tree.overlapping(901, 1000).is_empty());
        assert!(tree.overlapping(0, 99).is_empty());
    }

    #[test]
    fn matches_brute_force_on_many_intervals() {
        // deterministic pseudo-random layout
        let mut state = 12345u32;
        let mut next = || {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 8) % 10_000
        };
        let mut raw = Vec::new();
        let mut b = IntervalTreeBuilder::new();
        for _ in 0..1000 {
            let s = next() as i32 - 5000;
            let len = (next() % 400) as i32;
            raw.push((s, s + len));
            b.push(s, s + len, ());
        }
        let tree = b.build();

        for _ in 0..200 {
            let s = next() as i32 - 5000;
            let e = s + (next() % 300) as i32;
            let got: Vec<(i32, i32)> = tree
                .overlapping(s, e)
                .iter()
                .map(|iv| (iv.start, iv.end))
                .collect();
            assert_eq!(got, brute_force(&raw, s, e), "query [{s}, {e}]");
        }
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        let mut b = IntervalTreeBuilder::new();
        b.push(10, 40, 1);
        b.push(-30, -5, 0);
        b.push(10, 40, 2);
        let tree = b.build();
        let values: Vec<i32> = tree.iter().map(|iv| iv.value).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn overlap_hits_follow_sorted_order() {
        let mut b = IntervalTreeBuilder::new();
        b.push(-300, -100, "rev");
        b.push(10, 40, "second");
        b.push(5, 500, "wide");
        b.push(10, 40, "third");
        let tree = b.build();

        let hits: Vec<&str> = tree.overlapping(20, 30).iter().map(|iv| iv.value).collect();
        assert_eq!(hits, vec!["wide", "second", "third"]);
        let hits: Vec<&str> = tree.overlapping(-250, -200).iter().map(|iv| iv.value).collect();
        assert_eq!(hits, vec!["rev"]);
    }

    #[test]
    fn clone_keeps_the_index() {
        let mut b = IntervalTreeBuilder::new();
        b.push(100, 200, 7u8);
        let copy = b.build().clone();
        assert_eq!(copy.overlapping(150, 150).len(), 1);
    }

    #[test]
    fn early_stop() {
        let mut b = IntervalTreeBuilder::new();
        for i in 0..20 {
            b.push(i, i + 100, i);
        }
        let tree = b.build();
        let mut seen = Vec::new();
        tree.for_each_overlap(50, 60, |iv| {
            seen.push(iv.value);
            seen.len() < 3
        });
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn empty_tree() {
        let tree: IntervalTree<()> = IntervalTreeBuilder::new().build();
        assert!(tree.is_empty());
        assert!(tree.overlapping(0, 10).is_empty());
    }
}
