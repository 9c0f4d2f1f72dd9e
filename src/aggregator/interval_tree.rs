//! Static interval tree for point ("stabbing") queries.
//!
//! Intervals are sorted by start and laid out as an implicit balanced binary
//! tree over that array: the node for `[lo, hi)` is its midpoint. Each node
//! stores the largest end in its subtree, which lets a query skip whole
//! subtrees, giving O(log n + k) per query.

/// One closed interval `[start, end]` carrying a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval<T> {
    pub start: usize,
    pub end: usize,
    pub value: T,
}

/// Immutable interval tree, built once
#[derive(Debug, Clone)]
pub struct IntervalTree<T> {
    intervals: Vec<Interval<T>>,
    max_end: Vec<usize>,
}

impl<T> Default for IntervalTree<T> {
    fn default() -> Self {
        Self {
            intervals: Vec::new(),
            max_end: Vec::new(),
        }
    }
}

impl<T> IntervalTree<T> {
    /// Build the tree; empty intervals (`end < start`) are dropped
    pub fn build(intervals: impl IntoIterator<Item = Interval<T>>) -> Self {
        let mut intervals: Vec<Interval<T>> = intervals
            .into_iter()
            .filter(|iv| iv.start <= iv.end)
            .collect();
        intervals.sort_by_key(|iv| iv.start);

        let mut max_end = vec![0; intervals.len()];
        fill_max_end(&intervals, &mut max_end, 0, intervals.len());

        Self { intervals, max_end }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval<T>> {
        self.intervals.iter()
    }

    /// All intervals containing `point`, in ascending start order
    pub fn query(&self, point: usize) -> Vec<&Interval<T>> {
        let mut hits = Vec::new();
        self.stab(0, self.intervals.len(), point, &mut hits);
        hits
    }

    fn stab<'a>(&'a self, lo: usize, hi: usize, point: usize, hits: &mut Vec<&'a Interval<T>>) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        if self.max_end[mid] < point {
            return;
        }

        self.stab(lo, mid, point, hits);

        let node = &self.intervals[mid];
        if node.start <= point {
            if point <= node.end {
                hits.push(node);
            }
            self.stab(mid + 1, hi, point, hits);
        }
    }
}

fn fill_max_end<T>(intervals: &[Interval<T>], max_end: &mut [usize], lo: usize, hi: usize) -> Option<usize> {
    if lo >= hi {
        return None;
    }
    let mid = lo + (hi - lo) / 2;
    let left = fill_max_end(intervals, max_end, lo, mid);
    let right = fill_max_end(intervals, max_end, mid + 1, hi);

    let max = [left, right]
        .into_iter()
        .flatten()
        .fold(intervals[mid].end, usize::max);
    max_end[mid] = max;
    Some(max)
}
