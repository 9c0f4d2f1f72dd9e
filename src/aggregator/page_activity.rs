//! Page activity classification and dense address coordinates.
//!
//! Accesses are bucketed into pages. Pages whose access count is negligible
//! next to the busiest page are "quiet" and get squeezed out of the display
//! axis; the remaining "active" pages are laid side by side:
//!
//! ```text
//! touched pages:   3   4         9        20
//! rank:            0   1         2         3
//! skipped so far:  3   3         7        17
//! ```
//!
//! An address in page `p` maps to `addr - skipped(p) * page_size`, which lands
//! in page `rank(p)` of the compacted axis.

use crate::parser::Record;
use crate::utils::config::PageConfig;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Page number, `addr / page_size`
pub type PageId = u64;

/// Per-chunk page classification and coordinate mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageActivity {
    page_size: u64,
    counts: BTreeMap<PageId, u64>,
    peak: u64,
    quiet_pages: BTreeSet<PageId>,
    active_pages: BTreeSet<PageId>,
    /// Active pages widened with the look-back window, ascending
    display_pages: Vec<PageId>,
    page_rank: BTreeMap<PageId, u64>,
    inactive_run_length: BTreeMap<PageId, u64>,
}

impl PageActivity {
    /// Classify the pages touched by `addresses`
    ///
    /// **Public** - main entry point, called once per chunk
    ///
    /// # Arguments
    /// * `addresses` - accessed addresses, in any order
    /// * `config` - page size and quiet threshold
    /// * `lookback` - active sets of the preceding chunks to keep on the axis
    pub fn build<'a>(
        addresses: impl IntoIterator<Item = u64>,
        config: &PageConfig,
        lookback: impl IntoIterator<Item = &'a BTreeSet<PageId>>,
    ) -> Self {
        let page_size = config.page_size.max(1);

        let mut counts: BTreeMap<PageId, u64> = BTreeMap::new();
        for addr in addresses {
            *counts.entry(addr / page_size).or_insert(0) += 1;
        }
        let peak = counts.values().copied().max().unwrap_or(0);

        let mut quiet_pages = BTreeSet::new();
        let mut active_pages = BTreeSet::new();
        for (&page, &count) in &counts {
            if is_quiet(count, peak, config.quiet_threshold) {
                quiet_pages.insert(page);
            } else {
                active_pages.insert(page);
            }
        }

        let mut display: BTreeSet<PageId> = active_pages.clone();
        for previous in lookback {
            display.extend(previous.iter().copied());
        }
        let display_pages: Vec<PageId> = display.into_iter().collect();

        let mut page_rank = BTreeMap::new();
        let mut inactive_run_length = BTreeMap::new();
        let mut skipped = 0u64;
        for (rank, &page) in display_pages.iter().enumerate() {
            skipped += match rank {
                0 => page,
                _ => page - display_pages[rank - 1] - 1,
            };
            page_rank.insert(page, rank as u64);
            inactive_run_length.insert(page, skipped);
        }

        debug!(
            "Page activity: {} touched, {} active, {} quiet, {} on axis, peak {}",
            counts.len(),
            active_pages.len(),
            quiet_pages.len(),
            display_pages.len(),
            peak
        );

        Self {
            page_size,
            counts,
            peak,
            quiet_pages,
            active_pages,
            display_pages,
            page_rank,
            inactive_run_length,
        }
    }

    /// Build from a record batch, using only its memory accesses
    pub fn from_records<'a>(
        records: &[Record],
        config: &PageConfig,
        lookback: impl IntoIterator<Item = &'a BTreeSet<PageId>>,
    ) -> Self {
        let addresses = records.iter().filter_map(|r| r.as_access().map(|a| a.addr));
        Self::build(addresses, config, lookback)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn page_of(&self, addr: u64) -> PageId {
        addr / self.page_size
    }

    /// Accesses that landed in `page`
    pub fn count(&self, page: PageId) -> u64 {
        self.counts.get(&page).copied().unwrap_or(0)
    }

    /// Access count of the busiest page
    pub fn peak(&self) -> u64 {
        self.peak
    }

    pub fn touched_pages(&self) -> impl Iterator<Item = PageId> + '_ {
        self.counts.keys().copied()
    }

    pub fn quiet_pages(&self) -> &BTreeSet<PageId> {
        &self.quiet_pages
    }

    pub fn active_pages(&self) -> &BTreeSet<PageId> {
        &self.active_pages
    }

    /// Pages on the display axis, ascending
    pub fn display_pages(&self) -> &[PageId] {
        &self.display_pages
    }

    /// Number of axis pages to the left of `page`
    pub fn rank(&self, page: PageId) -> Option<u64> {
        self.page_rank.get(&page).copied()
    }

    /// Pages skipped on the axis up to and including the gap before `page`
    pub fn inactive_run_length(&self, page: PageId) -> Option<u64> {
        self.inactive_run_length.get(&page).copied()
    }

    /// Width of the compacted axis in bytes
    pub fn display_width(&self) -> u64 {
        (self.display_pages.len() as u64 * self.page_size).max(1)
    }

    /// Address with the skipped pages removed, `None` for pages off the axis
    pub fn compact_address(&self, addr: u64) -> Option<u64> {
        let skipped = self.inactive_run_length(self.page_of(addr))?;
        Some(addr - skipped * self.page_size)
    }

    /// Compacted address scaled into `[0, 1)`
    pub fn normalized(&self, addr: u64) -> Option<f64> {
        self.compact_address(addr)
            .map(|compact| compact as f64 / self.display_width() as f64)
    }
}

/// `count < peak / threshold`, with threshold 0 disabling suppression
fn is_quiet(count: u64, peak: u64, threshold: u64) -> bool {
    threshold != 0 && peak > 0 && count < peak / threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter;

    const PAGE: u64 = 4096;

    fn config(threshold: u64) -> PageConfig {
        PageConfig {
            page_size: PAGE,
            quiet_threshold: threshold,
            lookback_chunks: 0,
        }
    }

    /// `n` accesses into page `page`
    fn hits(page: u64, n: usize) -> impl Iterator<Item = u64> {
        iter::repeat(page * PAGE + 8).take(n)
    }

    fn no_lookback() -> Vec<&'static BTreeSet<PageId>> {
        Vec::new()
    }

    #[test]
    fn test_threshold_zero_keeps_everything_active() {
        let addrs = hits(3, 1000).chain(hits(9, 1));
        let activity = PageActivity::build(addrs, &config(0), no_lookback());

        assert!(activity.quiet_pages().is_empty());
        assert_eq!(activity.active_pages().iter().copied().collect::<Vec<_>>(), vec![3, 9]);
    }

    #[test]
    fn test_quiet_pages_below_peak_fraction() {
        // peak 1000, threshold 100 -> quiet below 10
        let addrs = hits(3, 1000).chain(hits(4, 9)).chain(hits(5, 10)).chain(hits(20, 1));
        let activity = PageActivity::build(addrs, &config(100), no_lookback());

        assert_eq!(activity.peak(), 1000);
        assert_eq!(activity.quiet_pages().iter().copied().collect::<Vec<_>>(), vec![4, 20]);
        assert_eq!(activity.active_pages().iter().copied().collect::<Vec<_>>(), vec![3, 5]);
        for page in activity.quiet_pages() {
            assert!(activity.count(*page) * 100 < activity.peak());
        }
    }

    #[test]
    fn test_dense_coordinates() {
        let addrs = hits(3, 1).chain(hits(4, 1)).chain(hits(9, 1)).chain(hits(20, 1));
        let activity = PageActivity::build(addrs, &config(0), no_lookback());

        let ranks: Vec<u64> = [3, 4, 9, 20].iter().map(|p| activity.rank(*p).unwrap()).collect();
        let runs: Vec<u64> = [3, 4, 9, 20]
            .iter()
            .map(|p| activity.inactive_run_length(*p).unwrap())
            .collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
        assert_eq!(runs, vec![3, 3, 7, 17]);

        // Page 9 lands on axis page 2
        assert_eq!(activity.compact_address(9 * PAGE + 100), Some(2 * PAGE + 100));
        assert_eq!(activity.compact_address(5 * PAGE), None);
        assert_eq!(activity.display_width(), 4 * PAGE);
        assert_eq!(activity.normalized(20 * PAGE), Some(0.75));
    }

    #[test]
    fn test_page_zero_has_no_gap() {
        let activity = PageActivity::build(hits(0, 2).chain(hits(1, 2)), &config(0), no_lookback());
        assert_eq!(activity.inactive_run_length(0), Some(0));
        assert_eq!(activity.compact_address(PAGE + 1), Some(PAGE + 1));
    }

    #[test]
    fn test_lookback_widens_axis_only() {
        let previous: BTreeSet<PageId> = [7, 50].into_iter().collect();
        let activity = PageActivity::build(hits(10, 5), &config(0), [&previous]);

        assert_eq!(activity.active_pages().iter().copied().collect::<Vec<_>>(), vec![10]);
        assert_eq!(activity.display_pages(), &[7, 10, 50]);
        assert_eq!(activity.rank(10), Some(1));
        assert_eq!(activity.count(7), 0);
    }

    #[test]
    fn test_no_accesses() {
        let activity = PageActivity::build(iter::empty(), &config(10), no_lookback());
        assert_eq!(activity.peak(), 0);
        assert!(activity.active_pages().is_empty());
        assert!(activity.quiet_pages().is_empty());
        assert_eq!(activity.display_width(), 1);
    }
}
