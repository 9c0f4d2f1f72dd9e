//! Memory region table parsing.
//!
//! The trace header embeds a snapshot of the traced process's address map,
//! one `/proc/<pid>/maps` style line per region:
//!
//! ```text
//! 00400000-0040b000 r-xp 00000000 08:01 1234 /usr/bin/demo
//! 7ffd1000-7ffd2000 rw-p 00000000 00:00 0
//! ```

use crate::utils::error::ReaderError;
use log::{debug, warn};
use serde::Serialize;
use std::borrow::Cow;

/// Index of a region inside its [`RegionTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegionId(pub usize);

/// One mapped address range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryRegion {
    pub low: u64,
    /// Exclusive upper bound
    pub high: u64,
    pub perms: String,
    pub offset: String,
    pub dev: String,
    pub inode: String,
    /// Empty for anonymous mappings
    pub pathname: String,
}

impl MemoryRegion {
    /// Synthetic region for an address no mapping covers
    pub fn unknown(addr: u64) -> Self {
        Self {
            low: addr,
            high: addr,
            perms: "-".to_string(),
            offset: "-".to_string(),
            dev: "-".to_string(),
            inode: "-".to_string(),
            pathname: "unknown".to_string(),
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.low <= addr && addr < self.high
    }

    pub fn is_unknown(&self) -> bool {
        self.low == self.high && self.pathname == "unknown"
    }
}

/// Sorted, non-overlapping list of regions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTable {
    regions: Vec<MemoryRegion>,
}

impl RegionTable {
    /// Build a table, checking the sorted/non-overlapping invariant
    ///
    /// # Errors
    /// * `ReaderError::UnsortedRegions` - a region starts before its predecessor ends
    pub fn new(regions: Vec<MemoryRegion>) -> Result<Self, ReaderError> {
        for (index, pair) in regions.windows(2).enumerate() {
            let (previous, current) = (&pair[0], &pair[1]);
            if current.low <= previous.low || current.low < previous.high {
                return Err(ReaderError::UnsortedRegions {
                    index: index + 1,
                    low: current.low,
                    previous_high: previous.high,
                });
            }
        }
        Ok(Self { regions })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    pub fn get(&self, id: RegionId) -> Option<&MemoryRegion> {
        self.regions.get(id.0)
    }

    /// Find the region covering `addr`
    pub fn lookup(&self, addr: u64) -> Option<(RegionId, &MemoryRegion)> {
        // First region whose low is above addr; the candidate sits just before it
        let above = self.regions.partition_point(|r| r.low <= addr);
        let index = above.checked_sub(1)?;
        let region = &self.regions[index];
        region.contains(addr).then_some((RegionId(index), region))
    }

    /// Covering region, or a synthetic unknown one
    pub fn resolve(&self, addr: u64) -> Cow<'_, MemoryRegion> {
        match self.lookup(addr) {
            Some((_, region)) => Cow::Borrowed(region),
            None => Cow::Owned(MemoryRegion::unknown(addr)),
        }
    }
}

/// Parse one region line
///
/// **Public** - accepts both the six-field and five-field forms
///
/// # Errors
/// * `ReaderError::MalformedRegionLine` - missing fields or bad hex range
pub fn parse_region_line(line: &str, line_number: usize) -> Result<MemoryRegion, ReaderError> {
    let malformed = |reason: &str| ReaderError::MalformedRegionLine {
        line_number,
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = line.trim();
    let mut fields: Vec<&str> = Vec::with_capacity(5);
    while fields.len() < 5 {
        if rest.is_empty() {
            return Err(malformed("expected at least 5 fields"));
        }
        let (field, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        fields.push(field);
        rest = tail.trim_start();
    }

    let (low, high) = fields[0]
        .split_once('-')
        .ok_or_else(|| malformed("address range has no '-'"))?;
    let low = u64::from_str_radix(low, 16).map_err(|e| malformed(&format!("bad low address: {}", e)))?;
    let high = u64::from_str_radix(high, 16).map_err(|e| malformed(&format!("bad high address: {}", e)))?;
    if high < low {
        return Err(malformed("high address below low address"));
    }

    Ok(MemoryRegion {
        low,
        high,
        perms: fields[1].to_string(),
        offset: fields[2].to_string(),
        dev: fields[3].to_string(),
        inode: fields[4].to_string(),
        pathname: rest.trim_end().to_string(),
    })
}

/// Parse the whole region text section
///
/// **Public** - called by the trace reader after the NUL terminator is found
///
/// Blank lines are ignored. A malformed line is skipped with a warning unless
/// `strict` is set, in which case it aborts the load.
pub fn parse_region_table(text: &str, strict: bool) -> Result<RegionTable, ReaderError> {
    let mut regions = Vec::new();

    for (index, line) in text.split('\n').enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_region_line(line, index + 1) {
            Ok(region) => regions.push(region),
            Err(e) if !strict => warn!("Skipping region: {}", e),
            Err(e) => return Err(e),
        }
    }

    debug!("Parsed {} memory regions", regions.len());
    RegionTable::new(regions)
}
