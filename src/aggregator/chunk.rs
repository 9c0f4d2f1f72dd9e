//! Chunks and the processor that builds them.
//!
//! Each decoded block becomes one [`Chunk`]: its call stack index, its page
//! activity and a few counters. The decoded records themselves are optional
//! detail that may be dropped after indexing and re-read later from the
//! block's file offset.

use super::page_activity::{PageActivity, PageId};
use super::stack_builder::{CallStackIndex, Frame};
use crate::parser::{Record, RecordKind, RegionId, RegionTable};
use crate::utils::config::{PageConfig, TraceConfig};
use crate::utils::error::IndexError;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// Decoded records of one block, as handed from reader to processor
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub file_offset: u64,
    pub records: Vec<Record>,
}

/// Per-kind record counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub accesses: u64,
    pub writes: u64,
    pub enters: u64,
    pub exits: u64,
    /// Accesses outside every mapped region
    pub unmapped_accesses: u64,
}

impl RecordCounts {
    pub fn total(&self) -> u64 {
        self.accesses + self.enters + self.exits
    }

    pub fn merge(&mut self, other: &RecordCounts) {
        self.accesses += other.accesses;
        self.writes += other.writes;
        self.enters += other.enters;
        self.exits += other.exits;
        self.unmapped_accesses += other.unmapped_accesses;
    }
}

/// One indexed block of the trace
///
/// Everything except the record detail is fixed at construction.
#[derive(Debug)]
pub struct Chunk {
    index: usize,
    first_record: u64,
    record_count: usize,
    file_offset: u64,
    carry_in: Vec<Record>,
    carry_out: Vec<Record>,
    call_stack: CallStackIndex,
    pages: PageActivity,
    touched_regions: BTreeSet<RegionId>,
    counts: RecordCounts,
    detail: RwLock<Option<Arc<[Record]>>>,
}

impl Chunk {
    /// Position of this chunk in the store
    pub fn index(&self) -> usize {
        self.index
    }

    /// Global position of the chunk's first record
    pub fn first_record(&self) -> u64 {
        self.first_record
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Whether global position `position` falls in this chunk
    pub fn contains(&self, position: u64) -> bool {
        position >= self.first_record && position - self.first_record < self.record_count as u64
    }

    /// Offset of the block this chunk was decoded from
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Frames open when this chunk started, outermost first
    pub fn carry_in(&self) -> &[Record] {
        &self.carry_in
    }

    /// Frames still open when this chunk ended, outermost first
    pub fn carry_out(&self) -> &[Record] {
        &self.carry_out
    }

    pub fn call_stack(&self) -> &CallStackIndex {
        &self.call_stack
    }

    pub fn pages(&self) -> &PageActivity {
        &self.pages
    }

    pub fn quiet_pages(&self) -> &BTreeSet<PageId> {
        self.pages.quiet_pages()
    }

    pub fn active_pages(&self) -> &BTreeSet<PageId> {
        self.pages.active_pages()
    }

    pub fn touched_regions(&self) -> &BTreeSet<RegionId> {
        &self.touched_regions
    }

    pub fn counts(&self) -> &RecordCounts {
        &self.counts
    }

    /// Call stack at a chunk-local position, outermost first
    pub fn stack_at(&self, local: usize) -> Vec<Record> {
        self.call_stack.stack_at(local)
    }

    pub fn frames_at(&self, local: usize) -> Vec<Frame> {
        self.call_stack.frames_at(local)
    }

    pub fn has_detail(&self) -> bool {
        self.detail.read().is_some()
    }

    /// Decoded records, if currently held
    pub fn records(&self) -> Option<Arc<[Record]>> {
        self.detail.read().clone()
    }

    /// Record at a chunk-local position, if detail is held
    pub fn record(&self, local: usize) -> Option<Record> {
        self.detail.read().as_ref().and_then(|records| records.get(local).copied())
    }

    /// Attach re-read records; ignored when the count does not match
    pub(crate) fn restore_detail(&self, records: Arc<[Record]>) -> bool {
        if records.len() != self.record_count {
            return false;
        }
        *self.detail.write() = Some(records);
        true
    }

    /// Drop the decoded records, keeping the derived structures
    pub fn release_detail(&self) {
        *self.detail.write() = None;
    }
}

/// Turns record batches into chunks, carrying open frames between them
pub struct ChunkProcessor {
    pages: PageConfig,
    retain_detail: bool,
    regions: Arc<RegionTable>,
    carry: Vec<Record>,
    recent_active: VecDeque<BTreeSet<PageId>>,
    next_index: usize,
    next_record: u64,
}

impl ChunkProcessor {
    pub fn new(config: &TraceConfig, regions: Arc<RegionTable>) -> Self {
        Self {
            pages: config.pages.clone(),
            retain_detail: config.retain_detail,
            regions,
            carry: Vec::new(),
            recent_active: VecDeque::with_capacity(config.pages.lookback_chunks),
            next_index: 0,
            next_record: 0,
        }
    }

    /// Build the next chunk
    ///
    /// **Public** - main entry point, batches must arrive in file order
    ///
    /// # Errors
    /// * `IndexError::UnbalancedStack` - enter/exit mismatch in this batch
    pub fn process(&mut self, batch: RecordBatch) -> Result<Chunk, IndexError> {
        let RecordBatch { file_offset, records } = batch;

        let (call_stack, carry_out) = CallStackIndex::build(&self.carry, &records)?;
        let pages = PageActivity::from_records(&records, &self.pages, self.recent_active.iter());
        let (counts, touched_regions) = self.count_records(&records);

        if self.pages.lookback_chunks > 0 {
            if self.recent_active.len() == self.pages.lookback_chunks {
                self.recent_active.pop_front();
            }
            self.recent_active.push_back(pages.active_pages().clone());
        }

        let carry_in = std::mem::replace(&mut self.carry, carry_out.clone());
        let record_count = records.len();
        let detail = self.retain_detail.then(|| Arc::from(records));

        let chunk = Chunk {
            index: self.next_index,
            first_record: self.next_record,
            record_count,
            file_offset,
            carry_in,
            carry_out,
            call_stack,
            pages,
            touched_regions,
            counts,
            detail: RwLock::new(detail),
        };

        debug!(
            "Chunk {}: {} records from offset {}, {} frames open at end",
            chunk.index,
            record_count,
            file_offset,
            chunk.carry_out.len()
        );

        self.next_index += 1;
        self.next_record += record_count as u64;
        Ok(chunk)
    }

    /// Frames open after the last processed batch
    pub fn open_frames(&self) -> &[Record] {
        &self.carry
    }

    fn count_records(&self, records: &[Record]) -> (RecordCounts, BTreeSet<RegionId>) {
        let mut counts = RecordCounts::default();
        let mut touched = BTreeSet::new();

        for record in records {
            match record.kind() {
                RecordKind::FunctionEnter => counts.enters += 1,
                RecordKind::FunctionExit => counts.exits += 1,
                RecordKind::MemoryAccess => {}
            }
            let Some(access) = record.as_access() else {
                continue;
            };
            counts.accesses += 1;
            if access.is_write {
                counts.writes += 1;
            }
            match self.regions.lookup(access.addr) {
                Some((id, _)) => {
                    touched.insert(id);
                }
                None => counts.unmapped_accesses += 1,
            }
        }

        (counts, touched)
    }
}
