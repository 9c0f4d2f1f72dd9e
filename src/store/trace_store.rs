//! Append-only store of published chunks.
//!
//! Record positions are global and contiguous: chunk `k` holds positions
//! `first_record(k) .. first_record(k) + record_count(k)`. Readers only ever
//! see complete chunks; the ingest pipeline is the single writer.

use super::rehydrate::ChunkRehydrator;
use super::symbols::SymbolResolver;
use crate::aggregator::{Chunk, RecordCounts};
use crate::parser::{Record, RegionId, RegionTable};
use crate::utils::config::DEFAULT_HYDRATED_CHUNKS;
use crate::utils::error::TraceError;
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// Ordered chunks plus the region table of the trace
#[derive(Debug)]
pub struct TraceStore {
    regions: Arc<RegionTable>,
    chunks: RwLock<Vec<Arc<Chunk>>>,
    rehydrator: Option<ChunkRehydrator>,
    /// Re-read chunks, least recently loaded first
    hydrated: Mutex<VecDeque<usize>>,
    hydrated_limit: usize,
}

impl TraceStore {
    pub fn new(regions: Arc<RegionTable>) -> Self {
        Self {
            regions,
            chunks: RwLock::new(Vec::new()),
            rehydrator: None,
            hydrated: Mutex::new(VecDeque::new()),
            hydrated_limit: DEFAULT_HYDRATED_CHUNKS,
        }
    }

    /// Allow dropped detail to be re-read from the trace file
    pub fn with_rehydrator(mut self, rehydrator: ChunkRehydrator) -> Self {
        self.rehydrator = Some(rehydrator);
        self
    }

    /// Number of re-read chunks that may hold detail at once
    ///
    /// Past the limit the oldest re-read chunk drops its detail again.
    /// Chunks whose detail was retained at ingest are never evicted.
    pub fn with_hydrated_limit(mut self, limit: usize) -> Self {
        self.hydrated_limit = limit;
        self
    }

    /// Indices of re-read chunks currently holding detail, oldest first
    pub fn hydrated_chunks(&self) -> Vec<usize> {
        self.hydrated.lock().iter().copied().collect()
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn region_table(&self) -> Arc<RegionTable> {
        Arc::clone(&self.regions)
    }

    /// Publish a complete chunk
    ///
    /// Chunks must arrive in processing order.
    pub fn append(&self, chunk: Chunk) -> Arc<Chunk> {
        let chunk = Arc::new(chunk);
        let mut chunks = self.chunks.write();
        debug_assert_eq!(chunk.index(), chunks.len(), "chunks appended out of order");
        chunks.push(Arc::clone(&chunk));
        chunk
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn chunk(&self, index: usize) -> Option<Arc<Chunk>> {
        self.chunks.read().get(index).cloned()
    }

    /// Snapshot of all chunks published so far
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().clone()
    }

    pub fn total_records(&self) -> u64 {
        self.chunks
            .read()
            .last()
            .map(|c| c.first_record() + c.record_count() as u64)
            .unwrap_or(0)
    }

    /// Map a global position to its chunk and chunk-local position
    pub fn locate(&self, position: u64) -> Option<(Arc<Chunk>, usize)> {
        let chunks = self.chunks.read();
        let after = chunks.partition_point(|c| c.first_record() <= position);
        let chunk = chunks.get(after.checked_sub(1)?)?;
        if !chunk.contains(position) {
            return None;
        }
        let local = (position - chunk.first_record()) as usize;
        Some((Arc::clone(chunk), local))
    }

    /// Record at a global position, re-reading dropped detail if needed
    ///
    /// **Public** - main per-record query
    ///
    /// # Errors
    /// * `TraceError::RecordNotFound` - position past the end of the trace
    /// * `TraceError::DetailUnavailable` - detail dropped and no rehydrator attached
    pub fn record_at(&self, position: u64) -> Result<Record, TraceError> {
        let (chunk, local) = self.locate(position).ok_or(TraceError::RecordNotFound(position))?;
        if let Some(record) = chunk.record(local) {
            return Ok(record);
        }

        let records = self.hydrate_chunk(&chunk)?;
        records
            .get(local)
            .copied()
            .ok_or(TraceError::RecordNotFound(position))
    }

    /// Enclosing call frames at a global position, outermost first
    ///
    /// Answered from the index alone; never touches record detail.
    pub fn stack_at(&self, position: u64) -> Result<Vec<Record>, TraceError> {
        let (chunk, local) = self.locate(position).ok_or(TraceError::RecordNotFound(position))?;
        Ok(chunk.stack_at(local))
    }

    /// Display names of the enclosing frames, outermost first
    pub fn stack_names_at(
        &self,
        position: u64,
        resolver: &dyn SymbolResolver,
    ) -> Result<Vec<String>, TraceError> {
        let names = self
            .stack_at(position)?
            .iter()
            .filter_map(Record::function_pointer)
            .map(|pointer| resolver.resolve_symbol(&self.regions.resolve(pointer), pointer))
            .collect();
        Ok(names)
    }

    /// Union of the regions every chunk touched
    pub fn touched_regions(&self) -> BTreeSet<RegionId> {
        self.chunks
            .read()
            .iter()
            .flat_map(|c| c.touched_regions().iter().copied())
            .collect()
    }

    /// Record counters summed over all chunks
    pub fn counts(&self) -> RecordCounts {
        let mut total = RecordCounts::default();
        for chunk in self.chunks.read().iter() {
            total.merge(chunk.counts());
        }
        total
    }

    /// Frames entered but never exited, outermost first
    pub fn open_frames_at_end(&self) -> Vec<Record> {
        self.chunks
            .read()
            .last()
            .map(|c| c.carry_out().to_vec())
            .unwrap_or_default()
    }

    /// Make sure chunk `index` holds its records
    ///
    /// # Errors
    /// * `TraceError::ChunkNotFound` - no such chunk
    /// * `TraceError::DetailUnavailable` - no rehydrator attached
    /// * `TraceError::DetailMismatch` - the file changed under us
    pub fn hydrate(&self, index: usize) -> Result<Arc<[Record]>, TraceError> {
        let chunk = self.chunk(index).ok_or(TraceError::ChunkNotFound(index))?;
        self.hydrate_chunk(&chunk)
    }

    /// Drop chunk `index`'s records, keeping its index and page data
    pub fn release_detail(&self, index: usize) -> Result<(), TraceError> {
        let chunk = self.chunk(index).ok_or(TraceError::ChunkNotFound(index))?;
        self.hydrated.lock().retain(|&i| i != index);
        chunk.release_detail();
        debug!("Released detail of chunk {}", index);
        Ok(())
    }

    fn hydrate_chunk(&self, chunk: &Chunk) -> Result<Arc<[Record]>, TraceError> {
        if let Some(records) = chunk.records() {
            return Ok(records);
        }

        let rehydrator = self
            .rehydrator
            .as_ref()
            .ok_or(TraceError::DetailUnavailable(chunk.index()))?;
        let records: Arc<[Record]> = rehydrator.load(chunk.file_offset())?.into();
        if records.len() != chunk.record_count() {
            return Err(TraceError::DetailMismatch {
                chunk: chunk.index(),
                expected: chunk.record_count(),
                actual: records.len(),
            });
        }
        if self.hydrated_limit > 0 {
            chunk.restore_detail(Arc::clone(&records));
            self.track_hydrated(chunk.index());
        }
        Ok(records)
    }

    /// Record a re-read chunk and evict the oldest ones past the limit
    fn track_hydrated(&self, index: usize) {
        let evicted: Vec<usize> = {
            let mut hydrated = self.hydrated.lock();
            hydrated.retain(|&i| i != index);
            hydrated.push_back(index);
            let excess = hydrated.len().saturating_sub(self.hydrated_limit);
            hydrated.drain(..excess).collect()
        };

        for old in evicted {
            if let Some(chunk) = self.chunk(old) {
                chunk.release_detail();
                debug!("Evicted re-read detail of chunk {}", old);
            }
        }
    }
}
