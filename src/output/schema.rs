//! Output JSON schema for trace summaries.
//!
//! Schema is versioned to allow future evolution.

use crate::aggregator::{Chunk, RecordCounts};
use crate::store::{SymbolResolver, TraceStore};
use crate::utils::config::SUMMARY_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

/// Top-level summary written to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Schema version for compatibility checking
    pub version: String,

    /// Trace file the summary describes
    pub trace: String,

    pub page_size: u64,
    pub chunk_count: usize,
    pub total_records: u64,
    pub counts: RecordCounts,

    /// Per-chunk active and quiet pages, summed over chunks
    pub active_pages: u64,
    pub quiet_pages: u64,

    /// Regions any chunk touched, in address order
    pub touched_regions: Vec<RegionSummary>,

    /// Frames never exited, outermost first
    pub open_frames: Vec<String>,

    pub chunks: Vec<ChunkSummary>,

    /// Timestamp when the summary was generated
    pub generated_at: String,
}

/// A mapped region as reported in the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub id: usize,
    pub low: u64,
    pub high: u64,
    pub perms: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub first_record: u64,
    pub record_count: usize,
    pub file_offset: u64,
    pub frames: usize,
    pub active_pages: usize,
    pub quiet_pages: usize,
    pub peak_page_accesses: u64,
    /// Depth of the call stack left open at the end of the chunk
    pub open_depth: usize,
}

impl ChunkSummary {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            index: chunk.index(),
            first_record: chunk.first_record(),
            record_count: chunk.record_count(),
            file_offset: chunk.file_offset(),
            frames: chunk.call_stack().frame_count(),
            active_pages: chunk.active_pages().len(),
            quiet_pages: chunk.quiet_pages().len(),
            peak_page_accesses: chunk.pages().peak(),
            open_depth: chunk.carry_out().len(),
        }
    }
}

impl TraceSummary {
    /// Summarize everything published to `store` so far
    ///
    /// **Public** - main entry point for summary generation
    ///
    /// # Arguments
    /// * `store` - loaded trace
    /// * `trace` - trace file name to record in the summary
    /// * `page_size` - page size the chunks were built with
    /// * `resolver` - names the frames left open at the end
    pub fn from_store(
        store: &TraceStore,
        trace: impl Into<String>,
        page_size: u64,
        resolver: &dyn SymbolResolver,
    ) -> Self {
        use chrono::Utc;

        let chunks = store.chunks();
        let regions = store.regions();

        let touched_regions = store
            .touched_regions()
            .into_iter()
            .filter_map(|id| {
                regions.get(id).map(|region| RegionSummary {
                    id: id.0,
                    low: region.low,
                    high: region.high,
                    perms: region.perms.clone(),
                    pathname: region.pathname.clone(),
                })
            })
            .collect();

        let open_frames = store
            .open_frames_at_end()
            .iter()
            .filter_map(|record| record.function_pointer())
            .map(|pointer| resolver.resolve_symbol(&regions.resolve(pointer), pointer))
            .collect();

        Self {
            version: SUMMARY_SCHEMA_VERSION.to_string(),
            trace: trace.into(),
            page_size,
            chunk_count: chunks.len(),
            total_records: store.total_records(),
            counts: store.counts(),
            active_pages: chunks.iter().map(|c| c.active_pages().len() as u64).sum(),
            quiet_pages: chunks.iter().map(|c| c.quiet_pages().len() as u64).sum(),
            touched_regions,
            open_frames,
            chunks: chunks.iter().map(|c| ChunkSummary::from_chunk(c)).collect(),
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}
