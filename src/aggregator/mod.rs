//! Per-chunk aggregation of decoded records.
//!
//! This module turns record batches into indexed chunks:
//! - Call stack interval index (which frames enclose position N)
//! - Page activity with dense display coordinates
//! - Record counters and touched regions

pub mod chunk;
pub mod interval_tree;
pub mod page_activity;
pub mod stack_builder;

// Re-export main types
pub use chunk::{Chunk, ChunkProcessor, RecordBatch, RecordCounts};
pub use interval_tree::{Interval, IntervalTree};
pub use page_activity::{PageActivity, PageId};
pub use stack_builder::{CallStackIndex, Frame, FrameOrigin};
