//! Trace file parsing.
//!
//! This module handles:
//! - The fixed-width record codec
//! - The two-round block compression transform
//! - The header and region table
//! - Sequential and random-access block reading
//! - Writing traces in the same format

pub mod block;
pub mod reader;
pub mod record;
pub mod region;
pub mod writer;

// Re-export main types
pub use reader::{open, open_reader, BlockSource, RawBlock, TraceHeader};
pub use record::{MemoryAccess, Record, RecordKind};
pub use region::{MemoryRegion, RegionId, RegionTable};
pub use writer::TraceWriter;
