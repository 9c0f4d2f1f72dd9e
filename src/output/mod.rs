//! Output writers for trace summaries.
//!
//! - Summary schema built from a loaded store
//! - JSON (pretty) writing and reading

pub mod json;
pub mod schema;

// Re-export main functions
pub use json::{read_summary, summary_to_string, write_summary};
pub use schema::{ChunkSummary, RegionSummary, TraceSummary};
