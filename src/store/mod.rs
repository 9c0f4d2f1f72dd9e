//! Queryable trace store and the pipeline that fills it.

pub mod ingest;
pub mod rehydrate;
pub mod symbols;
pub mod trace_store;

pub use ingest::{load_trace, spawn_ingest, spawn_pipeline, IngestHandle, IngestStats};
pub use rehydrate::ChunkRehydrator;
pub use symbols::{RegionSymbolResolver, SymbolResolver};
pub use trace_store::TraceStore;
