//! Memory budget for out-of-core ingestion.
//!
//! Traces can be far larger than RAM, so the reader only pulls the next
//! block once the host has enough spare memory.

pub mod gate;
pub mod source;

pub use gate::{spare_memory_mb, BudgetOutcome, MemoryBudgetGate};
pub use source::{MemorySnapshot, MemorySource, SystemMemory};
