//! Memtrace Studio
//!
//! Out-of-core ingestion of recorded memory-access traces.
//!
//! A trace file holds a snapshot of the traced process's address map followed
//! by double-compressed blocks of fixed-width records (memory accesses and
//! function enter/exit events). Loading one:
//!
//! - streams blocks in file order, pausing while the host is short of memory
//! - indexes each block's call frames in an interval tree, including frames
//!   that span block boundaries
//! - classifies touched pages and compacts the sparse address space into a
//!   dense display axis
//!
//! and leaves a [`store::TraceStore`] that answers "which record is at N" and
//! "what is the call stack at N".
//!
//! ## Getting Started
//!
//! ```bash
//! memtrace inspect app.trace --output summary.json
//! memtrace stack app.trace --at 123456
//! ```

pub mod aggregator;
pub mod budget;
pub mod commands;
pub mod output;
pub mod parser;
pub mod store;
pub mod utils;

pub use store::{load_trace, TraceStore};
pub use utils::config::TraceConfig;
pub use utils::error::TraceError;
