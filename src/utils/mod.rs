//! Utility modules for configuration and error handling.

pub mod error;
pub mod config;

// Re-export commonly used error types for convenience
pub use error::{BlockError, BudgetError, CodecError, IndexError, OutputError, ReaderError, TraceError};
pub use config::{BudgetConfig, PageConfig, TraceConfig};
