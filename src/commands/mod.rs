//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod inspect;
pub mod models;
pub mod stack;
pub mod utils;

// Re-export main command functions
pub use inspect::{execute_inspect, print_summary};
pub use models::{InspectArgs, StackArgs, TraceOptions};
pub use stack::{execute_stack, StackReport};
pub use utils::{display_regions, display_version, validate_trace_path};
