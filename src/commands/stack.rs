//! Stack command implementation.
//!
//! Loads the trace, then prints the record at a position together with the
//! named call stack enclosing it.

use super::models::StackArgs;
use super::utils::validate_trace_path;
use crate::parser::Record;
use crate::store::{load_trace, RegionSymbolResolver};
use anyhow::{Context, Result};

/// What the stack command found
#[derive(Debug, Clone, PartialEq)]
pub struct StackReport {
    pub position: u64,
    pub record: Record,
    /// Outermost frame first
    pub frames: Vec<String>,
}

/// Execute the stack command
///
/// **Public** - main entry point called from main.rs
pub fn execute_stack(args: StackArgs) -> Result<StackReport> {
    validate_trace_path(&args.trace)?;

    let config = args.options.to_config();
    let store = load_trace(&args.trace, &config)
        .with_context(|| format!("Failed to load trace {}", args.trace.display()))?;

    let record = store
        .record_at(args.position)
        .with_context(|| format!("No record at position {}", args.position))?;
    let frames = store.stack_names_at(args.position, &RegionSymbolResolver)?;

    let report = StackReport {
        position: args.position,
        record,
        frames,
    };
    print_report(&report);
    Ok(report)
}

fn print_report(report: &StackReport) {
    println!("Record {}: {}", report.position, report.record);
    if report.frames.is_empty() {
        println!("  (no enclosing frames)");
        return;
    }
    for (depth, frame) in report.frames.iter().enumerate() {
        println!("  #{:<3} {}", depth, frame);
    }
}
