//! Inspect command implementation.
//!
//! The inspect command:
//! 1. Ingests the trace under the memory budget
//! 2. Builds a summary of chunks, pages and regions
//! 3. Prints it and optionally writes it as JSON

use super::models::InspectArgs;
use super::utils::validate_trace_path;
use crate::output::{write_summary, TraceSummary};
use crate::store::{load_trace, RegionSymbolResolver};
use anyhow::{Context, Result};
use log::info;
use std::time::Instant;

/// Execute the inspect command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Missing or unreadable trace file
/// * Any fatal ingestion error
/// * Summary write errors
pub fn execute_inspect(args: InspectArgs) -> Result<TraceSummary> {
    let start_time = Instant::now();
    validate_trace_path(&args.trace)?;

    let config = args.options.to_config();
    let store = load_trace(&args.trace, &config)
        .with_context(|| format!("Failed to load trace {}", args.trace.display()))?;

    let summary = TraceSummary::from_store(
        &store,
        args.trace.display().to_string(),
        config.pages.page_size,
        &RegionSymbolResolver,
    );
    print_summary(&summary);

    if let Some(output) = &args.output {
        write_summary(&summary, output).context("Failed to write summary JSON")?;
        println!("Summary written to {}", output.display());
    }

    info!("Inspect completed in {:.2?}", start_time.elapsed());
    Ok(summary)
}

/// Print a human-readable summary to stdout
pub fn print_summary(summary: &TraceSummary) {
    let counts = &summary.counts;

    println!("Trace: {}", summary.trace);
    println!("  Chunks:         {}", summary.chunk_count);
    println!("  Records:        {}", summary.total_records);
    println!("    accesses:     {} ({} writes, {} unmapped)", counts.accesses, counts.writes, counts.unmapped_accesses);
    println!("    enters/exits: {} / {}", counts.enters, counts.exits);
    println!("  Pages ({} B):   {} active, {} quiet", summary.page_size, summary.active_pages, summary.quiet_pages);

    println!("  Touched regions: {}", summary.touched_regions.len());
    for region in &summary.touched_regions {
        let name = if region.pathname.is_empty() { "[anon]" } else { region.pathname.as_str() };
        println!("    {:#014x}-{:#014x} {} {}", region.low, region.high, region.perms, name);
    }

    if !summary.open_frames.is_empty() {
        println!("  Frames open at end of trace:");
        for (depth, frame) in summary.open_frames.iter().enumerate() {
            println!("    #{} {}", depth, frame);
        }
    }
}
