use super::models::TraceOptions;
use crate::parser::{self, writer::format_region_line, RegionTable};
use crate::utils::config::{RECORD_WIDTH, SUMMARY_SCHEMA_VERSION};
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Fail early with a readable message when the trace path is unusable
pub fn validate_trace_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("No trace file given");
    }
    if !path.exists() {
        bail!("Trace file not found: {}", path.display());
    }
    if !path.is_file() {
        bail!("Not a file: {}", path.display());
    }
    Ok(())
}

/// Print the region table from a trace header
///
/// Only the header is read; no blocks are decoded.
pub fn display_regions(path: &Path, options: &TraceOptions) -> Result<RegionTable> {
    validate_trace_path(path)?;

    let (header, regions, _) = parser::open(path, &options.to_config())
        .with_context(|| format!("Failed to read trace header of {}", path.display()))?;

    println!(
        "{} regions ({} bytes of header text, blocks start at offset {})",
        regions.len(),
        header.region_text_len,
        header.data_offset
    );
    for (index, region) in regions.iter().enumerate() {
        println!("  [{:>3}] {}", index, format_region_line(region));
    }
    Ok(regions)
}

/// Display version information
pub fn display_version() {
    println!("Memtrace Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Summary Schema: v{}", SUMMARY_SCHEMA_VERSION);
    println!("Record width: {} bytes", RECORD_WIDTH);
    println!();
    println!("Out-of-core memory-access trace ingestion and call stack queries.");
}
