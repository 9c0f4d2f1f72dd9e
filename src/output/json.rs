//! JSON summary output writer.
//!
//! Writes TraceSummary structs to JSON files with proper formatting.

use super::schema::TraceSummary;
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write a summary to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `summary` - Summary to write
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_summary(summary: &TraceSummary, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing summary to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!("Cannot create directory {}: {}", parent.display(), e))
            })?;
        }
    }

    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)?;

    info!("Summary written successfully ({} bytes)", file_size(output_path));
    Ok(())
}

/// Serialize a summary to a pretty JSON string
pub fn summary_to_string(summary: &TraceSummary) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Read a summary back from a JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_summary(input_path: impl AsRef<Path>) -> Result<TraceSummary, OutputError> {
    let input_path = input_path.as_ref();
    debug!("Reading summary from: {}", input_path.display());

    let file = File::open(input_path)?;
    let summary: TraceSummary = serde_json::from_reader(file)?;

    debug!(
        "Summary loaded: version {}, {} chunks",
        summary.version, summary.chunk_count
    );
    Ok(summary)
}

fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }
    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
