//! Re-reading dropped chunk detail from the trace file.

use crate::parser::block::decompress;
use crate::parser::record::decode;
use crate::parser::{BlockSource, Record};
use crate::utils::error::{ReaderError, TraceError};
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Decompress and decode one block payload
pub(crate) fn decode_payload(payload: &[u8]) -> Result<Vec<Record>, TraceError> {
    let raw = decompress(payload)?;
    Ok(decode(&raw)?)
}

/// Reloads blocks by file offset through its own file handle
///
/// Each load opens the file afresh, so it never contends with the ingest
/// reader's position.
#[derive(Debug, Clone)]
pub struct ChunkRehydrator {
    path: PathBuf,
}

impl ChunkRehydrator {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the block whose length prefix sits at `file_offset`
    ///
    /// # Errors
    /// * `ReaderError::TruncatedBlock` - no block at that offset
    /// * decompression and decoding errors as during ingestion
    pub fn load(&self, file_offset: u64) -> Result<Vec<Record>, TraceError> {
        let file = File::open(&self.path)?;
        let mut source = BlockSource::at_offset(file, file_offset)?;

        let block = source.next_block()?.ok_or(ReaderError::TruncatedBlock {
            offset: file_offset,
            expected: 8,
            actual: 0,
        })?;

        let records = decode_payload(&block.payload)?;
        debug!(
            "Re-read {} records from offset {} of {}",
            records.len(),
            file_offset,
            self.path.display()
        );
        Ok(records)
    }
}
