//! Trace file writer.
//!
//! Produces the same byte layout the capture runtime emits, which makes it
//! possible to build fixtures and to repack decoded traces.

use super::block::compress_twice;
use super::record::{encode, Record};
use super::region::MemoryRegion;
use crate::utils::config::TRACE_MAGIC;
use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use std::io::{self, Write};

/// Streaming writer for trace files
pub struct TraceWriter<W: Write> {
    inner: W,
    blocks_written: usize,
}

impl<W: Write> TraceWriter<W> {
    /// Write the magic and the region table, ready for blocks
    pub fn new(mut inner: W, regions: &[MemoryRegion]) -> io::Result<Self> {
        inner.write_all(TRACE_MAGIC)?;
        for region in regions {
            inner.write_all(format_region_line(region).as_bytes())?;
            inner.write_all(b"\n")?;
        }
        inner.write_all(&[0])?;

        Ok(Self {
            inner,
            blocks_written: 0,
        })
    }

    /// Encode, double-compress and append one block of records
    pub fn write_block(&mut self, records: &[Record]) -> io::Result<()> {
        let payload = compress_twice(&encode(records));
        self.inner.write_i64::<LittleEndian>(payload.len() as i64)?;
        self.inner.write_all(&payload)?;
        self.blocks_written += 1;
        debug!(
            "Wrote block {} ({} records, {} bytes)",
            self.blocks_written,
            records.len(),
            payload.len()
        );
        Ok(())
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Render a region the way the header stores it
///
/// **Public** - inverse of `parse_region_line`
pub fn format_region_line(region: &MemoryRegion) -> String {
    let mut line = format!(
        "{:08x}-{:08x} {} {} {} {}",
        region.low, region.high, region.perms, region.offset, region.dev, region.inode
    );
    if !region.pathname.is_empty() {
        line.push(' ');
        line.push_str(&region.pathname);
    }
    line
}
