//! Trace file reader.
//!
//! Layout of a trace file:
//!
//! ```text
//! +----------+---------------------------+-----------------------------+
//! | MEMACCES | region table text ... \0  | [i64 len][len bytes] ...    |
//! +----------+---------------------------+-----------------------------+
//! ```
//!
//! The header is parsed eagerly; blocks are handed out one at a time by
//! [`BlockSource`] so the file never has to fit in memory.

use super::region::{parse_region_table, RegionTable};
use crate::utils::config::{TraceConfig, TRACE_MAGIC};
use crate::utils::error::ReaderError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Parsed fixed part of a trace file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    /// Size of the region text, excluding the NUL terminator
    pub region_text_len: usize,

    /// File offset of the first block
    pub data_offset: u64,
}

/// One compressed block as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Offset of the block's length prefix
    pub file_offset: u64,
    pub payload: Vec<u8>,
}

/// Sequential source of compressed blocks
pub struct BlockSource<R> {
    reader: BufReader<R>,
    offset: u64,
}

/// Open a trace file and parse its header
///
/// **Public** - main entry point for reading traces
///
/// # Errors
/// * `ReaderError::Io` - the file cannot be opened or read
/// * `ReaderError::BadMagic` - the file is not a memory-access trace
/// * `ReaderError::InvalidUtf8` - strict mode and non-UTF-8 region text
/// * `ReaderError::MalformedRegionLine` - strict mode and a bad region line
/// * `ReaderError::UnsortedRegions` - region table violates ordering
pub fn open(
    path: impl AsRef<Path>,
    config: &TraceConfig,
) -> Result<(TraceHeader, RegionTable, BlockSource<File>), ReaderError> {
    let path = path.as_ref();
    info!("Opening trace: {}", path.display());
    let file = File::open(path)?;
    open_reader(file, config)
}

/// Parse the header from any byte stream
///
/// **Public** - used by [`open`] and by tests over in-memory buffers
pub fn open_reader<R: Read>(
    inner: R,
    config: &TraceConfig,
) -> Result<(TraceHeader, RegionTable, BlockSource<R>), ReaderError> {
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, inner);

    let mut magic = [0u8; 8];
    let filled = read_fully(&mut reader, &mut magic)?;
    if filled < magic.len() || &magic != TRACE_MAGIC {
        return Err(ReaderError::BadMagic {
            found: magic[..filled].to_vec(),
        });
    }

    let mut table_bytes = Vec::new();
    reader.read_until(0, &mut table_bytes)?;
    if table_bytes.pop() != Some(0) {
        return Err(ReaderError::TruncatedHeader);
    }
    debug!("Region table size: {} bytes", table_bytes.len());

    let header = TraceHeader {
        region_text_len: table_bytes.len(),
        data_offset: (TRACE_MAGIC.len() + table_bytes.len() + 1) as u64,
    };
    let text = match String::from_utf8(table_bytes) {
        Ok(text) => text,
        Err(e) if config.strict_regions => return Err(e.into()),
        Err(e) => {
            warn!(
                "Region table is not valid UTF-8 at byte {}; replacing invalid sequences",
                e.utf8_error().valid_up_to()
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    let regions = parse_region_table(&text, config.strict_regions)?;

    let source = BlockSource {
        reader,
        offset: header.data_offset,
    };
    Ok((header, regions, source))
}

impl<R: Read> BlockSource<R> {
    /// Offset of the next block to be read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next block, or `None` at a clean end of stream
    ///
    /// # Errors
    /// * `ReaderError::InvalidBlockLength` - negative length prefix
    /// * `ReaderError::TruncatedBlock` - stream ends inside a prefix or payload
    pub fn next_block(&mut self) -> Result<Option<RawBlock>, ReaderError> {
        let file_offset = self.offset;

        let mut prefix = [0u8; 8];
        let filled = read_fully(&mut self.reader, &mut prefix)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < prefix.len() {
            return Err(ReaderError::TruncatedBlock {
                offset: file_offset,
                expected: prefix.len(),
                actual: filled,
            });
        }

        let length = LittleEndian::read_i64(&prefix);
        if length < 0 {
            return Err(ReaderError::InvalidBlockLength {
                length,
                offset: file_offset,
            });
        }

        // Grow while reading so a corrupt length cannot force a huge allocation
        let mut payload = Vec::new();
        (&mut self.reader).take(length as u64).read_to_end(&mut payload)?;
        if payload.len() as u64 != length as u64 {
            return Err(ReaderError::TruncatedBlock {
                offset: file_offset,
                expected: length as usize,
                actual: payload.len(),
            });
        }

        self.offset += prefix.len() as u64 + length as u64;
        debug!("Read block at offset {} ({} bytes)", file_offset, length);
        Ok(Some(RawBlock { file_offset, payload }))
    }
}

impl<R: Read + Seek> BlockSource<R> {
    /// Position a fresh source at a previously recorded block offset
    pub fn at_offset(mut inner: R, offset: u64) -> Result<Self, ReaderError> {
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            reader: BufReader::new(inner),
            offset,
        })
    }
}

impl<R: Read> Iterator for BlockSource<R> {
    type Item = Result<RawBlock, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

/// Fill `buf` as far as the stream allows, returning the bytes read
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RegionId;
    use std::io::Cursor;

    fn header_bytes(regions: &str) -> Vec<u8> {
        let mut bytes = TRACE_MAGIC.to_vec();
        bytes.extend_from_slice(regions.as_bytes());
        bytes.push(0);
        bytes
    }

    fn push_block(bytes: &mut Vec<u8>, payload: &[u8]) {
        bytes.extend_from_slice(&(payload.len() as i64).to_le_bytes());
        bytes.extend_from_slice(payload);
    }

    #[test]
    fn test_bad_magic() {
        let bytes = b"NOTATRACE\0".to_vec();
        let err = open_reader(Cursor::new(bytes), &TraceConfig::default()).err().unwrap();
        assert!(matches!(err, ReaderError::BadMagic { .. }));
    }

    #[test]
    fn test_short_file_is_bad_magic() {
        let err = open_reader(Cursor::new(b"MEM".to_vec()), &TraceConfig::default()).err().unwrap();
        assert!(matches!(err, ReaderError::BadMagic { found } if found == b"MEM".to_vec()));
    }

    #[test]
    fn test_missing_terminator() {
        let mut bytes = TRACE_MAGIC.to_vec();
        bytes.extend_from_slice(b"1000-2000 r--p 0 0 0\n");
        let err = open_reader(Cursor::new(bytes), &TraceConfig::default()).err().unwrap();
        assert!(matches!(err, ReaderError::TruncatedHeader));
    }

    #[test]
    fn test_non_utf8_pathname_is_lenient() {
        let mut bytes = TRACE_MAGIC.to_vec();
        bytes.extend_from_slice(b"1000-2000 r-xp 0 08:01 77 /opt/lib\xffdemo.so\n");
        bytes.extend_from_slice(b"3000-4000 rw-p 0 0 0\n");
        bytes.push(0);

        let (header, regions, _) = open_reader(Cursor::new(bytes.clone()), &TraceConfig::default()).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions.get(RegionId(0)).unwrap().pathname, "/opt/lib\u{fffd}demo.so");
        // offsets follow the raw bytes, not the repaired text
        assert_eq!(header.data_offset, bytes.len() as u64);

        let strict = TraceConfig::default().with_strict_regions(true);
        let err = open_reader(Cursor::new(bytes), &strict).err().unwrap();
        assert!(matches!(err, ReaderError::InvalidUtf8(_)));
    }

    #[test]
    fn test_header_then_blocks() {
        let mut bytes = header_bytes("1000-2000 r--p 0 0 0\n");
        let data_offset = bytes.len() as u64;
        push_block(&mut bytes, b"first");
        push_block(&mut bytes, b"");
        push_block(&mut bytes, b"third!");

        let (header, regions, mut source) = open_reader(Cursor::new(bytes), &TraceConfig::default()).unwrap();
        assert_eq!(header.data_offset, data_offset);
        assert_eq!(regions.len(), 1);

        let first = source.next_block().unwrap().unwrap();
        assert_eq!(first.file_offset, data_offset);
        assert_eq!(first.payload, b"first");

        let second = source.next_block().unwrap().unwrap();
        assert_eq!(second.file_offset, data_offset + 8 + 5);
        assert!(second.payload.is_empty());

        assert_eq!(source.next_block().unwrap().unwrap().payload, b"third!");
        assert!(source.next_block().unwrap().is_none());
    }

    #[test]
    fn test_no_blocks_is_clean_end() {
        let bytes = header_bytes("");
        let (_, regions, mut source) = open_reader(Cursor::new(bytes), &TraceConfig::default()).unwrap();
        assert!(regions.is_empty());
        assert!(source.next_block().unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = header_bytes("");
        bytes.extend_from_slice(&100i64.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);

        let (_, _, mut source) = open_reader(Cursor::new(bytes), &TraceConfig::default()).unwrap();
        assert!(matches!(
            source.next_block(),
            Err(ReaderError::TruncatedBlock { expected: 100, actual: 3, .. })
        ));
    }

    #[test]
    fn test_truncated_length_prefix() {
        let mut bytes = header_bytes("");
        bytes.extend_from_slice(&[5, 0, 0]);

        let (_, _, mut source) = open_reader(Cursor::new(bytes), &TraceConfig::default()).unwrap();
        assert!(matches!(
            source.next_block(),
            Err(ReaderError::TruncatedBlock { expected: 8, actual: 3, .. })
        ));
    }

    #[test]
    fn test_negative_length() {
        let mut bytes = header_bytes("");
        bytes.extend_from_slice(&(-4i64).to_le_bytes());

        let (_, _, mut source) = open_reader(Cursor::new(bytes), &TraceConfig::default()).unwrap();
        assert!(matches!(
            source.next_block(),
            Err(ReaderError::InvalidBlockLength { length: -4, .. })
        ));
    }

    #[test]
    fn test_seek_back_to_block() {
        let mut bytes = header_bytes("");
        push_block(&mut bytes, b"aaaa");
        let second_offset = bytes.len() as u64;
        push_block(&mut bytes, b"bbbbbb");

        let mut source = BlockSource::at_offset(Cursor::new(bytes), second_offset).unwrap();
        let block = source.next().unwrap().unwrap();
        assert_eq!(block.file_offset, second_offset);
        assert_eq!(block.payload, b"bbbbbb");
        assert!(source.next().is_none());
    }
}
