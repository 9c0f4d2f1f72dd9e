//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.
//!
//! A recorded trace is a fixed artifact, so almost everything here is fatal
//! for the load. The exceptions are malformed region lines (skipped unless
//! strict mode is on) and memory queries (treated as unknown).

use thiserror::Error;

/// Errors that can occur while decoding the fixed-width record stream
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed record stream: {len} bytes is not a multiple of the {width}-byte record width")]
    MalformedRecordStream { len: usize, width: usize },

    #[error("Unknown record tag {tag} at record {position}")]
    UnknownTag { tag: i64, position: usize },
}

/// Errors that can occur while reading the trace file header and blocks
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad magic bytes: {found:?}")]
    BadMagic { found: Vec<u8> },

    #[error("Trace header ended before the region table terminator")]
    TruncatedHeader,

    #[error("Region table is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Malformed region line {line_number} '{line}': {reason}")]
    MalformedRegionLine {
        line_number: usize,
        line: String,
        reason: String,
    },

    #[error("Region table not sorted: region {index} starts at {low:#x}, before the end of its predecessor ({previous_high:#x})")]
    UnsortedRegions {
        index: usize,
        low: u64,
        previous_high: u64,
    },

    #[error("Invalid block length {length} at offset {offset}")]
    InvalidBlockLength { length: i64, offset: u64 },

    #[error("Truncated block at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedBlock {
        offset: u64,
        expected: usize,
        actual: usize,
    },
}

/// Errors that can occur while reversing the block compression
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("Decompression failed in round {round}: {reason}")]
    DecompressionError { round: u8, reason: String },
}

/// Errors that can occur while reconstructing call stacks
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IndexError {
    #[error("Unbalanced stack at record {position}: exit of {found:#x} does not match open frame {expected:?}")]
    UnbalancedStack {
        position: usize,
        expected: Option<u64>,
        found: u64,
    },

    #[error("Carried-in context slot {slot} is not a function entry")]
    InvalidContextRecord { slot: usize },
}

/// Errors that can occur while waiting for the memory budget
#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Memory statistics unavailable: {0}")]
    MemoryQuery(String),

    #[error("Ingestion cancelled while waiting for memory")]
    Cancelled,
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Top-level error for loading and querying a trace
#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Chunk {0} does not exist")]
    ChunkNotFound(usize),

    #[error("Record {0} is past the end of the trace")]
    RecordNotFound(u64),

    #[error("Record detail for chunk {0} was dropped and no trace file is attached to re-read it")]
    DetailUnavailable(usize),

    #[error("Re-read of chunk {chunk} produced {actual} records, expected {expected}")]
    DetailMismatch {
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),
}

impl From<std::io::Error> for TraceError {
    fn from(err: std::io::Error) -> Self {
        TraceError::Reader(ReaderError::Io(err))
    }
}
