//! Fixed-width wire records.
//!
//! Every record is exactly [`RECORD_WIDTH`] bytes: a little-endian `i64` tag
//! followed by a 48-byte payload union. Fields are decoded one by one, so the
//! byte layout is the contract and the in-memory layout of [`Record`] is free.
//!
//! | tag | payload |
//! | --- | --- |
//! | 0 | `time: f64, pc, bp, sp, addr: u64, is_write: u64` |
//! | 1 | `function_pointer: u64`, 40 zero bytes |
//! | 2 | `function_pointer: u64`, 40 zero bytes |

use crate::utils::config::{RECORD_PAYLOAD_WIDTH, RECORD_WIDTH};
use crate::utils::error::CodecError;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

const TAG_MEMORY_ACCESS: i64 = 0;
const TAG_FUNCTION_ENTER: i64 = 1;
const TAG_FUNCTION_EXIT: i64 = 2;

const TAG_WIDTH: usize = RECORD_WIDTH - RECORD_PAYLOAD_WIDTH;

/// A single load or store observed by the instrumentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryAccess {
    /// Seconds since capture start
    pub time: f64,
    pub pc: u64,
    pub bp: u64,
    pub sp: u64,
    pub addr: u64,
    pub is_write: bool,
}

/// One decoded trace event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    MemoryAccess(MemoryAccess),
    FunctionEnter { function_pointer: u64 },
    FunctionExit { function_pointer: u64 },
}

/// Discriminant of a [`Record`], handy for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    MemoryAccess,
    FunctionEnter,
    FunctionExit,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::MemoryAccess(_) => RecordKind::MemoryAccess,
            Record::FunctionEnter { .. } => RecordKind::FunctionEnter,
            Record::FunctionExit { .. } => RecordKind::FunctionExit,
        }
    }

    /// Function pointer of an enter/exit record
    pub fn function_pointer(&self) -> Option<u64> {
        match self {
            Record::FunctionEnter { function_pointer } | Record::FunctionExit { function_pointer } => {
                Some(*function_pointer)
            }
            Record::MemoryAccess(_) => None,
        }
    }

    pub fn as_access(&self) -> Option<&MemoryAccess> {
        match self {
            Record::MemoryAccess(access) => Some(access),
            _ => None,
        }
    }

    fn tag(&self) -> i64 {
        match self {
            Record::MemoryAccess(_) => TAG_MEMORY_ACCESS,
            Record::FunctionEnter { .. } => TAG_FUNCTION_ENTER,
            Record::FunctionExit { .. } => TAG_FUNCTION_EXIT,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::MemoryAccess(a) => write!(
                f,
                "MemAccess{{t={:.6} write={:5} pc={:#x} bp={:#x} sp={:#x} addr={:#x}}}",
                a.time, a.is_write, a.pc, a.bp, a.sp, a.addr
            ),
            Record::FunctionEnter { function_pointer } => {
                write!(f, "FunctionEnter{{ptr={:#x}}}", function_pointer)
            }
            Record::FunctionExit { function_pointer } => {
                write!(f, "FunctionExit{{ptr={:#x}}}", function_pointer)
            }
        }
    }
}

/// Decode a buffer of fixed-width records
///
/// **Public** - used by the ingestion pipeline and the rehydrator
///
/// # Errors
/// * `CodecError::MalformedRecordStream` - length is not a multiple of the record width
/// * `CodecError::UnknownTag` - a record carries a tag outside 0..=2
pub fn decode(buffer: &[u8]) -> Result<Vec<Record>, CodecError> {
    if buffer.len() % RECORD_WIDTH != 0 {
        return Err(CodecError::MalformedRecordStream {
            len: buffer.len(),
            width: RECORD_WIDTH,
        });
    }

    buffer
        .chunks_exact(RECORD_WIDTH)
        .enumerate()
        .map(|(position, raw)| decode_one(raw, position))
        .collect()
}

fn decode_one(raw: &[u8], position: usize) -> Result<Record, CodecError> {
    let (tag, payload) = raw.split_at(TAG_WIDTH);
    let tag = LittleEndian::read_i64(tag);

    match tag {
        TAG_MEMORY_ACCESS => Ok(Record::MemoryAccess(MemoryAccess {
            time: LittleEndian::read_f64(&payload[0..8]),
            pc: LittleEndian::read_u64(&payload[8..16]),
            bp: LittleEndian::read_u64(&payload[16..24]),
            sp: LittleEndian::read_u64(&payload[24..32]),
            addr: LittleEndian::read_u64(&payload[32..40]),
            is_write: LittleEndian::read_u64(&payload[40..48]) != 0,
        })),
        TAG_FUNCTION_ENTER => Ok(Record::FunctionEnter {
            function_pointer: LittleEndian::read_u64(&payload[0..8]),
        }),
        TAG_FUNCTION_EXIT => Ok(Record::FunctionExit {
            function_pointer: LittleEndian::read_u64(&payload[0..8]),
        }),
        tag => Err(CodecError::UnknownTag { tag, position }),
    }
}

/// Encode records into their wire representation
///
/// **Public** - inverse of [`decode`]; used by the trace writer
pub fn encode(records: &[Record]) -> Vec<u8> {
    let mut out = vec![0u8; records.len() * RECORD_WIDTH];

    for (record, slot) in records.iter().zip(out.chunks_exact_mut(RECORD_WIDTH)) {
        let (tag, payload) = slot.split_at_mut(TAG_WIDTH);
        LittleEndian::write_i64(tag, record.tag());
        match record {
            Record::MemoryAccess(a) => {
                LittleEndian::write_f64(&mut payload[0..8], a.time);
                LittleEndian::write_u64(&mut payload[8..16], a.pc);
                LittleEndian::write_u64(&mut payload[16..24], a.bp);
                LittleEndian::write_u64(&mut payload[24..32], a.sp);
                LittleEndian::write_u64(&mut payload[32..40], a.addr);
                LittleEndian::write_u64(&mut payload[40..48], a.is_write as u64);
            }
            Record::FunctionEnter { function_pointer } | Record::FunctionExit { function_pointer } => {
                LittleEndian::write_u64(&mut payload[0..8], *function_pointer);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(addr: u64, is_write: bool) -> Record {
        Record::MemoryAccess(MemoryAccess {
            time: 1.5,
            pc: 0x400000,
            bp: 0x7fff0000,
            sp: 0x7ffeff00,
            addr,
            is_write,
        })
    }

    #[test]
    fn test_round_trip_all_tags() {
        let records = vec![
            Record::FunctionEnter { function_pointer: 0xdead },
            access(0x1000, true),
            access(0x2008, false),
            Record::FunctionExit { function_pointer: 0xdead },
        ];

        let bytes = encode(&records);
        assert_eq!(bytes.len(), records.len() * RECORD_WIDTH);
        assert_eq!(decode(&bytes).unwrap(), records);
    }

    #[test]
    fn test_byte_layout_is_little_endian() {
        let bytes = encode(&[Record::FunctionExit { function_pointer: 0x0102 }]);

        assert_eq!(&bytes[0..8], &[2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..10], &[0x02, 0x01]);
        assert!(bytes[16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_access_fills_whole_payload() {
        let bytes = encode(&[access(u64::MAX, true)]);
        let (tag, payload) = bytes.split_at(TAG_WIDTH);

        assert_eq!(tag, &[0u8; 8]);
        assert_eq!(payload.len(), RECORD_PAYLOAD_WIDTH);
        assert_eq!(&payload[32..40], &[0xff; 8]);
        assert_eq!(&payload[RECORD_PAYLOAD_WIDTH - 8..], &[1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_nonzero_write_flag_decodes_as_write() {
        let mut bytes = encode(&[access(0x10, false)]);
        bytes[48] = 7;
        assert!(decode(&bytes).unwrap()[0].as_access().unwrap().is_write);
    }

    #[test]
    fn test_malformed_length_rejected() {
        let mut bytes = encode(&[access(0x10, false)]);
        bytes.pop();

        assert_eq!(
            decode(&bytes),
            Err(CodecError::MalformedRecordStream { len: 55, width: RECORD_WIDTH })
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut bytes = encode(&[access(0x10, false), access(0x20, false)]);
        bytes[RECORD_WIDTH] = 9;

        assert_eq!(decode(&bytes), Err(CodecError::UnknownTag { tag: 9, position: 1 }));
    }

    #[test]
    fn test_empty_buffer_decodes_to_nothing() {
        assert!(decode(&[]).unwrap().is_empty());
    }
}
