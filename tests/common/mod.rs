//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use memtrace_studio::budget::{MemorySnapshot, MemorySource};
use memtrace_studio::parser::{MemoryAccess, MemoryRegion, Record, TraceWriter};
use memtrace_studio::utils::config::BudgetConfig;
use memtrace_studio::utils::error::BudgetError;
use memtrace_studio::TraceConfig;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

/// Memory source that always has room
pub struct PlentyMemory;

impl MemorySource for PlentyMemory {
    fn snapshot(&mut self) -> Result<MemorySnapshot, BudgetError> {
        Ok(MemorySnapshot {
            total_bytes: 32 << 30,
            free_bytes: 16 << 30,
            reclaimable_bytes: 4 << 30,
            idle_heap_bytes: 0,
        })
    }
}

/// Config that never waits on host memory
pub fn relaxed_config() -> TraceConfig {
    TraceConfig::default().with_budget(BudgetConfig {
        min_spare_mb: 0,
        safety_margin_mb: 0,
        relative_margin_percent: 0,
        poll_interval: Duration::from_millis(1),
    })
}

pub fn region(low: u64, high: u64, pathname: &str) -> MemoryRegion {
    MemoryRegion {
        low,
        high,
        perms: "rw-p".to_string(),
        offset: "00000000".to_string(),
        dev: "00:00".to_string(),
        inode: "0".to_string(),
        pathname: pathname.to_string(),
    }
}

pub fn access(addr: u64) -> Record {
    Record::MemoryAccess(MemoryAccess {
        time: addr as f64 / 1000.0,
        pc: 0x401000,
        bp: 0x7ff0,
        sp: 0x7fe0,
        addr,
        is_write: addr % 2 == 0,
    })
}

pub fn enter(function_pointer: u64) -> Record {
    Record::FunctionEnter { function_pointer }
}

pub fn exit(function_pointer: u64) -> Record {
    Record::FunctionExit { function_pointer }
}

/// Write a trace file with one block per entry of `blocks`
pub fn write_trace(path: &Path, regions: &[MemoryRegion], blocks: &[Vec<Record>]) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut writer = TraceWriter::new(file, regions).unwrap();
    for block in blocks {
        writer.write_block(block).unwrap();
    }
    writer.finish().unwrap();
}

/// Deterministic xorshift generator
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    pub fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

/// Random well-nested trace, possibly leaving frames open at the end
pub fn random_records(rng: &mut XorShift, count: usize) -> Vec<Record> {
    let mut records = Vec::with_capacity(count);
    let mut open: Vec<u64> = Vec::new();

    for _ in 0..count {
        match rng.below(10) {
            0 | 1 if open.len() < 12 => {
                let pointer = 0x400000 + rng.below(64) * 0x10;
                open.push(pointer);
                records.push(enter(pointer));
            }
            2 if !open.is_empty() => {
                let pointer = open.pop().unwrap_or_default();
                records.push(exit(pointer));
            }
            _ => {
                // Skewed towards a few hot pages
                let page = if rng.below(4) == 0 { rng.below(200) } else { rng.below(4) };
                records.push(access(0x10000000 + page * 4096 + rng.below(4096)));
            }
        }
    }
    records
}

/// Split `records` into consecutive blocks of random sizes (empty blocks included)
pub fn split_blocks(rng: &mut XorShift, records: &[Record]) -> Vec<Vec<Record>> {
    let mut blocks = Vec::new();
    let mut rest = records;
    while !rest.is_empty() {
        let take = (rng.below(120) as usize).min(rest.len());
        blocks.push(rest[..take].to_vec());
        rest = &rest[take..];
    }
    blocks
}

/// Reference call stacks: the frames enclosing each position, outermost first
///
/// A frame covers its enter record and everything up to, but not including,
/// its exit record.
pub fn reference_stacks(records: &[Record]) -> Vec<Vec<u64>> {
    let mut stack = Vec::new();
    records
        .iter()
        .map(|record| {
            match *record {
                Record::FunctionEnter { function_pointer } => stack.push(function_pointer),
                Record::FunctionExit { .. } => {
                    stack.pop();
                }
                Record::MemoryAccess(_) => {}
            }
            stack.clone()
        })
        .collect()
}
