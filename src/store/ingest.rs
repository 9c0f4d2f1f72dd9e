//! Two-stage ingest pipeline.
//!
//! ```text
//! reader thread                          processor thread
//! gate -> next block -> decompress  ==>  ChunkProcessor -> TraceStore::append
//!         -> decode                (bounded channel)
//! ```
//!
//! The reader stays strictly in file order and asks the memory gate before
//! every block. A shared shutdown flag lets both threads stop between blocks.

use super::rehydrate::{decode_payload, ChunkRehydrator};
use super::trace_store::TraceStore;
use crate::aggregator::{ChunkProcessor, RecordBatch};
use crate::budget::{BudgetOutcome, MemoryBudgetGate, MemorySource, SystemMemory};
use crate::parser::{self, BlockSource};
use crate::utils::config::TraceConfig;
use crate::utils::error::{BudgetError, TraceError};
use log::{debug, info, warn};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Counters reported when ingestion ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub blocks: usize,
    pub compressed_bytes: u64,
    pub records: u64,
    /// Blocks read without knowing the host memory state
    pub unknown_budget: usize,
    /// Whether ingestion stopped early on request
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct ReaderStats {
    blocks: usize,
    compressed_bytes: u64,
    unknown_budget: usize,
    cancelled: bool,
}

/// Running ingestion; the store fills as chunks are published
pub struct IngestHandle {
    store: Arc<TraceStore>,
    shutdown: Arc<AtomicBool>,
    reader: JoinHandle<Result<ReaderStats, TraceError>>,
    processor: JoinHandle<Result<u64, TraceError>>,
}

impl IngestHandle {
    /// The store being filled
    pub fn store(&self) -> Arc<TraceStore> {
        Arc::clone(&self.store)
    }

    /// Ask both threads to stop at the next block boundary
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.processor.is_finished()
    }

    /// Wait for both threads
    ///
    /// # Errors
    /// The first error either thread hit, reader first
    pub fn join(self) -> Result<IngestStats, TraceError> {
        let reader = self
            .reader
            .join()
            .map_err(|_| TraceError::WorkerPanicked("reader"))?;
        let processor = self
            .processor
            .join()
            .map_err(|_| TraceError::WorkerPanicked("processor"))?;

        let reader = reader?;
        let records = processor?;
        let cancelled = reader.cancelled || self.shutdown.load(Ordering::Relaxed);

        Ok(IngestStats {
            blocks: reader.blocks,
            compressed_bytes: reader.compressed_bytes,
            records,
            unknown_budget: reader.unknown_budget,
            cancelled,
        })
    }
}

/// Start ingesting an already opened block source into `store`
///
/// **Public** - lowest-level entry point, any byte stream and memory source
pub fn spawn_pipeline<R, S>(
    source: BlockSource<R>,
    store: Arc<TraceStore>,
    gate: MemoryBudgetGate<S>,
    config: &TraceConfig,
) -> IngestHandle
where
    R: Read + Send + 'static,
    S: MemorySource + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let gate = gate.with_shutdown(Arc::clone(&shutdown));
    let (tx, rx) = sync_channel::<RecordBatch>(config.channel_capacity);

    let min_spare_mb = config.budget.min_spare_mb;
    let reader_flag = Arc::clone(&shutdown);
    let reader = thread::spawn(move || read_blocks(source, gate, min_spare_mb, tx, reader_flag));

    let processor_store = Arc::clone(&store);
    let processor_flag = Arc::clone(&shutdown);
    let chunk_processor = ChunkProcessor::new(config, store.region_table());
    let processor =
        thread::spawn(move || process_batches(chunk_processor, rx, processor_store, processor_flag));

    IngestHandle {
        store,
        shutdown,
        reader,
        processor,
    }
}

/// Open a trace file and start ingesting it
///
/// # Errors
/// * `TraceError::InvalidConfig` - config rejected by validation
/// * header errors from [`parser::open`]
pub fn spawn_ingest<S>(
    path: impl AsRef<Path>,
    config: &TraceConfig,
    memory: S,
) -> Result<IngestHandle, TraceError>
where
    S: MemorySource + Send + 'static,
{
    config.validate()?;
    let path = path.as_ref();
    let (header, regions, source) = parser::open(path, config)?;
    info!(
        "Loaded {} regions, blocks start at offset {}",
        regions.len(),
        header.data_offset
    );

    let store = TraceStore::new(Arc::new(regions))
        .with_rehydrator(ChunkRehydrator::new(path))
        .with_hydrated_limit(config.hydrated_chunks);
    let gate = MemoryBudgetGate::new(memory, config.budget.clone());
    Ok(spawn_pipeline(source, Arc::new(store), gate, config))
}

/// Ingest a whole trace file, gated on host memory
///
/// **Public** - convenience entry point used by the CLI
pub fn load_trace(path: impl AsRef<Path>, config: &TraceConfig) -> Result<Arc<TraceStore>, TraceError> {
    let handle = spawn_ingest(path, config, SystemMemory::new())?;
    let store = handle.store();
    let stats = handle.join()?;
    info!(
        "Ingested {} records in {} blocks ({} compressed bytes)",
        stats.records, stats.blocks, stats.compressed_bytes
    );
    Ok(store)
}

fn read_blocks<R: Read, S: MemorySource>(
    mut source: BlockSource<R>,
    mut gate: MemoryBudgetGate<S>,
    min_spare_mb: i64,
    tx: SyncSender<RecordBatch>,
    shutdown: Arc<AtomicBool>,
) -> Result<ReaderStats, TraceError> {
    let mut stats = ReaderStats::default();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            stats.cancelled = true;
            break;
        }

        let outcome = match gate.await_budget(min_spare_mb) {
            Ok(outcome) => outcome,
            Err(BudgetError::Cancelled) => {
                stats.cancelled = true;
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let Some(block) = source.next_block()? else {
            break;
        };
        if outcome == BudgetOutcome::Unknown {
            stats.unknown_budget += 1;
        }
        let records = decode_payload(&block.payload)?;
        stats.blocks += 1;
        stats.compressed_bytes += block.payload.len() as u64;

        let batch = RecordBatch {
            file_offset: block.file_offset,
            records,
        };
        if tx.send(batch).is_err() {
            // Processor stopped; its own result carries the reason
            debug!("Processor gone, reader stopping at offset {}", block.file_offset);
            break;
        }
    }

    debug!("Reader finished after {} blocks", stats.blocks);
    Ok(stats)
}

fn process_batches(
    mut processor: ChunkProcessor,
    rx: Receiver<RecordBatch>,
    store: Arc<TraceStore>,
    shutdown: Arc<AtomicBool>,
) -> Result<u64, TraceError> {
    let mut records = 0u64;

    for batch in rx {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let chunk = match processor.process(batch) {
            Ok(chunk) => chunk,
            Err(e) => {
                shutdown.store(true, Ordering::Relaxed);
                return Err(e.into());
            }
        };
        records += chunk.record_count() as u64;
        store.append(chunk);
    }

    let open = processor.open_frames();
    if !open.is_empty() {
        warn!("{} frames never exited before the end of the trace", open.len());
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::MemorySnapshot;
    use crate::parser::{open_reader, MemoryAccess, Record, TraceWriter};
    use crate::utils::config::BudgetConfig;
    use std::io::Cursor;
    use std::time::Duration;

    /// Reports plenty of memory, or fails every query
    struct StaticMemory {
        healthy: bool,
    }

    impl MemorySource for StaticMemory {
        fn snapshot(&mut self) -> Result<MemorySnapshot, BudgetError> {
            if !self.healthy {
                return Err(BudgetError::MemoryQuery("no statistics".to_string()));
            }
            Ok(MemorySnapshot {
                total_bytes: 16 << 30,
                free_bytes: 8 << 30,
                reclaimable_bytes: 0,
                idle_heap_bytes: 0,
            })
        }
    }

    /// Never has enough memory
    struct StarvedMemory;

    impl MemorySource for StarvedMemory {
        fn snapshot(&mut self) -> Result<MemorySnapshot, BudgetError> {
            Ok(MemorySnapshot {
                total_bytes: 16 << 30,
                ..MemorySnapshot::default()
            })
        }
    }

    fn access(addr: u64) -> Record {
        Record::MemoryAccess(MemoryAccess {
            time: 0.5,
            pc: 1,
            bp: 2,
            sp: 3,
            addr,
            is_write: true,
        })
    }

    fn trace_bytes(blocks: &[Vec<Record>]) -> Vec<u8> {
        let mut writer = TraceWriter::new(Vec::new(), &[]).unwrap();
        for block in blocks {
            writer.write_block(block).unwrap();
        }
        writer.finish().unwrap()
    }

    fn config() -> TraceConfig {
        TraceConfig::default().with_budget(BudgetConfig {
            min_spare_mb: 100,
            safety_margin_mb: 0,
            relative_margin_percent: 0,
            poll_interval: Duration::from_millis(1),
        })
    }

    fn run<S: MemorySource + Send + 'static>(
        blocks: &[Vec<Record>],
        memory: S,
    ) -> (Arc<TraceStore>, Result<IngestStats, TraceError>) {
        let config = config();
        let (_, regions, source) = open_reader(Cursor::new(trace_bytes(blocks)), &config).unwrap();
        let store = Arc::new(TraceStore::new(Arc::new(regions)));
        let gate = MemoryBudgetGate::new(memory, config.budget.clone());
        let handle = spawn_pipeline(source, Arc::clone(&store), gate, &config);
        (store, handle.join())
    }

    #[test]
    fn test_pipeline_publishes_every_block() {
        let blocks = vec![vec![access(0x10); 7], vec![access(0x20); 3], vec![]];
        let (store, stats) = run(&blocks, StaticMemory { healthy: true });
        let stats = stats.unwrap();

        assert_eq!(stats.blocks, 3);
        assert_eq!(stats.records, 10);
        assert_eq!(stats.unknown_budget, 0);
        assert!(!stats.cancelled);
        assert_eq!(store.chunk_count(), 3);
        assert_eq!(store.total_records(), 10);
    }

    #[test]
    fn test_unknown_memory_still_reads() {
        let blocks = vec![vec![access(0x10)], vec![access(0x20)]];
        let (store, stats) = run(&blocks, StaticMemory { healthy: false });
        let stats = stats.unwrap();

        assert_eq!(stats.unknown_budget, 2);
        assert_eq!(store.chunk_count(), 2);
    }

    #[test]
    fn test_end_of_trace_is_not_an_unknown_read() {
        let (store, stats) = run(&[], StaticMemory { healthy: false });
        let stats = stats.unwrap();

        assert_eq!(stats.blocks, 0);
        assert_eq!(stats.unknown_budget, 0);
        assert_eq!(store.chunk_count(), 0);
    }

    #[test]
    fn test_unbalanced_stack_fails_ingest() {
        let blocks = vec![vec![Record::FunctionExit { function_pointer: 9 }]];
        let (_, stats) = run(&blocks, StaticMemory { healthy: true });
        assert!(matches!(stats, Err(TraceError::Index(_))));
    }

    #[test]
    fn test_shutdown_releases_starved_reader() {
        let config = config();
        let bytes = trace_bytes(&[vec![access(0x10)]]);
        let (_, regions, source) = open_reader(Cursor::new(bytes), &config).unwrap();
        let store = Arc::new(TraceStore::new(Arc::new(regions)));
        let gate = MemoryBudgetGate::new(StarvedMemory, config.budget.clone());
        let handle = spawn_pipeline(source, Arc::clone(&store), gate, &config);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.chunk_count(), 0);
        handle.shutdown();

        let stats = handle.join().unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.blocks, 0);
        assert_eq!(store.chunk_count(), 0);
    }
}
