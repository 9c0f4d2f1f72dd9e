//! Memory budget gate.
//!
//! Before every block read the reader asks the gate for permission. The gate
//! polls the memory source at a fixed interval until enough memory is spare:
//!
//! ```text
//! spare = (free + reclaimable + idle heap) - (safety margin + relative margin * total)
//! ```
//!
//! A failed memory query counts as "unknown" and lets the read go ahead.

use super::source::{MemorySnapshot, MemorySource, BYTES_PER_MB};
use crate::utils::config::BudgetConfig;
use crate::utils::error::BudgetError;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// How a wait for memory ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetOutcome {
    /// Spare memory reached the requested minimum
    Satisfied { spare_mb: i64 },

    /// Memory statistics could not be read; proceeding anyway
    Unknown,

    /// The poll limit ran out before memory became available
    Exhausted { polls: usize },
}

/// Spare memory in MB for a snapshot under the given margins
///
/// **Public** - the single definition of "spare" used by the gate
pub fn spare_memory_mb(snapshot: &MemorySnapshot, config: &BudgetConfig) -> i64 {
    let available = snapshot.free_bytes as i128
        + snapshot.reclaimable_bytes as i128
        + snapshot.idle_heap_bytes as i128;
    let margin = config.safety_margin_mb as i128 * BYTES_PER_MB as i128
        + snapshot.total_bytes as i128 * config.relative_margin_percent as i128 / 100;

    ((available - margin) / BYTES_PER_MB as i128) as i64
}

/// Polling gate in front of every block read
pub struct MemoryBudgetGate<S> {
    source: S,
    config: BudgetConfig,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<S: MemorySource> MemoryBudgetGate<S> {
    pub fn new(source: S, config: BudgetConfig) -> Self {
        Self {
            source,
            config,
            shutdown: None,
        }
    }

    /// Abandon waits once `flag` is raised
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Current spare memory, `None` when the source cannot be read
    pub fn spare_memory(&mut self) -> Option<i64> {
        match self.source.snapshot() {
            Ok(snapshot) => Some(spare_memory_mb(&snapshot, &self.config)),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Block until at least `min_spare_mb` is spare
    ///
    /// **Public** - called once per block by the reader
    ///
    /// # Errors
    /// * `BudgetError::Cancelled` - shutdown was requested while waiting
    pub fn await_budget(&mut self, min_spare_mb: i64) -> Result<BudgetOutcome, BudgetError> {
        self.await_budget_bounded(min_spare_mb, None)
    }

    /// Like [`await_budget`](Self::await_budget), giving up after `max_polls`
    pub fn await_budget_bounded(
        &mut self,
        min_spare_mb: i64,
        max_polls: Option<usize>,
    ) -> Result<BudgetOutcome, BudgetError> {
        let mut polls = 0usize;

        loop {
            if self.is_cancelled() {
                return Err(BudgetError::Cancelled);
            }
            if max_polls.is_some_and(|max| polls >= max) {
                return Ok(BudgetOutcome::Exhausted { polls });
            }

            polls += 1;
            match self.spare_memory() {
                None => {
                    warn!("Spare memory unknown, reading next block anyway");
                    return Ok(BudgetOutcome::Unknown);
                }
                Some(spare_mb) if spare_mb >= min_spare_mb => {
                    if polls > 1 {
                        debug!("Memory budget met after {} polls ({} MB spare)", polls, spare_mb);
                    }
                    return Ok(BudgetOutcome::Satisfied { spare_mb });
                }
                Some(spare_mb) => {
                    if polls == 1 {
                        debug!(
                            "Stalling ingestion: {} MB spare, {} MB required",
                            spare_mb, min_spare_mb
                        );
                    }
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize};
    use std::sync::mpsc;
    use std::time::Duration;

    const MB: u64 = BYTES_PER_MB;

    /// Scripted memory source shared with the test body
    #[derive(Clone)]
    struct FakeMemory {
        free: Arc<AtomicU64>,
        polls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl FakeMemory {
        fn with_free_mb(free_mb: u64) -> Self {
            Self {
                free: Arc::new(AtomicU64::new(free_mb * MB)),
                polls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }
    }

    impl MemorySource for FakeMemory {
        fn snapshot(&mut self) -> Result<MemorySnapshot, BudgetError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BudgetError::MemoryQuery("sysinfo unavailable".to_string()));
            }
            Ok(MemorySnapshot {
                total_bytes: 1000 * MB,
                free_bytes: self.free.load(Ordering::SeqCst),
                reclaimable_bytes: 0,
                idle_heap_bytes: 0,
            })
        }
    }

    fn config() -> BudgetConfig {
        BudgetConfig {
            min_spare_mb: 100,
            safety_margin_mb: 50,
            relative_margin_percent: 10,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_spare_memory_formula() {
        let snapshot = MemorySnapshot {
            total_bytes: 1000 * MB,
            free_bytes: 300 * MB,
            reclaimable_bytes: 200 * MB,
            idle_heap_bytes: 10 * MB,
        };
        // 510 - (50 + 100)
        assert_eq!(spare_memory_mb(&snapshot, &config()), 360);
    }

    #[test]
    fn test_spare_memory_can_be_negative() {
        let snapshot = MemorySnapshot {
            total_bytes: 1000 * MB,
            free_bytes: 20 * MB,
            ..Default::default()
        };
        assert_eq!(spare_memory_mb(&snapshot, &config()), -130);
    }

    #[test]
    fn test_returns_immediately_when_memory_available() {
        let fake = FakeMemory::with_free_mb(900);
        let mut gate = MemoryBudgetGate::new(fake.clone(), config());

        assert_eq!(gate.await_budget(100).unwrap(), BudgetOutcome::Satisfied { spare_mb: 750 });
        assert_eq!(fake.polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backpressure_holds_then_override_releases() {
        let fake = FakeMemory::with_free_mb(120);
        let mut gate = MemoryBudgetGate::new(fake.clone(), config());

        // 120 - 150 = -30 MB spare: must not pass within the poll bound
        let outcome = gate.await_budget_bounded(100, Some(5)).unwrap();
        assert_eq!(outcome, BudgetOutcome::Exhausted { polls: 5 });
        assert_eq!(fake.polls.load(Ordering::SeqCst), 5);

        fake.free.store(400 * MB, Ordering::SeqCst);
        assert_eq!(
            gate.await_budget_bounded(100, Some(5)).unwrap(),
            BudgetOutcome::Satisfied { spare_mb: 250 }
        );
    }

    #[test]
    fn test_unbounded_wait_blocks_until_memory_frees() {
        let fake = FakeMemory::with_free_mb(0);
        let mut gate = MemoryBudgetGate::new(fake.clone(), config());
        let (tx, rx) = mpsc::channel();

        let waiter = thread::spawn(move || {
            let outcome = gate.await_budget(100);
            tx.send(()).unwrap();
            outcome
        });

        // Still blocked after many polls
        while fake.polls.load(Ordering::SeqCst) < 20 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(rx.try_recv().is_err());

        fake.free.store(1000 * MB, Ordering::SeqCst);
        let outcome = waiter.join().unwrap().unwrap();
        assert!(matches!(outcome, BudgetOutcome::Satisfied { .. }));
    }

    #[test]
    fn test_shutdown_cancels_wait() {
        let fake = FakeMemory::with_free_mb(0);
        let flag = Arc::new(AtomicBool::new(false));
        let mut gate = MemoryBudgetGate::new(fake.clone(), config()).with_shutdown(flag.clone());

        let waiter = thread::spawn(move || gate.await_budget(100));
        while fake.polls.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        flag.store(true, Ordering::SeqCst);

        assert!(matches!(waiter.join().unwrap(), Err(BudgetError::Cancelled)));
    }

    #[test]
    fn test_failed_query_proceeds_as_unknown() {
        let mut fake = FakeMemory::with_free_mb(0);
        fake.fail = true;
        let mut gate = MemoryBudgetGate::new(fake, config());

        assert_eq!(gate.await_budget(100).unwrap(), BudgetOutcome::Unknown);
        assert_eq!(gate.spare_memory(), None);
    }
}
