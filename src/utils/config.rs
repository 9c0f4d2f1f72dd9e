//! Configuration and constants for trace ingestion.
//!
//! Everything tunable lives in [`TraceConfig`], which is built once (usually
//! from CLI flags) and handed by reference to the reader, the budget gate and
//! the chunk processor.

use crate::utils::error::TraceError;
use std::time::Duration;

/// Magic literal at the start of every trace file
pub const TRACE_MAGIC: &[u8; 8] = b"MEMACCES";

/// Serialized width of one record: 8-byte tag + 48-byte payload
pub const RECORD_WIDTH: usize = 56;

/// Width of the payload union (largest variant is a memory access)
pub const RECORD_PAYLOAD_WIDTH: usize = RECORD_WIDTH - 8;

pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// 0 keeps every touched page active
pub const DEFAULT_QUIET_THRESHOLD: u64 = 0;

pub const DEFAULT_LOOKBACK_CHUNKS: usize = 0;

// Memory budget defaults, in MB unless noted
pub const DEFAULT_MIN_SPARE_MB: i64 = 500;
pub const DEFAULT_SAFETY_MARGIN_MB: u64 = 100;
pub const DEFAULT_RELATIVE_MARGIN_PERCENT: u64 = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Decoded batches allowed in flight between reader and processor
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Re-read chunks kept in memory before the oldest is dropped again
pub const DEFAULT_HYDRATED_CHUNKS: usize = 4;

/// Upper bound on the LZ4 block expansion ratio
pub const MAX_LZ4_EXPANSION: usize = 255;

/// Current summary output schema version
pub const SUMMARY_SCHEMA_VERSION: &str = "1.0.0";

/// Page classification and coordinate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    /// Bytes per page used for bucketing addresses
    pub page_size: u64,

    /// Pages with `count < peak / quiet_threshold` are quiet; 0 disables
    pub quiet_threshold: u64,

    /// Number of preceding chunks whose active pages widen the display set
    pub lookback_chunks: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            quiet_threshold: DEFAULT_QUIET_THRESHOLD,
            lookback_chunks: DEFAULT_LOOKBACK_CHUNKS,
        }
    }
}

/// Memory budget settings for the ingestion gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetConfig {
    /// Spare memory required before each block read
    pub min_spare_mb: i64,

    /// Absolute amount of memory never counted as spare
    pub safety_margin_mb: u64,

    /// Percentage of total memory never counted as spare
    pub relative_margin_percent: u64,

    /// Delay between two polls of the host memory statistics
    pub poll_interval: Duration,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            min_spare_mb: DEFAULT_MIN_SPARE_MB,
            safety_margin_mb: DEFAULT_SAFETY_MARGIN_MB,
            relative_margin_percent: DEFAULT_RELATIVE_MARGIN_PERCENT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Immutable configuration threaded through the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    pub pages: PageConfig,
    pub budget: BudgetConfig,

    /// Abort on a malformed region line instead of skipping it
    pub strict_regions: bool,

    /// Keep decoded records in memory after a chunk is indexed
    pub retain_detail: bool,

    /// Bounded channel capacity between reader and processor
    pub channel_capacity: usize,

    /// Chunks whose dropped detail may stay re-read at the same time
    pub hydrated_chunks: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            pages: PageConfig::default(),
            budget: BudgetConfig::default(),
            strict_regions: false,
            retain_detail: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            hydrated_chunks: DEFAULT_HYDRATED_CHUNKS,
        }
    }
}

impl TraceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.pages.page_size = page_size;
        self
    }

    pub fn with_quiet_threshold(mut self, threshold: u64) -> Self {
        self.pages.quiet_threshold = threshold;
        self
    }

    pub fn with_lookback(mut self, chunks: usize) -> Self {
        self.pages.lookback_chunks = chunks;
        self
    }

    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_strict_regions(mut self, strict: bool) -> Self {
        self.strict_regions = strict;
        self
    }

    pub fn with_retain_detail(mut self, retain: bool) -> Self {
        self.retain_detail = retain;
        self
    }

    pub fn with_hydrated_chunks(mut self, chunks: usize) -> Self {
        self.hydrated_chunks = chunks;
        self
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.pages.page_size == 0 {
            return Err(TraceError::InvalidConfig(
                "page size must be greater than 0".to_string(),
            ));
        }
        if self.budget.relative_margin_percent > 100 {
            return Err(TraceError::InvalidConfig(format!(
                "relative margin {}% exceeds 100%",
                self.budget.relative_margin_percent
            )));
        }
        if self.channel_capacity == 0 {
            return Err(TraceError::InvalidConfig(
                "channel capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
