use crate::utils::config::{
    BudgetConfig, PageConfig, TraceConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HYDRATED_CHUNKS, DEFAULT_LOOKBACK_CHUNKS,
    DEFAULT_MIN_SPARE_MB, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_QUIET_THRESHOLD,
    DEFAULT_RELATIVE_MARGIN_PERCENT, DEFAULT_SAFETY_MARGIN_MB,
};
use clap::Args;
use std::path::PathBuf;

/// Ingestion options shared by every command that loads a trace
///
/// **Public** - flattened into each subcommand by main.rs
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TraceOptions {
    /// Page size in bytes used to bucket accesses
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u64,

    /// Number of preceding chunks whose active pages stay on the display axis
    #[arg(long = "lookback", default_value_t = DEFAULT_LOOKBACK_CHUNKS)]
    pub lookback: usize,

    /// Pages with fewer than peak/N accesses are quiet (0 disables)
    #[arg(long, default_value_t = DEFAULT_QUIET_THRESHOLD)]
    pub quiet_threshold: u64,

    /// Spare memory (MB) required before each block is read
    #[arg(long, default_value_t = DEFAULT_MIN_SPARE_MB, allow_negative_numbers = true)]
    pub min_spare_mb: i64,

    /// Absolute memory margin in MB
    #[arg(long, default_value_t = DEFAULT_SAFETY_MARGIN_MB)]
    pub safety_margin_mb: u64,

    /// Relative memory margin, percent of total memory
    #[arg(long = "relative-margin", default_value_t = DEFAULT_RELATIVE_MARGIN_PERCENT)]
    pub relative_margin: u64,

    /// Fail on malformed region lines instead of skipping them
    #[arg(long)]
    pub strict_regions: bool,

    /// Keep decoded records in memory after indexing
    #[arg(long)]
    pub retain_detail: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            lookback: DEFAULT_LOOKBACK_CHUNKS,
            quiet_threshold: DEFAULT_QUIET_THRESHOLD,
            min_spare_mb: DEFAULT_MIN_SPARE_MB,
            safety_margin_mb: DEFAULT_SAFETY_MARGIN_MB,
            relative_margin: DEFAULT_RELATIVE_MARGIN_PERCENT,
            strict_regions: false,
            retain_detail: false,
        }
    }
}

impl TraceOptions {
    /// Build the ingestion config these options describe
    pub fn to_config(&self) -> TraceConfig {
        TraceConfig {
            pages: PageConfig {
                page_size: self.page_size,
                quiet_threshold: self.quiet_threshold,
                lookback_chunks: self.lookback,
            },
            budget: BudgetConfig {
                min_spare_mb: self.min_spare_mb,
                safety_margin_mb: self.safety_margin_mb,
                relative_margin_percent: self.relative_margin,
                poll_interval: DEFAULT_POLL_INTERVAL,
            },
            strict_regions: self.strict_regions,
            retain_detail: self.retain_detail,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            hydrated_chunks: DEFAULT_HYDRATED_CHUNKS,
        }
    }
}

/// Arguments for the inspect command
#[derive(Debug, Clone)]
pub struct InspectArgs {
    pub trace: PathBuf,

    /// Output path for the JSON summary (optional)
    pub output: Option<PathBuf>,

    pub options: TraceOptions,
}

/// Arguments for the stack command
#[derive(Debug, Clone)]
pub struct StackArgs {
    pub trace: PathBuf,

    /// Global record position to inspect
    pub position: u64,

    pub options: TraceOptions,
}
