//! Host memory statistics.
//!
//! The gate only needs a [`MemorySnapshot`]; where it comes from is behind
//! the [`MemorySource`] trait so tests can script memory pressure.

use crate::utils::error::BudgetError;
use sysinfo::System;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Point-in-time memory figures, all in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub free_bytes: u64,

    /// Page cache and buffers the kernel can drop on demand
    pub reclaimable_bytes: u64,

    /// Memory the allocator holds but is not using, when known
    pub idle_heap_bytes: u64,
}

/// Anything that can report host memory state
pub trait MemorySource {
    fn snapshot(&mut self) -> Result<MemorySnapshot, BudgetError>;
}

/// Host memory via `sysinfo`
pub struct SystemMemory {
    system: System,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self { system: System::new() }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for SystemMemory {
    fn snapshot(&mut self) -> Result<MemorySnapshot, BudgetError> {
        self.system.refresh_memory();

        let total_bytes = self.system.total_memory();
        if total_bytes == 0 {
            return Err(BudgetError::MemoryQuery(
                "host reported zero total memory".to_string(),
            ));
        }

        let free_bytes = self.system.free_memory();
        // "available" already includes free memory plus reclaimable cache
        let reclaimable_bytes = self.system.available_memory().saturating_sub(free_bytes);

        Ok(MemorySnapshot {
            total_bytes,
            free_bytes,
            reclaimable_bytes,
            idle_heap_bytes: 0,
        })
    }
}
