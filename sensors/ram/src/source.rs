//! Raw host memory counters and the trait that supplies them.

use sketchysensor_core::SensorError;

/// Virtual-memory page counters for one sampling tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStatistics {
    /// Pages in active use
    pub active_pages: u64,
    /// Pages that cannot be paged out
    pub wired_pages: u64,
    /// Pages held by the memory compressor
    pub compressed_pages: u64,
    /// Size of one page in bytes
    pub page_size: u64,
}

impl VmStatistics {
    /// Bytes considered in use: `(active + wired + compressed) * page_size`.
    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.active_pages
            .saturating_add(self.wired_pages)
            .saturating_add(self.compressed_pages)
            .saturating_mul(self.page_size)
    }
}

/// Swap usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Handle to the host's memory-statistics interface.
///
/// Each query is independent; implementations do not retry.
pub trait MemorySource {
    /// Total physical memory in bytes. Queried once, at reader construction.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not report its memory size.
    fn total_memory(&self) -> Result<u64, SensorError>;

    /// Current virtual-memory page counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the statistics query fails.
    fn vm_statistics(&mut self) -> Result<VmStatistics, SensorError>;

    /// Current swap usage.
    ///
    /// # Errors
    ///
    /// Returns an error if the swap query fails.
    fn swap_usage(&mut self) -> Result<SwapUsage, SensorError>;

    /// Check that the backend can be used on this system.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the backend is unusable.
    fn check_availability(&self) -> Result<(), SensorError> {
        Ok(())
    }
}

/// Size of a virtual-memory page on this system, in bytes.
#[cfg(unix)]
#[must_use]
pub fn system_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(size).ok().filter(|&s| s > 0).unwrap_or(4096)
}

#[cfg(not(unix))]
#[must_use]
pub fn system_page_size() -> u64 {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_bytes() {
        let stats = VmStatistics {
            active_pages: 100,
            wired_pages: 50,
            compressed_pages: 10,
            page_size: 16384,
        };
        assert_eq!(stats.used_bytes(), 160 * 16384);
    }

    #[test]
    fn test_used_bytes_saturates() {
        let stats = VmStatistics {
            active_pages: u64::MAX,
            wired_pages: 1,
            compressed_pages: 1,
            page_size: 4096,
        };
        assert_eq!(stats.used_bytes(), u64::MAX);
    }

    #[test]
    fn test_system_page_size_is_power_of_two() {
        let size = system_page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }
}
