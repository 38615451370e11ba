//! `/proc/meminfo` backend for Linux hosts.
//!
//! Linux has no active/wired/compressed page split like the Mach VM, so the
//! closest counters stand in: `Active` for active pages, `Unevictable` for
//! wired pages and `Zswap` (the compressed pool, absent on older kernels) for
//! compressed pages.

use crate::source::{system_page_size, MemorySource, SwapUsage, VmStatistics};
use sketchysensor_core::SensorError;
use std::fs;
use std::path::{Path, PathBuf};

/// Memory source reading `/proc/meminfo`.
#[derive(Debug, Clone)]
pub struct ProcMemorySource {
    path: PathBuf,
    page_size: u64,
}

/// Fields of interest from `/proc/meminfo`, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub mem_total: u64,
    pub active: u64,
    pub unevictable: u64,
    pub zswap: u64,
    pub swap_total: Option<u64>,
    pub swap_free: Option<u64>,
}

impl MemInfo {
    /// Parse memory information from meminfo content.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Parse`] if a value is not numeric or `MemTotal`
    /// is missing.
    pub fn parse(content: &str) -> Result<Self, SensorError> {
        let mut info = Self::default();
        let mut saw_total = false;

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }

            let key = parts[0].trim_end_matches(':');
            let value = parts[1].parse::<u64>().map_err(|e| {
                SensorError::parse_with_source(format!("Failed to parse {key} value"), e)
            })?;

            // meminfo values are in kB
            let value_bytes = value.saturating_mul(1024);

            match key {
                "MemTotal" => {
                    info.mem_total = value_bytes;
                    saw_total = true;
                }
                "Active" => info.active = value_bytes,
                "Unevictable" => info.unevictable = value_bytes,
                "Zswap" => info.zswap = value_bytes,
                "SwapTotal" => info.swap_total = Some(value_bytes),
                "SwapFree" => info.swap_free = Some(value_bytes),
                _ => {}
            }
        }

        if !saw_total {
            return Err(SensorError::parse("MemTotal missing from meminfo"));
        }
        Ok(info)
    }
}

impl ProcMemorySource {
    /// Path to the proc meminfo file.
    pub const PROC_MEMINFO_PATH: &'static str = "/proc/meminfo";

    /// Read from the system's `/proc/meminfo`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(Self::PROC_MEMINFO_PATH)
    }

    /// Read from another meminfo-formatted file.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_size: system_page_size(),
        }
    }

    /// Override the page size used to express byte counts as pages.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// File this source reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_info(&self) -> Result<MemInfo, SensorError> {
        let content = fs::read_to_string(&self.path)?;
        MemInfo::parse(&content)
    }
}

impl Default for ProcMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for ProcMemorySource {
    fn total_memory(&self) -> Result<u64, SensorError> {
        Ok(self.read_info()?.mem_total)
    }

    fn vm_statistics(&mut self) -> Result<VmStatistics, SensorError> {
        let info = self.read_info()?;
        Ok(VmStatistics {
            active_pages: info.active / self.page_size,
            wired_pages: info.unevictable / self.page_size,
            compressed_pages: info.zswap / self.page_size,
            page_size: self.page_size,
        })
    }

    fn swap_usage(&mut self) -> Result<SwapUsage, SensorError> {
        let info = self.read_info()?;
        match (info.swap_total, info.swap_free) {
            (Some(total), Some(free)) => Ok(SwapUsage {
                used_bytes: total.saturating_sub(free),
                total_bytes: total,
            }),
            _ => Err(SensorError::parse("SwapTotal/SwapFree missing from meminfo")),
        }
    }

    fn check_availability(&self) -> Result<(), SensorError> {
        if !self.path.exists() {
            return Err(SensorError::unavailable(format!(
                "{} does not exist (not a Linux system?)",
                self.path.display()
            )));
        }

        self.read_info().map_err(|e| match e {
            SensorError::Io(io_err) if io_err.kind() == std::io::ErrorKind::PermissionDenied => {
                SensorError::unavailable(format!("permission denied reading {}", self.path.display()))
            }
            other => other,
        })?;

        Ok(())
    }
}
