//! RAM and swap metrics for the sketchysensor RAM provider.
//!
//! [`MemoryReader`] turns the raw counters of a [`MemorySource`] into a
//! [`MemorySnapshot`]. The reader keeps the physical memory size captured at
//! construction and the last snapshot it produced; a failed query falls back
//! to that snapshot instead of reporting zeros.

use crate::source::MemorySource;
use serde::Serialize;
use sketchysensor_core::{format, SensorError};

/// One complete set of derived memory metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    /// Share of physical memory in use, `0..=100`
    pub used_percent: u8,
    /// Swap in use, whole megabytes
    pub swap_used_mb: u64,
    /// Swap capacity, whole megabytes
    pub swap_total_mb: u64,
    /// Placeholder pressure metric, always equal to `used_percent`
    pub pressure: u8,
}

/// Percentage of `total_bytes` taken by `used_bytes`, rounded and clamped to
/// `0..=100`.
///
/// Used memory can exceed the physical total when compressed pages are
/// counted, hence the clamp. A zero total yields 0.
///
/// # Examples
///
/// ```rust
/// use sketchysensor_ram::used_percent;
///
/// assert_eq!(used_percent(512, 1024), 50);
/// assert_eq!(used_percent(4096, 1024), 100);
/// assert_eq!(used_percent(512, 0), 0);
/// ```
#[must_use]
pub fn used_percent(used_bytes: u64, total_bytes: u64) -> u8 {
    format::clamped_percent(used_bytes, total_bytes)
}

/// Samples a [`MemorySource`] into [`MemorySnapshot`]s.
///
/// # Examples
///
/// ```rust,no_run
/// use sketchysensor_ram::{HostMemorySource, MemoryReader};
///
/// let mut reader = MemoryReader::new(HostMemorySource::new());
/// let snapshot = reader.sample();
/// println!("RAM: {}%", snapshot.used_percent);
/// ```
#[derive(Debug)]
pub struct MemoryReader<S> {
    source: S,
    total_bytes: u64,
    snapshot: MemorySnapshot,
}

impl<S: MemorySource> MemoryReader<S> {
    /// Create a reader, capturing total physical memory once.
    ///
    /// If the host does not report its memory size the reader continues with
    /// a total of zero, and every percentage reads 0.
    pub fn new(source: S) -> Self {
        let total_bytes = source.total_memory().unwrap_or_else(|e| {
            tracing::warn!("could not read total physical memory: {e}");
            0
        });

        Self {
            source,
            total_bytes,
            snapshot: MemorySnapshot::default(),
        }
    }

    /// Physical memory size captured at construction.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MemorySnapshot {
        self.snapshot
    }

    /// Check that the underlying source works on this system.
    ///
    /// # Errors
    ///
    /// Propagates the source's availability error.
    pub fn check_availability(&self) -> Result<(), SensorError> {
        self.source.check_availability()
    }

    /// Take a fresh snapshot.
    ///
    /// If the VM statistics query fails a diagnostic is logged and the
    /// previous snapshot is returned unchanged. If only the swap query fails
    /// the swap fields keep their previous values.
    pub fn sample(&mut self) -> MemorySnapshot {
        let stats = match self.source.vm_statistics() {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("could not read vm host statistics: {e}");
                return self.snapshot;
            }
        };

        let used_percent = used_percent(stats.used_bytes(), self.total_bytes);
        self.snapshot.used_percent = used_percent;

        match self.source.swap_usage() {
            Ok(swap) => {
                self.snapshot.swap_used_mb = format::whole_megabytes(swap.used_bytes);
                self.snapshot.swap_total_mb = format::whole_megabytes(swap.total_bytes);
            }
            Err(e) => tracing::debug!("swap usage unavailable, keeping previous values: {e}"),
        }

        // pressure mirrors the used percentage
        self.snapshot.pressure = used_percent;

        self.snapshot
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::{SwapUsage, VmStatistics};
    use std::collections::VecDeque;

    pub(crate) const MB: u64 = 1024 * 1024;

    /// Source that replays scripted query results and then repeats the last one.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedSource {
        pub(crate) total: Option<u64>,
        pub(crate) vm: VecDeque<Option<VmStatistics>>,
        pub(crate) swap: VecDeque<Option<SwapUsage>>,
    }

    impl ScriptedSource {
        pub(crate) fn steady(total: u64, used_pages: u64, swap: SwapUsage) -> Self {
            Self {
                total: Some(total),
                vm: VecDeque::from([Some(pages(used_pages))]),
                swap: VecDeque::from([Some(swap)]),
            }
        }
    }

    fn next<T: Copy>(queue: &mut VecDeque<Option<T>>) -> Result<T, SensorError> {
        let item = if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().copied().flatten()
        };
        item.ok_or_else(|| SensorError::temporarily_unavailable("scripted failure"))
    }

    impl MemorySource for ScriptedSource {
        fn total_memory(&self) -> Result<u64, SensorError> {
            self.total
                .ok_or_else(|| SensorError::unavailable("no memory size"))
        }

        fn vm_statistics(&mut self) -> Result<VmStatistics, SensorError> {
            next(&mut self.vm)
        }

        fn swap_usage(&mut self) -> Result<SwapUsage, SensorError> {
            next(&mut self.swap)
        }
    }

    /// Statistics with everything in active pages of 1 KiB.
    pub(crate) fn pages(active_pages: u64) -> VmStatistics {
        VmStatistics {
            active_pages,
            wired_pages: 0,
            compressed_pages: 0,
            page_size: 1024,
        }
    }

    fn swap(used_mb: u64, total_mb: u64) -> SwapUsage {
        SwapUsage {
            used_bytes: used_mb * MB,
            total_bytes: total_mb * MB,
        }
    }

    #[test]
    fn test_used_percent_formula() {
        assert_eq!(used_percent(0, 1000), 0);
        assert_eq!(used_percent(70, 1000), 7);
        assert_eq!(used_percent(425, 1000), 43);
        assert_eq!(used_percent(1000, 1000), 100);
        assert_eq!(used_percent(1500, 1000), 100);
        assert_eq!(used_percent(1, 0), 0);
        assert_eq!(used_percent(0, 0), 0);
    }

    #[test]
    fn test_sample_combines_page_kinds() {
        let source = ScriptedSource {
            total: Some(1000 * 1024),
            vm: VecDeque::from([Some(VmStatistics {
                active_pages: 300,
                wired_pages: 100,
                compressed_pages: 20,
                page_size: 1024,
            })]),
            swap: VecDeque::from([Some(swap(512, 2048))]),
        };
        let mut reader = MemoryReader::new(source);

        let snapshot = reader.sample();
        assert_eq!(snapshot.used_percent, 42);
        assert_eq!(snapshot.swap_used_mb, 512);
        assert_eq!(snapshot.swap_total_mb, 2048);
        assert_eq!(snapshot.pressure, 42);
        assert_eq!(reader.snapshot(), snapshot);
    }

    #[test]
    fn test_used_percent_is_clamped_when_compressed_pages_overflow() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: VecDeque::from([Some(VmStatistics {
                active_pages: 80,
                wired_pages: 30,
                compressed_pages: 40,
                page_size: 1024,
            })]),
            swap: VecDeque::from([Some(SwapUsage::default())]),
        };
        let snapshot = MemoryReader::new(source).sample();
        assert_eq!(snapshot.used_percent, 100);
        assert_eq!(snapshot.pressure, 100);
    }

    #[test]
    fn test_missing_total_reads_zero_percent() {
        let source = ScriptedSource {
            total: None,
            ..ScriptedSource::steady(0, 500, swap(1, 2))
        };
        let mut reader = MemoryReader::new(source);

        assert_eq!(reader.total_bytes(), 0);
        let snapshot = reader.sample();
        assert_eq!(snapshot.used_percent, 0);
        assert_eq!(snapshot.pressure, 0);
        assert_eq!(snapshot.swap_used_mb, 1);
    }

    #[test]
    fn test_swap_failure_keeps_previous_values() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: VecDeque::from([Some(pages(10)), Some(pages(20)), Some(pages(30))]),
            swap: VecDeque::from([Some(swap(256, 1024)), None, None]),
        };
        let mut reader = MemoryReader::new(source);

        let first = reader.sample();
        assert_eq!((first.swap_used_mb, first.swap_total_mb), (256, 1024));

        let second = reader.sample();
        assert_eq!(second.used_percent, 20);
        assert_eq!((second.swap_used_mb, second.swap_total_mb), (256, 1024));

        let third = reader.sample();
        assert_eq!(third.used_percent, 30);
        assert_eq!((third.swap_used_mb, third.swap_total_mb), (256, 1024));
    }

    #[test]
    fn test_swap_failure_before_any_success_reads_zero() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: VecDeque::from([Some(pages(50))]),
            swap: VecDeque::from([None]),
        };
        let snapshot = MemoryReader::new(source).sample();
        assert_eq!(snapshot.used_percent, 50);
        assert_eq!((snapshot.swap_used_mb, snapshot.swap_total_mb), (0, 0));
    }

    #[test]
    fn test_vm_failure_returns_previous_snapshot_unchanged() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: VecDeque::from([Some(pages(40)), None, Some(pages(60))]),
            swap: VecDeque::from([Some(swap(100, 200)), Some(swap(150, 200))]),
        };
        let mut reader = MemoryReader::new(source);

        let first = reader.sample();
        let second = reader.sample();
        assert_eq!(second, first);

        let third = reader.sample();
        assert_eq!(third.used_percent, 60);
        assert_eq!(third.swap_used_mb, 150);
    }

    #[test]
    fn test_vm_failure_on_first_tick_reads_defaults() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: VecDeque::from([None]),
            swap: VecDeque::from([Some(swap(100, 200))]),
        };
        let snapshot = MemoryReader::new(source).sample();
        assert_eq!(snapshot, MemorySnapshot::default());
    }

    #[test]
    fn test_pressure_tracks_used_percent() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: (0..=100).map(|p| Some(pages(p))).collect(),
            swap: VecDeque::from([Some(SwapUsage::default())]),
        };
        let mut reader = MemoryReader::new(source);
        for _ in 0..=100 {
            let snapshot = reader.sample();
            assert_eq!(snapshot.pressure, snapshot.used_percent);
        }
    }

    /// Writer handing every subscriber the same in-memory buffer.
    #[derive(Clone, Default)]
    struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Sample `source` `ticks` times with the default `warn` filter and
    /// return what reached the log.
    fn logged_lines(source: ScriptedSource, ticks: usize) -> Vec<String> {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut reader = MemoryReader::new(source);
            for _ in 0..ticks {
                reader.sample();
            }
        });

        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_vm_failure_logs_one_error_line() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: VecDeque::from([Some(pages(40)), None, Some(pages(60))]),
            swap: VecDeque::from([Some(swap(100, 200))]),
        };
        let lines = logged_lines(source, 3);

        assert_eq!(lines.len(), 1, "log was {lines:?}");
        assert!(lines[0].contains("ERROR"));
        assert!(lines[0].contains("could not read vm host statistics"));
    }

    #[test]
    fn test_swap_failure_is_silent_at_default_level() {
        let source = ScriptedSource {
            total: Some(100 * 1024),
            vm: VecDeque::from([Some(pages(40))]),
            swap: VecDeque::from([Some(swap(100, 200)), None]),
        };
        let lines = logged_lines(source, 3);
        assert!(lines.is_empty(), "log was {lines:?}");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = MemorySnapshot {
            used_percent: 7,
            swap_used_mb: 512,
            swap_total_mb: 2048,
            pressure: 7,
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["used_percent"], 7);
        assert_eq!(json["swap_total_mb"], 2048);
    }
}
