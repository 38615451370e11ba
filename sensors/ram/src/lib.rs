//! RAM event provider for sketchysensor.
//!
//! This crate samples physical memory and swap usage and reports them to
//! SketchyBar as a custom event. On macOS the counters come from the Mach
//! host statistics; on Linux they are read from `/proc/meminfo`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use sketchysensor_core::{CliDispatcher, ProviderConfig};
//! use sketchysensor_ram::{HostMemorySource, MemoryReader, Reporter};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), sketchysensor_core::SensorError> {
//! let config = ProviderConfig::new("ram_update", Duration::from_secs(2))?;
//! let reader = MemoryReader::new(HostMemorySource::new());
//! let dispatcher = CliDispatcher::from_config(&config);
//!
//! // Registers `ram_update`, then triggers it every two seconds.
//! match Reporter::new(config, reader, dispatcher).run().await {}
//! # }
//! ```

#[cfg(target_os = "macos")]
pub mod mach;
pub mod meminfo;
pub mod ram;
pub mod reporter;
pub mod source;

#[cfg(target_os = "macos")]
pub use mach::MachMemorySource;
pub use meminfo::ProcMemorySource;
pub use ram::{used_percent, MemoryReader, MemorySnapshot};
pub use reporter::{trigger_command, Reporter};
pub use source::{MemorySource, SwapUsage, VmStatistics};

/// The memory backend for the platform being built.
#[cfg(target_os = "macos")]
pub type HostMemorySource = MachMemorySource;

/// The memory backend for the platform being built.
#[cfg(not(target_os = "macos"))]
pub type HostMemorySource = ProcMemorySource;
