//! Mach host statistics backend for macOS.

use crate::source::{system_page_size, MemorySource, SwapUsage, VmStatistics};
use sketchysensor_core::SensorError;
use std::ffi::{c_int, CStr};
use std::io;
use std::mem::{self, MaybeUninit};
use std::ptr;

/// Memory source backed by `host_statistics64` and `sysctl`.
///
/// The host port is acquired once and reused for every query.
#[derive(Debug)]
pub struct MachMemorySource {
    host: libc::mach_port_t,
    page_size: u64,
}

impl MachMemorySource {
    /// Acquire the host port for the current task.
    #[must_use]
    pub fn new() -> Self {
        // SAFETY: mach_host_self has no preconditions and returns a send right
        // to the host port of the current task.
        #[allow(deprecated)]
        let host = unsafe { libc::mach_host_self() };
        Self {
            host,
            page_size: system_page_size(),
        }
    }
}

impl Default for MachMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a fixed-size value with `sysctlbyname`.
fn sysctl_value<T: Copy>(name: &CStr) -> Result<T, SensorError> {
    let mut value = MaybeUninit::<T>::zeroed();
    let mut len = mem::size_of::<T>();

    // SAFETY: `value` provides `len` writable bytes and `name` is
    // NUL-terminated; no new value is written.
    let rc = unsafe {
        libc::sysctlbyname(
            name.as_ptr(),
            value.as_mut_ptr().cast(),
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error().into());
    }
    if len != mem::size_of::<T>() {
        return Err(SensorError::parse(format!(
            "sysctl {} returned {len} bytes, expected {}",
            name.to_string_lossy(),
            mem::size_of::<T>()
        )));
    }

    // SAFETY: the kernel filled all `size_of::<T>()` bytes and T is plain data.
    Ok(unsafe { value.assume_init() })
}

impl MemorySource for MachMemorySource {
    fn total_memory(&self) -> Result<u64, SensorError> {
        sysctl_value::<u64>(c"hw.memsize")
    }

    fn vm_statistics(&mut self) -> Result<VmStatistics, SensorError> {
        let mut stats = MaybeUninit::<libc::vm_statistics64>::zeroed();
        let mut count = (mem::size_of::<libc::vm_statistics64>() / mem::size_of::<c_int>())
            as libc::mach_msg_type_number_t;

        // SAFETY: `stats` is large enough for `count` integers of
        // HOST_VM_INFO64 data.
        let kr = unsafe {
            libc::host_statistics64(
                self.host,
                libc::HOST_VM_INFO64,
                stats.as_mut_ptr().cast(),
                &mut count,
            )
        };
        if kr != libc::KERN_SUCCESS {
            return Err(SensorError::temporarily_unavailable(format!(
                "host_statistics64 failed with kern_return_t {kr}"
            )));
        }

        // SAFETY: the call succeeded, so the structure has been filled in.
        let stats = unsafe { stats.assume_init() };
        Ok(VmStatistics {
            active_pages: u64::from(stats.active_count),
            wired_pages: u64::from(stats.wire_count),
            compressed_pages: u64::from(stats.compressor_page_count),
            page_size: self.page_size,
        })
    }

    fn swap_usage(&mut self) -> Result<SwapUsage, SensorError> {
        let swap = sysctl_value::<libc::xsw_usage>(c"vm.swapusage")?;
        Ok(SwapUsage {
            used_bytes: swap.xsu_used,
            total_bytes: swap.xsu_total,
        })
    }

    fn check_availability(&self) -> Result<(), SensorError> {
        match self.total_memory() {
            Ok(0) => Err(SensorError::unavailable("hw.memsize reported zero bytes")),
            Ok(_) => Ok(()),
            Err(e) => Err(SensorError::unavailable(format!("hw.memsize unreadable: {e}"))),
        }
    }
}
