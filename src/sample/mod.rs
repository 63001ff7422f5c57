use std::fs::File;
use std::io::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arena::Arena;
use iter::{CowIter, Iter};
use rb::Rb;
use record::{Parser, UnsafeParser};

use crate::count::Counter;
use crate::ffi::syscall::ioctl_arg;
use crate::ffi::{bindings as b, page_size, Metadata};

mod arena;
pub mod iter;
pub mod rb;
pub mod record;

/// Owns the mmap'd ring buffer backing one counter's overflow samples.
///
/// Grounded on the upstream crate's own `Sampler`: a counter's perf fd is
/// mmap'd once (control page plus `2^exp` data pages) and read lock-free via
/// the kernel's `data_head`/`data_tail` protocol (`sample::rb`).
pub struct Sampler {
    perf: Arc<File>,
    arena: Arena,
    parser: Parser,
}

impl Sampler {
    pub(super) fn new(perf: Arc<File>, attr: &crate::ffi::Attr, exp: u8) -> Result<Self> {
        let len = (1 + 2_usize.pow(exp as _)) * page_size();
        let arena = Arena::new(&perf, len, 0)?;
        let parser = Parser(UnsafeParser::from_attr(attr));

        Ok(Sampler {
            perf,
            arena,
            parser,
        })
    }

    pub fn iter(&self) -> Iter<'_> {
        let alloc = self.arena.as_slice();
        let metadata = unsafe { &mut *(alloc.as_ptr() as *mut Metadata) };
        let rb = Rb::new(
            // https://github.com/torvalds/linux/blob/v6.13/kernel/events/core.c#L6212
            &alloc[page_size()..],
            unsafe { AtomicU64::from_ptr(&mut metadata.data_tail as _) },
            unsafe { AtomicU64::from_ptr(&mut metadata.data_head as _) },
        );
        Iter(CowIter {
            rb,
            perf: &self.perf,
            parser: &self.parser,
        })
    }

    pub fn parser(&self) -> &UnsafeParser {
        &self.parser.0
    }

    pub fn pause(&self) -> Result<()> {
        ioctl_arg(&self.perf, b::PERF_EVENT_IOC_PAUSE_OUTPUT, 1)?;
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        ioctl_arg(&self.perf, b::PERF_EVENT_IOC_PAUSE_OUTPUT, 0)?;
        Ok(())
    }

    pub fn enable_counter_with(&self, max_samples: u32) -> Result<()> {
        ioctl_arg(&self.perf, b::PERF_EVENT_IOC_REFRESH, max_samples as _)?;
        Ok(())
    }

    pub fn sample_on(&self, freq_or_count: u64) -> Result<()> {
        ioctl_arg(&self.perf, b::PERF_EVENT_IOC_PERIOD, freq_or_count)?;
        Ok(())
    }

    fn metadata_inner(&self) -> *mut Metadata {
        self.arena.as_slice().as_ptr() as *mut Metadata
    }

    pub fn counter_time_enabled(&self) -> u64 {
        let metadata = unsafe { &mut *self.metadata_inner() };
        let time_enabled = unsafe { AtomicU64::from_ptr(&mut metadata.time_enabled as _) };
        time_enabled.load(Ordering::Relaxed)
    }

    pub fn counter_time_running(&self) -> u64 {
        let metadata = unsafe { &mut *self.metadata_inner() };
        let time_running = unsafe { AtomicU64::from_ptr(&mut metadata.time_running as _) };
        time_running.load(Ordering::Relaxed)
    }
}

// `Arena::ptr` is valid during the lifetime of `Sampler`.
unsafe impl Send for Sampler {}
