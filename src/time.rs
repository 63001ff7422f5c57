//! Offset between the kernel's monotonic clock and the trace's wall clock.
//!
//! [`TimeConverter`] is built once at startup by [`TimeConverter::sync`],
//! which arms a write-breakpoint on a local variable, writes the current wall
//! time into it, and reads back the kernel timestamp the resulting sample
//! carries. Every other timestamp conversion in the crate goes through the
//! resulting `Δ`.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;

use crate::config::{Opts, RecordIdFormat, SampleOn};
use crate::count::Counter;
use crate::event::bp::{Breakpoint, Len, Type};
use crate::event::sw::Software;

/// Default bound, in nanoseconds, beyond which a synchronized offset is
/// considered suspicious (but still applied).
pub const DEFAULT_SANITY_BOUND_NS: u64 = 100_000;

/// Signed offset `Δ` such that `trace_ts = kernel_ts + Δ`.
#[derive(Clone, Copy, Debug)]
pub struct TimeConverter {
    delta_ns: i64,
}

impl TimeConverter {
    /// Builds a converter from an already-known offset — used by tests and by
    /// [`TimeConverter::sync`] once it has resolved `Δ`.
    pub fn from_delta(delta_ns: i64) -> Self {
        Self { delta_ns }
    }

    /// Converts a local (pre-sync wall clock, post-sync Δ-adjusted) timestamp
    /// pair into `Δ`, warning if it exceeds `sanity_bound_ns`.
    pub fn from_sync_sample(local_wall_ns: u64, kernel_ts_ns: u64, sanity_bound_ns: u64) -> Self {
        let delta_ns = local_wall_ns as i64 - kernel_ts_ns as i64;
        if delta_ns.unsigned_abs() > sanity_bound_ns {
            warn!(
                "clock sync offset {delta_ns}ns exceeds sanity bound {sanity_bound_ns}ns; applying anyway"
            );
        }
        Self { delta_ns }
    }

    /// Establishes `Δ` via a hardware write-breakpoint synchronization event.
    ///
    /// Arms a counting breakpoint on the address of a local counter, writes
    /// the current wall-clock time into it, and reads the kernel timestamp of
    /// the resulting sample. On platforms where breakpoint events are
    /// unavailable, falls back to [`Self::sync_software_fallback`]. If no
    /// sample is observed, `Δ = 0` is returned — a degraded but non-fatal
    /// outcome, logged by the caller via [`crate::error::TracerError::CapabilityDegraded`].
    pub fn sync(sanity_bound_ns: u64) -> Self {
        match Self::sync_via_breakpoint(sanity_bound_ns) {
            Ok(conv) => conv,
            Err(e) => {
                warn!("hardware breakpoint sync unavailable ({e}); falling back to software sync");
                Self::sync_software_fallback(sanity_bound_ns).unwrap_or_else(|e| {
                    warn!("software clock sync failed ({e}); defaulting to Δ=0");
                    Self { delta_ns: 0 }
                })
            }
        }
    }

    fn sync_via_breakpoint(sanity_bound_ns: u64) -> io::Result<Self> {
        let mut sync_point: u64 = 0;
        let addr = std::ptr::addr_of!(sync_point) as u64;

        let event = Breakpoint {
            ty: Type::W(Len::_8),
            addr,
        };

        let mut opts = Opts::default();
        opts.sample_on = SampleOn::Count(1);
        opts.record_id_format = RecordIdFormat {
            time: true,
            ..Default::default()
        };

        let counter = Counter::new(event, (crate::config::Proc::CURRENT, crate::config::Cpu::ALL), opts)?;
        let sampler = counter.sampler(2)?;

        counter.enable()?;
        sync_point = wall_clock_ns();
        std::hint::black_box(&sync_point);
        counter.disable()?;

        for (_, record) in sampler.iter() {
            if let crate::sample::record::Record::Sample(sample) = record {
                if let Some(kernel_ts) = sample.record_id.time {
                    return Ok(Self::from_sync_sample(
                        wall_clock_ns(),
                        kernel_ts,
                        sanity_bound_ns,
                    ));
                }
            }
        }

        Err(io::Error::new(
            io::ErrorKind::Other,
            "breakpoint sync produced no sample",
        ))
    }

    /// Fallback sync path for platforms without hardware breakpoint events: a
    /// one-shot software dummy event armed just before a `fork()`, whose
    /// sample carries the timestamp of the fork itself.
    fn sync_software_fallback(sanity_bound_ns: u64) -> io::Result<Self> {
        let mut opts = Opts::default();
        opts.sample_on = SampleOn::Count(1);
        opts.record_id_format = RecordIdFormat {
            time: true,
            ..Default::default()
        };

        let counter = Counter::new(
            Software::Dummy,
            (crate::config::Proc::CURRENT, crate::config::Cpu::ALL),
            opts,
        )?;
        let sampler = counter.sampler(2)?;

        counter.enable()?;
        let local_wall_ns = wall_clock_ns();
        // SAFETY: the child immediately exits without touching any
        // inherited heap state; only a raw syscall is made.
        let pid = unsafe { libc::fork() };
        if pid == 0 {
            unsafe { libc::_exit(0) };
        }
        counter.disable()?;

        for (_, record) in sampler.iter() {
            if let crate::sample::record::Record::Sample(sample) = record {
                if let Some(kernel_ts) = sample.record_id.time {
                    return Ok(Self::from_sync_sample(local_wall_ns, kernel_ts, sanity_bound_ns));
                }
            }
        }

        Err(io::Error::new(
            io::ErrorKind::Other,
            "software fallback sync produced no sample",
        ))
    }

    pub fn delta_ns(&self) -> i64 {
        self.delta_ns
    }

    /// Converts a kernel-clock timestamp into the trace's wall-clock base.
    pub fn to_trace(&self, kernel_ts_ns: u64) -> u64 {
        (kernel_ts_ns as i64 + self.delta_ns) as u64
    }

    /// Converts a trace-clock timestamp back into the kernel's clock base.
    pub fn to_kernel(&self, trace_ts_ns: u64) -> u64 {
        (trace_ts_ns as i64 - self.delta_ns) as u64
    }
}

fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("wall clock is after the unix epoch")
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_event_example() {
        let conv = TimeConverter::from_sync_sample(1_000_000_000, 500_000_000, DEFAULT_SANITY_BOUND_NS);
        assert_eq!(conv.delta_ns(), 500_000_000);
        assert_eq!(conv.to_trace(600_000_000), 1_100_000_000);
    }

    #[test]
    fn round_trip_is_identity() {
        let conv = TimeConverter::from_delta(-42);
        for ts in [0u64, 1, 1_000_000_000, u32::MAX as u64] {
            assert_eq!(conv.to_trace(conv.to_kernel(ts)), ts);
            assert_eq!(conv.to_kernel(conv.to_trace(ts)), ts);
        }
    }

    #[test]
    fn total_order_preserved() {
        let conv = TimeConverter::from_delta(17);
        let a = conv.to_trace(10);
        let b = conv.to_trace(20);
        assert!(a < b);
    }
}
