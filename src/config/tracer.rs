//! Top-level tracer configuration, populated directly by an embedding binary.
//!
//! Distinct from the rest of this module, which builds the low-level
//! `perf_event_open` attribute record for a single counter. `TracerConfig`
//! is consumed by the fleet coordinator and friends to decide *what* to
//! observe; parsing it from argv or a config file is an external concern.

use std::path::PathBuf;

/// Whether the fleet observes one process tree or the whole machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceMode {
    ProcessTree { pid: i32 },
    SystemWide,
}

#[derive(Clone, Debug)]
pub struct TracerConfig {
    pub mode: TraceMode,
    /// Beyond this, a clock-sync offset is logged as suspicious.
    pub clock_sanity_bound_ns: u64,
    /// `1 + 2^rb_pages_exp` pages mapped per perf ring buffer.
    pub rb_pages_exp: u8,
    /// `1 + 2^shmrb_pages_exp` pages mapped per shared ring buffer.
    pub shmrb_pages_exp: u8,
    pub tracepoint_subsystems: Vec<String>,
    pub tracing_fs: PathBuf,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            mode: TraceMode::SystemWide,
            clock_sanity_bound_ns: crate::time::DEFAULT_SANITY_BOUND_NS,
            rb_pages_exp: 8,
            shmrb_pages_exp: 8,
            tracepoint_subsystems: vec!["block".into(), "syscalls".into()],
            tracing_fs: PathBuf::from("/sys/kernel/tracing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_system_wide() {
        assert_eq!(TracerConfig::default().mode, TraceMode::SystemWide);
    }
}
