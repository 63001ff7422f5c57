//! Monitor threads: the unit of parallelism. One monitor owns one thread,
//! pinned (best-effort) to an [`ExecutionScope`], driving an epoll-based wait
//! loop until its stop event-fd is signaled.
//!
//! Poll-only, interval-only, fd-plus-interval, and always-active monitors
//! are all the same loop parameterized by a [`MonitorCapability`]
//! implementor, rather than four separate types in an inheritance tower: a
//! capability that registers no fds behaves like an interval-only monitor,
//! one that registers fds but no timer behaves like a poll-only monitor.

use std::fs::File;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use libc::epoll_event;

use crate::error::Result;
use crate::ffi::syscall;
use crate::scope::ExecutionScope;

/// What a monitor thread does on each wake. Implemented per monitor kind
/// (sample reader, tracepoint reader, accelerator ring-buffer listener, ...).
pub trait MonitorCapability: Send {
    /// Called once, on the monitor thread, after it has pinned itself.
    fn initialize_thread(&mut self) -> Result<()> {
        Ok(())
    }

    /// File descriptors this capability wants woken on POLLIN, alongside an
    /// opaque tag handed back to [`Self::on_fd_ready`].
    fn fds(&self) -> Vec<(&File, u64)> {
        Vec::new()
    }

    /// Called when one of [`Self::fds`]' descriptors has data ready.
    fn on_fd_ready(&mut self, _tag: u64) -> Result<()> {
        Ok(())
    }

    /// Readout interval; `None` disables the timer tick entirely (pure
    /// poll-driven monitor).
    fn interval(&self) -> Option<Duration> {
        None
    }

    /// Called on every interval tick (never called if [`Self::interval`]
    /// returns `None`).
    fn on_tick(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once, on the monitor thread, right before it exits.
    fn finalize_thread(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A spawned monitor thread plus the means to stop it. Double-stop and
/// destruct-before-stop are both safe: `Drop` stops and joins if the caller
/// never did.
pub struct Handle {
    stop: File,
    join: Option<JoinHandle<()>>,
    stopped: bool,
}

impl Handle {
    /// Signals the stop event-fd and joins the thread. Idempotent: a second
    /// call is a no-op logged at debug level.
    pub fn stop(&mut self) {
        if self.stopped {
            log::debug!("monitor already stopped");
            return;
        }
        self.stopped = true;
        if let Err(e) = syscall::eventfd_write(&self.stop, 1) {
            log::warn!("failed to signal monitor stop event-fd: {e}");
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("monitor thread panicked");
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.stopped {
            self.stop();
        }
    }
}

const STOP_TAG: u64 = u64::MAX;

/// Spawns `capability` on its own thread, pinned to `scope` when the scope
/// names a CPU. The thread runs an epoll loop: `poll(-1)` when there is no
/// interval, otherwise a bounded wait aligned to the next interval boundary.
pub fn start<C: MonitorCapability + 'static>(scope: ExecutionScope, mut capability: C) -> Result<Handle> {
    let stop_rd = syscall::eventfd(0, libc::EFD_NONBLOCK)?;
    let stop_wr = stop_rd.try_clone()?;

    let join = std::thread::Builder::new()
        .name(format!("nodetrace-mon-{:?}", scope))
        .spawn(move || {
            if let ExecutionScope::Cpu(cpu) = scope {
                if let Err(e) = syscall::sched_setaffinity(0, cpu as usize) {
                    log::warn!("failed to pin monitor thread to cpu {cpu}: {e}");
                }
            }
            if let Err(e) = capability.initialize_thread() {
                log::warn!("monitor initialize_thread failed: {e}");
                return;
            }
            if let Err(e) = run_loop(&mut capability, &stop_rd) {
                log::warn!("monitor loop exited with error: {e}");
            }
            if let Err(e) = capability.finalize_thread() {
                log::warn!("monitor finalize_thread failed: {e}");
            }
        })
        .map_err(|e| crate::error::TracerError::Finalize(e.to_string()))?;

    Ok(Handle {
        stop: stop_wr,
        join: Some(join),
        stopped: false,
    })
}

fn run_loop<C: MonitorCapability>(capability: &mut C, stop: &File) -> Result<()> {
    let epoll = syscall::epoll_create1(0)?;
    let mut event = epoll_event { events: libc::EPOLLIN as u32, u64: STOP_TAG };
    syscall::epoll_ctl(&epoll, libc::EPOLL_CTL_ADD, stop, &mut event)?;

    let watched = capability.fds();
    for (file, tag) in &watched {
        let mut event = epoll_event {
            events: libc::EPOLLIN as u32,
            u64: *tag,
        };
        syscall::epoll_ctl(&epoll, libc::EPOLL_CTL_ADD, file, &mut event)?;
    }

    let interval = capability.interval();
    let mut next_tick = interval.map(|i| Instant::now() + i);
    let mut buf = [epoll_event { events: 0, u64: 0 }; 16];

    loop {
        let timeout = match (interval, next_tick) {
            (Some(_), Some(deadline)) => {
                let now = Instant::now();
                if deadline <= now {
                    0
                } else {
                    (deadline - now).as_millis().min(i32::MAX as u128) as i32
                }
            }
            _ => -1,
        };

        let ready = match syscall::epoll_wait(&epoll, &mut buf, timeout) {
            Ok(ready) => ready,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        let mut stopped = false;
        for ev in ready {
            if ev.u64 == STOP_TAG {
                stopped = true;
            } else {
                capability.on_fd_ready(ev.u64)?;
            }
        }
        if stopped {
            return Ok(());
        }

        if let (Some(interval), Some(deadline)) = (interval, next_tick) {
            if Instant::now() >= deadline {
                capability.on_tick()?;
                next_tick = Some(deadline + interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCapability {
        ticks: Arc<AtomicUsize>,
        initialized: Arc<AtomicUsize>,
        finalized: Arc<AtomicUsize>,
    }

    impl MonitorCapability for CountingCapability {
        fn initialize_thread(&mut self) -> Result<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn interval(&self) -> Option<Duration> {
            Some(Duration::from_millis(5))
        }

        fn on_tick(&mut self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn finalize_thread(&mut self) -> Result<()> {
            self.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn interval_monitor_ticks_then_stops_cleanly() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let initialized = Arc::new(AtomicUsize::new(0));
        let finalized = Arc::new(AtomicUsize::new(0));
        let cap = CountingCapability {
            ticks: ticks.clone(),
            initialized: initialized.clone(),
            finalized: finalized.clone(),
        };

        let mut handle = start(ExecutionScope::Process(0), cap).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        handle.stop();
        handle.stop(); // double-stop is a safe no-op

        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }
}
