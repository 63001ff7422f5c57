//! Typed per-scope writers translating demultiplexed records into trace
//! archive events.
//!
//! The writer set is closed and known at compile time, so [`AnyWriter`]
//! dispatches by match rather than `dyn Writer`: one enum, no vtable, no
//! heap allocation per writer.

use std::collections::HashMap;
use std::io;

use crate::cctx::{CallingContext, Tree};
use crate::demux::{Event, SwitchDirection};
use crate::scope::{ExecutionScope, MeasurementKind, MeasurementScope};
use crate::trace::{LocationWriter, Trace, TraceEvent};

/// Shared contract every writer implements: translate a timestamped record
/// into zero or more archive events, and flush any outstanding state when
/// its monitor stops.
pub trait Writer {
    fn handle(&mut self, ts: u64, record: &Event) -> io::Result<()>;
    fn finalize(&mut self, facade: &Trace) -> io::Result<()>;
}

/// Translates instruction-pointer samples into calling-context enter/sample
/// events, and re-enters/leaves the thread's context across a switch.
pub struct SampleWriter {
    scope: ExecutionScope,
    out: LocationWriter,
    tree: Tree,
    process_opened: bool,
    thread_opened: Option<i64>,
    unwind_distance: u64,
    last_tp: u64,
}

impl SampleWriter {
    pub fn new(scope: ExecutionScope, facade: &Trace) -> io::Result<Self> {
        let out = facade.sample_writer_for(MeasurementScope::new(MeasurementKind::Sample, scope))?;
        Ok(Self {
            scope,
            out,
            tree: Tree::new(),
            process_opened: false,
            thread_opened: None,
            unwind_distance: 0,
            last_tp: 0,
        })
    }

    fn open_process(&mut self, ts: u64) -> io::Result<()> {
        if self.process_opened {
            return Ok(());
        }
        let (ctx_ref, unwind_distance) =
            self.tree.enter(1, self.unwind_distance, CallingContext::Process(self.scope.id()));
        self.unwind_distance = unwind_distance;
        self.out.emit(&TraceEvent::CctxEnter { ts, ctx_ref, unwind_distance })?;
        self.process_opened = true;
        Ok(())
    }
}

impl Writer for SampleWriter {
    fn handle(&mut self, _ts: u64, record: &Event) -> io::Result<()> {
        match record {
            Event::Sample { ts, ips, .. } => {
                self.open_process(*ts)?;
                let leaf = self.tree.sample(ips);
                self.out.emit(&TraceEvent::CctxSample { ts: *ts, ctx_ref: leaf })?;
                self.last_tp = *ts;
            }
            Event::Switch {
                direction: SwitchDirection::In,
                ts,
                tid,
                ..
            } => {
                self.open_process(*ts)?;
                if let Some(tid) = tid {
                    let (ctx_ref, unwind_distance) =
                        self.tree.enter(2, self.unwind_distance, CallingContext::Thread(*tid as i64));
                    self.unwind_distance = unwind_distance;
                    self.out.emit(&TraceEvent::CctxEnter { ts: *ts, ctx_ref, unwind_distance })?;
                    self.thread_opened = Some(*tid as i64);
                }
                self.last_tp = *ts;
            }
            Event::Switch {
                direction: SwitchDirection::Out,
                ts,
                ..
            } => {
                if self.thread_opened.take().is_some() {
                    for ctx_ref in self.tree.leave(2) {
                        self.out.emit(&TraceEvent::CctxLeave { ts: *ts, ctx_ref })?;
                    }
                }
                self.last_tp = *ts;
            }
            _ => {}
        }
        Ok(())
    }

    fn finalize(&mut self, facade: &Trace) -> io::Result<()> {
        for ctx_ref in self.tree.leave(0) {
            self.out.emit(&TraceEvent::CctxLeave {
                ts: self.last_tp,
                ctx_ref,
            })?;
        }
        facade.merge_tids(&self.tree);
        self.out.flush()
    }
}

/// A block-I/O tracepoint, already field-extracted via
/// [`crate::tracepoint::FormatFile`]. Not a [`demux::Event`] variant: these
/// come from the raw tracepoint sample payload, not the perf callchain path.
#[derive(Clone, Copy, Debug)]
pub enum BioEvent {
    Queue { device: u64, sector: u64, nr_sector: u64 },
    Issue { device: u64, sector: u64 },
    Complete { device: u64, sector: u64 },
}

const SECTOR_SIZE: u64 = 512;

#[derive(Clone, Copy)]
struct PendingIo {
    queued_at: u64,
    issued_at: Option<u64>,
    size: u64,
}

/// Matches queue/issue/complete tracepoints by `(device, sector)` and emits
/// paired begin/issued/complete events. Unmatched issues/completes (the
/// queue event fell outside the trace window, or was on a different CPU's
/// ring buffer and lost) are discarded.
pub struct BlockIoWriter {
    out: LocationWriter,
    pending: HashMap<(u64, u64), PendingIo>,
    last_tp: u64,
}

impl BlockIoWriter {
    pub fn new(device: u64, facade: &Trace) -> io::Result<Self> {
        Ok(Self {
            out: facade.bio_writer(device)?,
            pending: HashMap::new(),
            last_tp: 0,
        })
    }

    pub fn handle_bio(&mut self, ts: u64, event: BioEvent) -> io::Result<()> {
        self.last_tp = ts;
        match event {
            BioEvent::Queue {
                device,
                sector,
                nr_sector,
            } => {
                self.pending.insert(
                    (device, sector),
                    PendingIo {
                        queued_at: ts,
                        issued_at: None,
                        size: nr_sector * SECTOR_SIZE,
                    },
                );
                self.out.emit(&TraceEvent::IoBegin {
                    ts,
                    device,
                    offset: sector,
                    size: nr_sector * SECTOR_SIZE,
                })
            }
            BioEvent::Issue { device, sector } => {
                let Some(io) = self.pending.get_mut(&(device, sector)) else {
                    log::debug!("bio issue with no matching queue: dev={device} sector={sector}");
                    return Ok(());
                };
                io.issued_at = Some(ts);
                self.out.emit(&TraceEvent::IoIssued { ts, device, offset: sector })
            }
            BioEvent::Complete { device, sector } => {
                let Some(io) = self.pending.remove(&(device, sector)) else {
                    log::debug!("bio complete with no matching queue: dev={device} sector={sector}");
                    return Ok(());
                };
                self.out.emit(&TraceEvent::IoComplete {
                    ts,
                    device,
                    offset: sector,
                    size: io.size,
                })
            }
        }
    }
}

impl Writer for BlockIoWriter {
    fn handle(&mut self, _ts: u64, _record: &Event) -> io::Result<()> {
        Ok(())
    }

    fn finalize(&mut self, _facade: &Trace) -> io::Result<()> {
        if !self.pending.is_empty() {
            log::debug!("{} block I/O operations still in flight at finalize", self.pending.len());
        }
        self.out.flush()
    }
}

/// CPU-wide context-switch writer: emits a thread-region enter/leave per
/// switch. Idle (pid 0) switches are suppressed.
pub struct CtxSwitchWriter {
    out: LocationWriter,
    open: HashMap<u32, u64>,
}

impl CtxSwitchWriter {
    pub fn new(cpu: i64, facade: &Trace) -> io::Result<Self> {
        Ok(Self {
            out: facade.create_metric_writer(&format!("switch/cpu{cpu}"))?,
            open: HashMap::new(),
        })
    }

    /// Whether a thread-region is currently open for `tid`.
    pub fn has_open(&self, tid: u32) -> bool {
        self.open.contains_key(&tid)
    }
}

impl Writer for CtxSwitchWriter {
    fn handle(&mut self, _ts: u64, record: &Event) -> io::Result<()> {
        let Event::Switch { direction, ts, tid, .. } = record else {
            return Ok(());
        };
        let Some(tid) = tid else { return Ok(()) };
        if *tid == 0 {
            return Ok(());
        }
        match direction {
            SwitchDirection::In => {
                let region = self.out.id() + *tid as u64;
                self.open.insert(*tid, region);
                self.out.emit(&TraceEvent::RegionEnter { ts: *ts, region })
            }
            SwitchDirection::Out => {
                // A switch-out with no prior switch-in still closes a region:
                // the thread was already running when tracing started.
                let region = self.open.remove(tid).unwrap_or(self.out.id() + *tid as u64);
                self.out.emit(&TraceEvent::RegionLeave { ts: *ts, region })
            }
        }
    }

    fn finalize(&mut self, _facade: &Trace) -> io::Result<()> {
        for (_, region) in self.open.drain() {
            self.out.emit(&TraceEvent::RegionLeave { ts: 0, region })?;
        }
        self.out.flush()
    }
}

/// Accelerator kernel record decoded from a shared ring buffer: either a
/// one-time function-address-to-name definition, or a start/end interval.
#[derive(Clone, Debug)]
pub enum AccelEvent {
    KernelDef { addr: u64, name: String },
    Kernel { pid: i64, kernel_id: u64, start: u64, end: u64 },
}

/// GPU/OpenMP writer, fed by [`crate::shmrb`] consumers rather than the perf
/// ring buffer. Emits a two-level context `Process(p) -> Cuda(kernel_id)` (or
/// `Openmp`, depending on which shared-memory channel it is attached to).
pub struct AccelWriter {
    out: LocationWriter,
    tree: Tree,
    names: HashMap<u64, String>,
    is_openmp: bool,
}

impl AccelWriter {
    pub fn new(kind: MeasurementKind, name: &str, facade: &Trace) -> io::Result<Self> {
        Ok(Self {
            out: facade.create_metric_writer(name)?,
            tree: Tree::new(),
            names: HashMap::new(),
            is_openmp: matches!(kind, MeasurementKind::Openmp),
        })
    }

    pub fn handle_accel(&mut self, event: AccelEvent) -> io::Result<()> {
        match event {
            AccelEvent::KernelDef { addr, name } => {
                self.names.insert(addr, name);
                Ok(())
            }
            AccelEvent::Kernel {
                pid,
                kernel_id,
                start,
                end,
            } => {
                let leaf_ctx = if self.is_openmp {
                    CallingContext::Openmp(kernel_id)
                } else {
                    CallingContext::Cuda(kernel_id)
                };
                self.tree.enter(1, 0, CallingContext::Process(pid));
                let (leaf, unwind_distance) = self.tree.enter(2, 0, leaf_ctx);
                self.out.emit(&TraceEvent::CctxEnter {
                    ts: start,
                    ctx_ref: leaf,
                    unwind_distance,
                })?;
                self.tree.leave(2);
                self.out.emit(&TraceEvent::CctxLeave { ts: end, ctx_ref: leaf })
            }
        }
    }
}

impl Writer for AccelWriter {
    fn handle(&mut self, _ts: u64, _record: &Event) -> io::Result<()> {
        Ok(())
    }

    fn finalize(&mut self, facade: &Trace) -> io::Result<()> {
        facade.merge_tids(&self.tree);
        self.out.flush()
    }
}

/// A raw syscall entry/exit tracepoint, field-extracted the same way as
/// [`BioEvent`].
#[derive(Clone, Copy, Debug)]
pub enum SyscallEvent {
    Enter { nr: i64 },
    Exit { nr: i64 },
}

/// Translates sys_enter/sys_exit pairs into calling-context enter/leave
/// events keyed by syscall number.
pub struct SyscallWriter {
    out: LocationWriter,
    tree: Tree,
    seen: Vec<i64>,
    open: Option<i64>,
    last_tp: u64,
}

impl SyscallWriter {
    pub fn new(scope: ExecutionScope, facade: &Trace) -> io::Result<Self> {
        Ok(Self {
            out: facade.sample_writer_for(MeasurementScope::new(MeasurementKind::Syscall, scope))?,
            tree: Tree::new(),
            seen: Vec::new(),
            open: None,
            last_tp: 0,
        })
    }

    pub fn handle_syscall(&mut self, ts: u64, event: SyscallEvent) -> io::Result<()> {
        self.last_tp = ts;
        match event {
            SyscallEvent::Enter { nr } => {
                self.seen.push(nr);
                let (ctx_ref, unwind_distance) = self.tree.enter(1, 0, CallingContext::Syscall(nr));
                self.open = Some(nr);
                self.out.emit(&TraceEvent::CctxEnter { ts, ctx_ref, unwind_distance })
            }
            SyscallEvent::Exit { nr } => {
                if self.open != Some(nr) {
                    log::debug!("sys_exit({nr}) without matching sys_enter");
                    return Ok(());
                }
                self.open = None;
                for ctx_ref in self.tree.leave(0) {
                    self.out.emit(&TraceEvent::CctxLeave { ts, ctx_ref })?;
                }
                Ok(())
            }
        }
    }
}

impl Writer for SyscallWriter {
    fn handle(&mut self, _ts: u64, _record: &Event) -> io::Result<()> {
        Ok(())
    }

    fn finalize(&mut self, facade: &Trace) -> io::Result<()> {
        for ctx_ref in self.tree.leave(0) {
            self.out.emit(&TraceEvent::CctxLeave {
                ts: self.last_tp,
                ctx_ref,
            })?;
        }
        facade.merge_syscall_contexts(self.seen.drain(..));
        self.out.flush()
    }
}

/// Tagged union over every concrete writer, dispatched by match instead of
/// `dyn Writer` on the per-record hot path.
pub enum AnyWriter {
    Sample(SampleWriter),
    BlockIo(BlockIoWriter),
    CtxSwitch(CtxSwitchWriter),
    Accel(AccelWriter),
    Syscall(SyscallWriter),
}

impl Writer for AnyWriter {
    fn handle(&mut self, ts: u64, record: &Event) -> io::Result<()> {
        match self {
            AnyWriter::Sample(w) => w.handle(ts, record),
            AnyWriter::BlockIo(w) => w.handle(ts, record),
            AnyWriter::CtxSwitch(w) => w.handle(ts, record),
            AnyWriter::Accel(w) => w.handle(ts, record),
            AnyWriter::Syscall(w) => w.handle(ts, record),
        }
    }

    fn finalize(&mut self, facade: &Trace) -> io::Result<()> {
        match self {
            AnyWriter::Sample(w) => w.finalize(facade),
            AnyWriter::BlockIo(w) => w.finalize(facade),
            AnyWriter::CtxSwitch(w) => w.finalize(facade),
            AnyWriter::Accel(w) => w.finalize(facade),
            AnyWriter::Syscall(w) => w.finalize(facade),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> Trace {
        let dir = std::env::temp_dir().join(format!("nodetrace-writer-test-{}-{}", std::process::id(), line!()));
        Trace::create(dir).unwrap()
    }

    #[test]
    fn sample_writer_opens_process_on_first_sample() {
        let facade = facade();
        let mut w = SampleWriter::new(ExecutionScope::Process(42), &facade).unwrap();
        w.handle(
            0,
            &Event::Sample {
                ts: 100,
                tid: 42,
                cpu: None,
                ips: vec![0xA],
                group_values: None,
            },
        )
        .unwrap();
        assert!(w.process_opened);
        w.finalize(&facade).unwrap();
        let _ = std::fs::remove_dir_all(facade.dir());
    }

    #[test]
    fn block_io_writer_matches_queue_issue_complete() {
        let facade = facade();
        let mut w = BlockIoWriter::new(8, &facade).unwrap();
        w.handle_bio(
            1,
            BioEvent::Queue {
                device: 8,
                sector: 100,
                nr_sector: 8,
            },
        )
        .unwrap();
        w.handle_bio(2, BioEvent::Issue { device: 8, sector: 100 }).unwrap();
        w.handle_bio(3, BioEvent::Complete { device: 8, sector: 100 }).unwrap();
        assert!(w.pending.is_empty());
        let _ = std::fs::remove_dir_all(facade.dir());
    }

    #[test]
    fn block_io_writer_discards_unmatched_complete() {
        let facade = facade();
        let mut w = BlockIoWriter::new(8, &facade).unwrap();
        w.handle_bio(1, BioEvent::Complete { device: 8, sector: 5 }).unwrap();
        assert!(w.pending.is_empty());
        let _ = std::fs::remove_dir_all(facade.dir());
    }

    #[test]
    fn ctx_switch_writer_suppresses_idle() {
        let facade = facade();
        let mut w = CtxSwitchWriter::new(0, &facade).unwrap();
        w.handle(
            0,
            &Event::Switch {
                direction: SwitchDirection::In,
                ts: 1,
                pid: Some(0),
                tid: Some(0),
            },
        )
        .unwrap();
        assert!(w.open.is_empty());
        let _ = std::fs::remove_dir_all(facade.dir());
    }
}
