use comm::Comm;
use ctx::CtxSwitch;
use lost::{LostRecords, LostSamples};
use mmap::Mmap;
use sample::Sample;
use task::{Exit, Fork};

use crate::ffi::{bindings as b, deref_offset};

pub mod comm;
pub mod ctx;
pub mod lost;
pub mod mmap;
pub mod parse;
pub mod sample;
pub mod task;

pub use parse::{Parser, UnsafeParser};

/// One decoded entry from a sampling ring buffer.
///
/// This crate only decodes the record kinds the demultiplexer acts
/// on: `Sample`, `Mmap`/`Mmap2`, `Comm`, `Exit`, `Fork`, context switches and
/// lost-record notifications. Every other `PERF_RECORD_*` kind the kernel can
/// emit (aux, bpf, cgroup, itrace, ksymbol, namespaces, read, text poke,
/// throttle) is folded into `Unknown` since nothing downstream consumes it.
#[derive(Clone)]
pub enum Record {
    // PERF_RECORD_SAMPLE
    Sample(Box<Sample>),
    // PERF_RECORD_MMAP | PERF_RECORD_MMAP2
    Mmap(Box<Mmap>),
    // PERF_RECORD_COMM
    Comm(Box<Comm>),
    // PERF_RECORD_EXIT
    Exit(Box<Exit>),
    // PERF_RECORD_FORK
    Fork(Box<Fork>),
    // PERF_RECORD_SWITCH | PERF_RECORD_SWITCH_CPU_WIDE
    CtxSwitch(Box<CtxSwitch>),
    // PERF_RECORD_LOST
    LostRecords(Box<LostRecords>),
    // PERF_RECORD_LOST_SAMPLES
    LostSamples(Box<LostSamples>),

    Unknown(Vec<u8>),
}

#[derive(Clone, Copy)]
pub struct Task {
    pub pid: u32,
    pub tid: u32,
}

#[derive(Clone, Debug)]
pub enum Priv {
    // PERF_RECORD_MISC_USER
    User,
    // PERF_RECORD_MISC_KERNEL
    Kernel,
    // PERF_RECORD_MISC_HYPERVISOR
    Hv,
    // PERF_RECORD_MISC_GUEST_USER
    GuestUser,
    // PERF_RECORD_MISC_GUEST_KERNEL
    GuestKernel,
    // PERF_RECORD_MISC_CPUMODE_UNKNOWN
    Unknown,
}

impl Priv {
    pub(crate) fn from_misc(misc: u16) -> Self {
        match misc as u32 & b::PERF_RECORD_MISC_CPUMODE_MASK {
            b::PERF_RECORD_MISC_USER => Self::User,
            b::PERF_RECORD_MISC_KERNEL => Self::Kernel,
            b::PERF_RECORD_MISC_HYPERVISOR => Self::Hv,
            b::PERF_RECORD_MISC_GUEST_USER => Self::GuestUser,
            b::PERF_RECORD_MISC_GUEST_KERNEL => Self::GuestKernel,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone)]
pub struct RecordId {
    pub id: Option<u64>,
    pub stream_id: Option<u64>,
    pub cpu: Option<u32>,
    pub task: Option<Task>,
    pub time: Option<u64>,
}

pub(crate) struct SampleType(pub u64);

impl RecordId {
    pub(crate) unsafe fn from_ptr(mut ptr: *const u8, sample_type: u64) -> Self {
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L859
        // struct sample_id {
        //     { u32 pid, tid;  } && PERF_SAMPLE_TID
        //     { u64 time;      } && PERF_SAMPLE_TIME
        //     { u64 id;        } && PERF_SAMPLE_ID
        //     { u64 stream_id; } && PERF_SAMPLE_STREAM_ID
        //     { u32 cpu, res;  } && PERF_SAMPLE_CPU
        // } && perf_event_attr::sample_id_all

        macro_rules! when {
            ($flag:ident, $ty:ty) => {
                (sample_type & b::$flag > 0).then(|| deref_offset::<$ty>(&mut ptr))
            };
            ($flag:ident, $then:expr) => {
                (sample_type & b::$flag > 0).then(|| $then)
            };
        }

        let task = when!(PERF_SAMPLE_TID, {
            let pid = deref_offset(&mut ptr);
            let tid = deref_offset(&mut ptr);
            Task { pid, tid }
        });
        let time = when!(PERF_SAMPLE_TIME, u64);
        let id = when!(PERF_SAMPLE_ID, u64);
        let stream_id = when!(PERF_SAMPLE_STREAM_ID, u64);
        let cpu = when!(PERF_SAMPLE_CPU, u32);

        Self {
            id,
            stream_id,
            cpu,
            task,
            time,
        }
    }
}

macro_rules! from {
    ($ty:ident) => {
        impl From<Box<$ty>> for Record {
            fn from(value: Box<$ty>) -> Self {
                Self::$ty(value)
            }
        }
    };
}
use from;

macro_rules! debug {
    ($ty:ty { $first_field:tt, $($field:tt,)* }) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                use crate::sample::record::debug;

                // `{:-?}` formatter, ignores `None` fields.
                if f.sign_minus() {
                    let has_none = debug!(is_none, self, $first_field) $(|| debug!(is_none, self, $field))+;
                    write!(f, "{} {{ ", stringify!($ty))?;
                    if has_none {
                        debug!({:-?}, self, f, "{}: {:-?}, ", $first_field);
                        $(debug!({:-?}, self, f, "{}: {:-?}, ", $field);)+
                        write!(f, "..")?;
                    } else {
                        debug!({:-?}, self, f, "{}: {:-?}", $first_field);
                        $(debug!({:-?}, self, f, ", {}: {:-?}", $field);)+
                    }
                    return write!(f, " }}")
                }

                // `{:#?}` formatter, same as `{:-?}`, but with indentation.
                if f.alternate() {
                    let has_none = debug!(is_none, self, $first_field) $(|| debug!(is_none, self, $field))+;
                    let mut ds = f.debug_struct(stringify!($ty));
                    debug!({:#?}, self, ds, $first_field);
                    $(debug!({:#?}, self, ds, $field);)*
                    return if has_none {
                        ds.finish_non_exhaustive()
                    } else {
                        ds.finish()
                    }
                }

                // `{:?}` formatter, same as `#[derive(Debug)]`.
                let mut ds = f.debug_struct(stringify!($ty));
                debug!({:?}, self, ds, $first_field);
                $(debug!({:?}, self, ds, $field);)*
                ds.finish()
            }
        }
    };
    // internal switches
    (is_none, $self:ident, {$field:ident}) => {
        false
    };
    (is_none, $self:ident, {$field:ident?}) => {
        $self.$field.is_none()
    };
    ({:?}, $self:ident, $ds:ident, {$field:ident$(?)?}) => {
        $ds.field(stringify!($field), &$self.$field);
    };
    ({:#?}, $self:ident, $ds:ident, {$field:ident}) => {
        $ds.field(stringify!($field), &$self.$field);
    };
    ({:#?}, $self:ident, $ds:ident, {$field:ident?}) => {
        if let Some(it) = &$self.$field {
            $ds.field(stringify!($field), it);
        }
    };
    ({:-?}, $self:ident, $f:ident, $fmt:literal, {$field:ident}) => {
        write!($f, $fmt, stringify!($field), &$self.$field)?;
    };
    ({:-?}, $self:ident, $f:ident, $fmt:literal, {$field:ident?}) => {
        if let Some(it) = &$self.$field {
            write!($f, $fmt, stringify!($field), it)?;
        }
    };
}
pub(crate) use debug;

from!(Mmap);
from!(Comm);
from!(Exit);
from!(Fork);
from!(CtxSwitch);
from!(LostRecords);
from!(LostSamples);

debug!(RecordId {
    {id?},
    {stream_id?},
    {cpu?},
    {task?},
    {time?},
});

debug!(Task {
    {pid},
    {tid},
});
