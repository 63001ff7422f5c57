use super::{RecordId, SampleType, Task};
use crate::ffi::{bindings as b, deref_offset};

/// Context switch (`PERF_RECORD_SWITCH` / `PERF_RECORD_SWITCH_CPU_WIDE`).
#[derive(Clone)]
pub struct CtxSwitch {
    pub record_id: Option<RecordId>,

    pub info: Switch,
}

impl CtxSwitch {
    pub(crate) unsafe fn from_ptr(
        mut ptr: *const u8,
        cpu_wide: bool,
        misc: u16,
        sample_id_all: Option<SampleType>,
    ) -> Self {
        // PERF_RECORD_SWITCH_CPU_WIDE adds a (pid, tid) pair ahead of sample_id.
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L1119
        let task = cpu_wide.then(|| Task {
            pid: deref_offset(&mut ptr),
            tid: deref_offset(&mut ptr),
        });
        let info = if misc as u32 & b::PERF_RECORD_MISC_SWITCH_OUT > 0 {
            let preempt = misc as u32 & b::PERF_RECORD_MISC_SWITCH_OUT_PREEMPT > 0;
            Switch::OutTo { task, preempt }
        } else {
            Switch::InFrom(task)
        };
        let record_id = sample_id_all.map(|SampleType(ty)| RecordId::from_ptr(ptr, ty));

        Self { record_id, info }
    }
}

super::debug!(CtxSwitch {
    {record_id?},
    {info},
});

#[derive(Clone)]
pub enum Switch {
    // PERF_RECORD_MISC_SWITCH_OUT
    OutTo { task: Option<Task>, preempt: bool },
    // !PERF_RECORD_MISC_SWITCH_OUT
    InFrom(Option<Task>),
}

impl std::fmt::Debug for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutTo { task, preempt } => f
                .debug_struct("OutTo")
                .field("task", task)
                .field("preempt", preempt)
                .finish(),
            Self::InFrom(task) => f.debug_tuple("InFrom").field(task).finish(),
        }
    }
}
