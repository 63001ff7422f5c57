#![allow(non_camel_case_types)]

//! Hand-written subset of the `perf_event_open(2)` ABI.
//!
//! The upstream crate this module descends from generates these types with
//! `bindgen` against a vendored tree of kernel UAPI headers spanning two
//! dozen releases. That header tree isn't available in this build, so the
//! types and constants below are written out directly instead, fixed to a
//! single modern ABI (roughly linux-6.x) rather than switched per kernel
//! version. See DESIGN.md for the reasoning.

// include/uapi/linux/perf_event.h: enum perf_type_id
pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_TRACEPOINT: u32 = 2;
pub const PERF_TYPE_HW_CACHE: u32 = 3;
pub const PERF_TYPE_RAW: u32 = 4;
pub const PERF_TYPE_BREAKPOINT: u32 = 5;

// enum perf_hw_id
pub const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
pub const PERF_COUNT_HW_INSTRUCTIONS: u64 = 1;
pub const PERF_COUNT_HW_CACHE_REFERENCES: u64 = 2;
pub const PERF_COUNT_HW_CACHE_MISSES: u64 = 3;
pub const PERF_COUNT_HW_BRANCH_INSTRUCTIONS: u64 = 4;
pub const PERF_COUNT_HW_BRANCH_MISSES: u64 = 5;
pub const PERF_COUNT_HW_BUS_CYCLES: u64 = 6;
pub const PERF_COUNT_HW_STALLED_CYCLES_FRONTEND: u64 = 7;
pub const PERF_COUNT_HW_STALLED_CYCLES_BACKEND: u64 = 8;
pub const PERF_COUNT_HW_REF_CPU_CYCLES: u64 = 9;

// enum perf_hw_cache_id / perf_hw_cache_op_id / perf_hw_cache_op_result_id
pub const PERF_COUNT_HW_CACHE_L1D: u64 = 0;
pub const PERF_COUNT_HW_CACHE_L1I: u64 = 1;
pub const PERF_COUNT_HW_CACHE_LL: u64 = 2;
pub const PERF_COUNT_HW_CACHE_DTLB: u64 = 3;
pub const PERF_COUNT_HW_CACHE_ITLB: u64 = 4;
pub const PERF_COUNT_HW_CACHE_BPU: u64 = 5;
pub const PERF_COUNT_HW_CACHE_NODE: u64 = 6;
pub const PERF_COUNT_HW_CACHE_OP_READ: u64 = 0;
pub const PERF_COUNT_HW_CACHE_OP_WRITE: u64 = 1;
pub const PERF_COUNT_HW_CACHE_OP_PREFETCH: u64 = 2;
pub const PERF_COUNT_HW_CACHE_RESULT_ACCESS: u64 = 0;
pub const PERF_COUNT_HW_CACHE_RESULT_MISS: u64 = 1;

// enum perf_sw_ids
pub const PERF_COUNT_SW_CPU_CLOCK: u64 = 0;
pub const PERF_COUNT_SW_TASK_CLOCK: u64 = 1;
pub const PERF_COUNT_SW_PAGE_FAULTS: u64 = 2;
pub const PERF_COUNT_SW_CONTEXT_SWITCHES: u64 = 3;
pub const PERF_COUNT_SW_CPU_MIGRATIONS: u64 = 4;
pub const PERF_COUNT_SW_PAGE_FAULTS_MIN: u64 = 5;
pub const PERF_COUNT_SW_PAGE_FAULTS_MAJ: u64 = 6;
pub const PERF_COUNT_SW_ALIGNMENT_FAULTS: u64 = 7;
pub const PERF_COUNT_SW_EMULATION_FAULTS: u64 = 8;
pub const PERF_COUNT_SW_DUMMY: u64 = 9;
pub const PERF_COUNT_SW_BPF_OUTPUT: u64 = 10;
pub const PERF_COUNT_SW_CGROUP_SWITCHES: u64 = 11;

// enum perf_event_sample_format (subset this crate parses)
pub const PERF_SAMPLE_IP: u64 = 1 << 0;
pub const PERF_SAMPLE_TID: u64 = 1 << 1;
pub const PERF_SAMPLE_TIME: u64 = 1 << 2;
pub const PERF_SAMPLE_CALLCHAIN: u64 = 1 << 8;
pub const PERF_SAMPLE_ID: u64 = 1 << 6;
pub const PERF_SAMPLE_CPU: u64 = 1 << 7;
pub const PERF_SAMPLE_PERIOD: u64 = 1 << 9;
pub const PERF_SAMPLE_STREAM_ID: u64 = 1 << 10;
pub const PERF_SAMPLE_RAW: u64 = 1 << 11;
pub const PERF_SAMPLE_READ: u64 = 1 << 3;

// enum perf_event_read_format
pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;
pub const PERF_FORMAT_ID: u64 = 1 << 2;
pub const PERF_FORMAT_GROUP: u64 = 1 << 3;
pub const PERF_FORMAT_LOST: u64 = 1 << 4;

// enum hw_breakpoint_type (include/uapi/linux/hw_breakpoint.h)
pub const HW_BREAKPOINT_R: u32 = 1;
pub const HW_BREAKPOINT_W: u32 = 2;
pub const HW_BREAKPOINT_RW: u32 = HW_BREAKPOINT_R | HW_BREAKPOINT_W;
pub const HW_BREAKPOINT_X: u32 = 4;

// enum perf_event_type
pub const PERF_RECORD_MMAP: u32 = 1;
pub const PERF_RECORD_LOST: u32 = 2;
pub const PERF_RECORD_COMM: u32 = 3;
pub const PERF_RECORD_EXIT: u32 = 4;
pub const PERF_RECORD_THROTTLE: u32 = 5;
pub const PERF_RECORD_UNTHROTTLE: u32 = 6;
pub const PERF_RECORD_FORK: u32 = 7;
pub const PERF_RECORD_READ: u32 = 8;
pub const PERF_RECORD_SAMPLE: u32 = 9;
pub const PERF_RECORD_MMAP2: u32 = 10;
pub const PERF_RECORD_SWITCH: u32 = 15;
pub const PERF_RECORD_SWITCH_CPU_WIDE: u32 = 16;
pub const PERF_RECORD_LOST_SAMPLES: u32 = 13;

// PERF_RECORD_MISC_*
pub const PERF_RECORD_MISC_CPUMODE_MASK: u32 = 7;
pub const PERF_RECORD_MISC_CPUMODE_UNKNOWN: u32 = 0;
pub const PERF_RECORD_MISC_KERNEL: u32 = 1;
pub const PERF_RECORD_MISC_USER: u32 = 2;
pub const PERF_RECORD_MISC_HYPERVISOR: u32 = 3;
pub const PERF_RECORD_MISC_GUEST_KERNEL: u32 = 4;
pub const PERF_RECORD_MISC_GUEST_USER: u32 = 5;
pub const PERF_RECORD_MISC_MMAP_DATA: u32 = 1 << 13;
pub const PERF_RECORD_MISC_COMM_EXEC: u32 = 1 << 13;
pub const PERF_RECORD_MISC_SWITCH_OUT: u32 = 1 << 13;
pub const PERF_RECORD_MISC_SWITCH_OUT_PREEMPT: u32 = 1 << 14;
pub const PERF_RECORD_MISC_MMAP_BUILD_ID: u32 = 1 << 14;

// ioctl ops, https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L526
pub const PERF_EVENT_IOC_ENABLE: u64 = 0x2400;
pub const PERF_EVENT_IOC_DISABLE: u64 = 0x2401;
pub const PERF_EVENT_IOC_REFRESH: u64 = 0x2402;
pub const PERF_EVENT_IOC_RESET: u64 = 0x2403;
pub const PERF_EVENT_IOC_PERIOD: u64 = 0x40082404;
pub const PERF_EVENT_IOC_SET_OUTPUT: u64 = 0x2405;
pub const PERF_EVENT_IOC_SET_FILTER: u64 = 0x40082406;
pub const PERF_EVENT_IOC_ID: u64 = 0x80082407;
pub const PERF_EVENT_IOC_SET_BPF: u64 = 0x40042408;
pub const PERF_EVENT_IOC_PAUSE_OUTPUT: u64 = 0x40042409;
pub const PERF_EVENT_IOC_QUERY_BPF: u64 = 0xc008240a;
pub const PERF_EVENT_IOC_MODIFY_ATTRIBUTES: u64 = 0x4008240b;

pub const PERF_IOC_OP_ENABLE: u64 = PERF_EVENT_IOC_ENABLE;
pub const PERF_IOC_OP_DISABLE: u64 = PERF_EVENT_IOC_DISABLE;
pub const PERF_IOC_OP_RESET: u64 = PERF_EVENT_IOC_RESET;
pub const PERF_IOC_FLAG_GROUP: u64 = 1;

// PERF_FLAG_*
pub const PERF_FLAG_FD_NO_GROUP: u64 = 1 << 0;
pub const PERF_FLAG_FD_OUTPUT: u64 = 1 << 1;
pub const PERF_FLAG_PID_CGROUP: u64 = 1 << 2;
pub const PERF_FLAG_FD_CLOEXEC: u64 = 1 << 3;

// time.h clockids used with `use_clockid`/`clockid`
pub const CLOCK_REALTIME: i32 = 0;
pub const CLOCK_MONOTONIC: i32 = 1;
pub const CLOCK_MONOTONIC_RAW: i32 = 4;
pub const CLOCK_BOOTTIME: i32 = 7;
pub const CLOCK_TAI: i32 = 11;

/// `sample_period` / `sample_freq` union.
#[repr(C)]
#[derive(Clone, Copy)]
pub union perf_event_attr__bindgen_ty_1 {
    pub sample_period: u64,
    pub sample_freq: u64,
}

/// `wakeup_events` / `wakeup_watermark` union.
#[repr(C)]
#[derive(Clone, Copy)]
pub union perf_event_attr__bindgen_ty_2 {
    pub wakeup_events: u32,
    pub wakeup_watermark: u32,
}

/// `config1` / `bp_addr` union.
#[repr(C)]
#[derive(Clone, Copy)]
pub union perf_event_attr__bindgen_ty_3 {
    pub config1: u64,
    pub bp_addr: u64,
}

/// `config2` / `bp_len` union.
#[repr(C)]
#[derive(Clone, Copy)]
pub union perf_event_attr__bindgen_ty_4 {
    pub config2: u64,
    pub bp_len: u64,
}

macro_rules! bitfield_accessor {
    ($get:ident, $set:ident, $bit:expr, $width:expr) => {
        pub fn $get(&self) -> u64 {
            (self._bitfield_1 >> $bit) & ((1u64 << $width) - 1)
        }
        pub fn $set(&mut self, val: u64) {
            let mask = ((1u64 << $width) - 1) << $bit;
            self._bitfield_1 = (self._bitfield_1 & !mask) | ((val << $bit) & mask);
        }
    };
}

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L385
#[repr(C)]
#[derive(Clone, Copy)]
pub struct perf_event_attr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub __bindgen_anon_1: perf_event_attr__bindgen_ty_1,
    pub sample_type: u64,
    pub read_format: u64,
    _bitfield_1: u64,
    pub __bindgen_anon_2: perf_event_attr__bindgen_ty_2,
    pub bp_type: u32,
    pub __bindgen_anon_3: perf_event_attr__bindgen_ty_3,
    pub __bindgen_anon_4: perf_event_attr__bindgen_ty_4,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
    pub aux_sample_size: u32,
    pub __reserved_3: u32,
    pub sig_data: u64,
    pub config3: u64,
}

impl Default for perf_event_attr {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

impl perf_event_attr {
    bitfield_accessor!(disabled, set_disabled, 0, 1);
    bitfield_accessor!(inherit, set_inherit, 1, 1);
    bitfield_accessor!(pinned, set_pinned, 2, 1);
    bitfield_accessor!(exclusive, set_exclusive, 3, 1);
    bitfield_accessor!(exclude_user, set_exclude_user, 4, 1);
    bitfield_accessor!(exclude_kernel, set_exclude_kernel, 5, 1);
    bitfield_accessor!(exclude_hv, set_exclude_hv, 6, 1);
    bitfield_accessor!(exclude_idle, set_exclude_idle, 7, 1);
    bitfield_accessor!(mmap, set_mmap, 8, 1);
    bitfield_accessor!(comm, set_comm, 9, 1);
    bitfield_accessor!(freq, set_freq, 10, 1);
    bitfield_accessor!(inherit_stat, set_inherit_stat, 11, 1);
    bitfield_accessor!(enable_on_exec, set_enable_on_exec, 12, 1);
    bitfield_accessor!(task, set_task, 13, 1);
    bitfield_accessor!(watermark, set_watermark, 14, 1);
    bitfield_accessor!(precise_ip, set_precise_ip, 15, 2);
    bitfield_accessor!(mmap_data, set_mmap_data, 17, 1);
    bitfield_accessor!(sample_id_all, set_sample_id_all, 18, 1);
    bitfield_accessor!(exclude_host, set_exclude_host, 19, 1);
    bitfield_accessor!(exclude_guest, set_exclude_guest, 20, 1);
    bitfield_accessor!(
        exclude_callchain_kernel,
        set_exclude_callchain_kernel,
        21,
        1
    );
    bitfield_accessor!(exclude_callchain_user, set_exclude_callchain_user, 22, 1);
    bitfield_accessor!(mmap2, set_mmap2, 23, 1);
    bitfield_accessor!(comm_exec, set_comm_exec, 24, 1);
    bitfield_accessor!(use_clockid, set_use_clockid, 25, 1);
    bitfield_accessor!(context_switch, set_context_switch, 26, 1);
    bitfield_accessor!(write_backward, set_write_backward, 27, 1);
    bitfield_accessor!(namespaces, set_namespaces, 28, 1);
    bitfield_accessor!(ksymbol, set_ksymbol, 29, 1);
    bitfield_accessor!(bpf_event, set_bpf_event, 30, 1);
    bitfield_accessor!(cgroup, set_cgroup, 32, 1);
    bitfield_accessor!(text_poke, set_text_poke, 33, 1);
    bitfield_accessor!(build_id, set_build_id, 34, 1);
    bitfield_accessor!(inherit_thread, set_inherit_thread, 35, 1);
    bitfield_accessor!(remove_on_exec, set_remove_on_exec, 36, 1);
    bitfield_accessor!(sigtrap, set_sigtrap, 37, 1);
}

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L1016
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct perf_event_header {
    pub type_: u32,
    pub misc: u16,
    pub size: u16,
}

/// `perf_event_mmap_page`, the kernel-mapped control page at offset 0 of a
/// sampling ring buffer. Layout documented in full at `sample::arena`.
#[repr(C)]
pub struct perf_event_mmap_page {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    pub __reserved_1: u32,
    pub time_cycles: u64,
    pub time_mask: u64,
    pub __reserved: [u8; 116 * 8],
    pub data_head: u64,
    pub data_tail: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub aux_head: u64,
    pub aux_tail: u64,
    pub aux_offset: u64,
    pub aux_size: u64,
}
