use std::io::Result;

use super::{Opts, SampleOn, UseBuildId, WakeUpOn};
use crate::config::{Inherit, OnExecve};
use crate::event::EventConfig;
use crate::ffi::{bindings as b, Attr};

pub(crate) fn from(event_cfg: EventConfig, opts: &Opts) -> Result<Attr> {
    let mut attr = Attr::default();
    attr.size = size_of::<Attr>() as _;

    // event config:

    attr.type_ = event_cfg.ty;
    attr.config = event_cfg.config;
    attr.__bindgen_anon_3.config1 = event_cfg.config1;
    attr.__bindgen_anon_4.config2 = event_cfg.config2;
    attr.config3 = event_cfg.config3;
    attr.bp_type = event_cfg.bp_type;

    // count config:

    macro_rules! then {
        ($then:tt) => {
            attr.$then(1)
        };
    }
    macro_rules! when {
        ($bool:ident, $then:tt) => {
            if opts.exclude.$bool {
                then!($then);
            }
        };
    }
    when!(user, set_exclude_user);
    when!(kernel, set_exclude_kernel);
    when!(hv, set_exclude_hv);
    when!(host, set_exclude_host);
    when!(guest, set_exclude_guest);
    when!(idle, set_exclude_idle);

    attr.set_exclusive(opts.only_group as _);
    attr.set_pinned(opts.pin_on_pmu as _);

    match opts.inherit {
        Some(Inherit::NewChild) => then!(set_inherit),
        Some(Inherit::NewThread) => {
            then!(set_inherit);
            then!(set_inherit_thread);
        }
        None => (),
    }

    match opts.on_execve {
        Some(OnExecve::Enable) => then!(set_enable_on_exec),
        Some(OnExecve::Remove) => then!(set_remove_on_exec),
        None => (),
    }

    attr.read_format = opts.stat_format.as_read_format()?;
    attr.set_disabled(!opts.enable as _);

    // sample config:

    match opts.sample_on {
        SampleOn::Freq(val) => {
            then!(set_freq);
            attr.__bindgen_anon_1.sample_freq = val;
        }
        SampleOn::Count(val) => {
            attr.__bindgen_anon_1.sample_period = val;
        }
    }

    attr.set_precise_ip(opts.sample_skid.as_precise_ip() as _);

    let mut sample_type = 0;
    macro_rules! when {
        ($bool:ident, $flag:ident) => {
            if opts.sample_format.$bool {
                sample_type |= b::$flag;
            }
        };
    }
    when!(stat, PERF_SAMPLE_READ);
    when!(period, PERF_SAMPLE_PERIOD);
    when!(code_addr, PERF_SAMPLE_IP);
    if let Some(it) = opts.sample_format.call_chain.as_ref() {
        attr.set_exclude_callchain_user(it.exclude_user as _);
        attr.set_exclude_callchain_kernel(it.exclude_kernel as _);
        attr.sample_max_stack = it.max_stack_frames;
        sample_type |= b::PERF_SAMPLE_CALLCHAIN;
    }
    macro_rules! when {
        ($bool:ident, $flag:ident) => {
            if opts.record_id_format.$bool {
                sample_type |= b::$flag;
            }
        };
    }
    when!(id, PERF_SAMPLE_ID);
    when!(stream_id, PERF_SAMPLE_STREAM_ID);
    when!(cpu, PERF_SAMPLE_CPU);
    when!(task, PERF_SAMPLE_TID);
    when!(time, PERF_SAMPLE_TIME);
    attr.sample_type = sample_type;

    macro_rules! when {
        ($bool:ident, $then:tt) => {
            if opts.extra_record.$bool {
                attr.$then(1);
            }
        };
    }
    when!(task, set_task);
    when!(comm, set_comm);
    let mmap = &opts.extra_record.mmap;
    mmap.code.then(|| then!(set_mmap));
    mmap.data.then(|| then!(set_mmap_data));
    if let Some(UseBuildId(build_id)) = &mmap.ext {
        then!(set_mmap);
        then!(set_mmap2);
        attr.set_build_id(*build_id as _);
    }
    when!(ctx_switch, set_context_switch);

    attr.set_sample_id_all(opts.record_id_all as _);

    match opts.wake_up.on {
        WakeUpOn::Bytes(n) => {
            then!(set_watermark);
            attr.__bindgen_anon_2.wakeup_watermark = n as _;
        }
        WakeUpOn::Samples(n) => {
            attr.__bindgen_anon_2.wakeup_events = n as _;
        }
    }

    if let Some(clock) = opts.timer.as_ref() {
        then!(set_use_clockid);
        use crate::config::Clock;
        attr.clockid = match clock {
            Clock::Tai => b::CLOCK_TAI,
            Clock::RealTime => b::CLOCK_REALTIME,
            Clock::BootTime => b::CLOCK_BOOTTIME,
            Clock::Monotonic => b::CLOCK_MONOTONIC,
            Clock::MonotonicRaw => b::CLOCK_MONOTONIC_RAW,
        } as _;
    }

    Ok(attr)
}
