use super::{RecordId, Task};
use crate::count::Stat;
use crate::ffi::{bindings as b, deref_offset};

/// Overflow sample (`PERF_RECORD_SAMPLE`).
///
/// Trimmed to the fields the event demultiplexer's `on_sample(ts, tid, cpu,
/// ip, group_values)` callback actually consumes: identity (who/when/where),
/// instruction pointer, sample period and grouped counter values. The
/// kernel's sample payload also carries LBR branch stacks, register dumps,
/// data-source/weight hints and AUX snapshots for profilers that need them;
/// none of those feed the calling-context tree or counter buffer this crate
/// builds, so they are not decoded here.
#[derive(Clone)]
pub struct Sample {
    /// Always present: every field the demux table needs to key a sample by
    /// (ts, tid, cpu) comes from here, driven by `RecordIdFormat`.
    pub record_id: RecordId,

    /// Instruction pointer, present when `SampleFormat::code_addr` is set.
    pub code_addr: Option<u64>,

    /// Sample period, present when `SampleFormat::period` is set.
    pub period: Option<u64>,

    /// Grouped or standalone counter values, present when
    /// `SampleFormat::stat` is set.
    pub stat: Option<Stat>,

    /// Call chain IP list, present when `SampleFormat::call_chain` is set.
    pub call_chain: Option<Vec<u64>>,
}

impl Sample {
    // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L978
    // struct {
    //     struct perf_event_header header;
    //     { u64 ip;        } && PERF_SAMPLE_IP
    //     { u32 pid, tid;  } && PERF_SAMPLE_TID
    //     { u64 time;      } && PERF_SAMPLE_TIME
    //     { u64 id;        } && PERF_SAMPLE_ID
    //     { u64 stream_id; } && PERF_SAMPLE_STREAM_ID
    //     { u32 cpu, res;  } && PERF_SAMPLE_CPU
    //     { u64 period;    } && PERF_SAMPLE_PERIOD
    //     { struct read_format values; } && PERF_SAMPLE_READ
    //     { u64 nr, u64 ips[nr]; } && PERF_SAMPLE_CALLCHAIN
    // };
    //
    // Unlike every other record kind, `PERF_RECORD_SAMPLE` does not carry a
    // trailing `sample_id` footer: its identity fields are interleaved with
    // the payload in the fixed order above, driven by `attr.sample_type`
    // rather than `attr.sample_id_all`.
    pub(crate) unsafe fn from_ptr(mut ptr: *const u8, sample_type: u64, read_format: u64) -> Self {
        macro_rules! when {
            ($flag:ident, $ty:ty) => {
                (sample_type & b::$flag > 0).then(|| deref_offset::<$ty>(&mut ptr))
            };
        }

        let code_addr = when!(PERF_SAMPLE_IP, u64);
        let task = when!(PERF_SAMPLE_TID, Task);
        let time = when!(PERF_SAMPLE_TIME, u64);
        let id = when!(PERF_SAMPLE_ID, u64);
        let stream_id = when!(PERF_SAMPLE_STREAM_ID, u64);
        let cpu = when!(PERF_SAMPLE_CPU, u32);
        let period = when!(PERF_SAMPLE_PERIOD, u64);

        let stat = (sample_type & b::PERF_SAMPLE_READ > 0)
            .then(|| Stat::from_ptr_offset(&mut ptr, read_format));

        let call_chain = (sample_type & b::PERF_SAMPLE_CALLCHAIN > 0).then(|| {
            let nr: u64 = deref_offset(&mut ptr);
            (0..nr).map(|_| deref_offset(&mut ptr)).collect()
        });

        Self {
            record_id: RecordId {
                id,
                stream_id,
                cpu,
                task,
                time,
            },
            code_addr,
            period,
            stat,
            call_chain,
        }
    }
}

super::debug!(Sample {
    {record_id},
    {code_addr?},
    {period?},
    {stat?},
    {call_chain?},
});
