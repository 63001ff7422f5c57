//! Routes decoded ring-buffer records to the typed handler shape writers
//! expect, generalizing what every caller of [`crate::sample::Sampler::iter`]
//! would otherwise have to `match` out by hand.

use std::ffi::CString;

use crate::sample::record::{Record, Task};

/// Which half of a context switch a [`Event::Switch`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchDirection {
    In,
    Out,
}

/// A demultiplexed record, shaped as the handler arguments from the event
/// demultiplexer's dispatch table.
#[derive(Clone, Debug)]
pub enum Event {
    Sample {
        ts: u64,
        tid: u32,
        cpu: Option<u32>,
        ips: Vec<u64>,
        group_values: Option<crate::count::Stat>,
    },
    Mmap {
        pid: u32,
        tid: u32,
        addr: u64,
        len: u64,
        pgoff: u64,
        filename: CString,
    },
    Comm {
        pid: u32,
        tid: u32,
        name: CString,
    },
    Exit {
        tid: u32,
    },
    Fork {
        parent: Task,
        child: Task,
    },
    Switch {
        direction: SwitchDirection,
        ts: u64,
        pid: Option<u32>,
        tid: Option<u32>,
    },
    Lost {
        count: u64,
    },
}

/// Dispatches one decoded record into a typed [`Event`], or `None` for
/// record kinds with no event mapping (`Record::Unknown`).
///
/// Ordering is preserved byte-for-byte since this performs no buffering or
/// reordering of its own: records are mapped one-to-one in call order.
pub fn demux(record: Record) -> Option<Event> {
    match record {
        Record::Sample(s) => Some(Event::Sample {
            ts: s.record_id.time.unwrap_or(0),
            tid: s.record_id.task.as_ref().map(|t| t.tid).unwrap_or(0),
            cpu: s.record_id.cpu,
            ips: s.call_chain.unwrap_or_default(),
            group_values: s.stat,
        }),
        Record::Mmap(m) => Some(Event::Mmap {
            pid: m.task.pid,
            tid: m.task.tid,
            addr: m.addr,
            len: m.len,
            pgoff: m.page_offset,
            filename: m.file,
        }),
        Record::Comm(c) => Some(Event::Comm {
            pid: c.task.pid,
            tid: c.task.tid,
            name: c.comm,
        }),
        Record::Exit(e) => Some(Event::Exit { tid: e.task.tid }),
        Record::Fork(f) => Some(Event::Fork {
            parent: f.parent_task,
            child: f.task,
        }),
        Record::CtxSwitch(cs) => {
            let ts = cs.record_id.as_ref().and_then(|r| r.time).unwrap_or(0);
            let (direction, task) = match cs.info {
                crate::sample::record::ctx::Switch::OutTo { task, .. } => {
                    (SwitchDirection::Out, task)
                }
                crate::sample::record::ctx::Switch::InFrom(task) => (SwitchDirection::In, task),
            };
            let (pid, tid) = match task {
                Some(t) => (Some(t.pid), Some(t.tid)),
                None => (None, None),
            };
            Some(Event::Switch {
                direction,
                ts,
                pid,
                tid,
            })
        }
        Record::LostRecords(l) => Some(Event::Lost {
            count: l.lost_records,
        }),
        Record::LostSamples(l) => Some(Event::Lost {
            count: l.lost_samples,
        }),
        Record::Unknown(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::record::lost::LostRecords;
    use crate::sample::record::RecordId;

    fn no_record_id() -> RecordId {
        RecordId {
            id: None,
            stream_id: None,
            cpu: None,
            task: None,
            time: None,
        }
    }

    #[test]
    fn lost_records_carries_count() {
        let record = Record::LostRecords(Box::new(LostRecords {
            record_id: Some(no_record_id()),
            id: 1,
            lost_records: 42,
        }));
        match demux(record) {
            Some(Event::Lost { count }) => assert_eq!(count, 42),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_record_demuxes_to_none() {
        assert!(demux(Record::Unknown(vec![1, 2, 3])).is_none());
    }
}
