use std::mem::size_of;

use super::{comm, ctx, lost, mmap, sample, task, Priv, Record, SampleType};
use crate::ffi::{bindings as b, deref_offset, perf_event_header, Attr};
use crate::sample::rb::CowChunk;

/// Per-counter parsing context, derived once from the owning counter's
/// `Attr` so every record pulled off its ring buffer is decoded the same
/// way. Kept separate from `Counter` itself so a `Sampler` can hold it by
/// reference without borrowing the counter for its whole lifetime.
pub struct UnsafeParser {
    sample_type: u64,
    read_format: u64,
    sample_id_all: bool,
    mmap2: bool,
}

impl UnsafeParser {
    pub(crate) fn from_attr(attr: &Attr) -> Self {
        Self {
            sample_type: attr.sample_type,
            read_format: attr.read_format,
            sample_id_all: attr.sample_id_all() != 0,
            mmap2: attr.mmap2() != 0,
        }
    }

    fn sample_id_all(&self) -> Option<SampleType> {
        self.sample_id_all.then_some(SampleType(self.sample_type))
    }

    /// Decodes one ring-buffer chunk into its privilege level and record.
    ///
    /// # Safety
    ///
    /// `bytes` must hold exactly one well-formed `perf_event_header` plus
    /// its payload, as produced by the kernel into this counter's ring
    /// buffer; this is upheld by `Rb::pop_chunk`.
    pub unsafe fn parse(&self, bytes: &[u8]) -> (Priv, Record) {
        let mut ptr = bytes.as_ptr();
        let header: perf_event_header = deref_offset(&mut ptr);
        let priv_ = Priv::from_misc(header.misc);

        let record = match header.type_ {
            b::PERF_RECORD_SAMPLE => Record::Sample(Box::new(sample::Sample::from_ptr(
                ptr,
                self.sample_type,
                self.read_format,
            ))),
            b::PERF_RECORD_MMAP => Record::Mmap(Box::new(mmap::Mmap::from_ptr(
                ptr,
                header.misc,
                false,
                self.sample_id_all(),
            ))),
            b::PERF_RECORD_MMAP2 => Record::Mmap(Box::new(mmap::Mmap::from_ptr(
                ptr,
                header.misc,
                self.mmap2,
                self.sample_id_all(),
            ))),
            b::PERF_RECORD_COMM => Record::Comm(Box::new(comm::Comm::from_ptr(
                ptr,
                header.misc,
                self.sample_id_all(),
            ))),
            b::PERF_RECORD_EXIT => {
                Record::Exit(Box::new(task::Exit::from_ptr(ptr, self.sample_id_all())))
            }
            b::PERF_RECORD_FORK => {
                Record::Fork(Box::new(task::Fork::from_ptr(ptr, self.sample_id_all())))
            }
            b::PERF_RECORD_SWITCH => Record::CtxSwitch(Box::new(ctx::CtxSwitch::from_ptr(
                ptr,
                false,
                header.misc,
                self.sample_id_all(),
            ))),
            b::PERF_RECORD_SWITCH_CPU_WIDE => {
                Record::CtxSwitch(Box::new(ctx::CtxSwitch::from_ptr(
                    ptr,
                    true,
                    header.misc,
                    self.sample_id_all(),
                )))
            }
            b::PERF_RECORD_LOST => Record::LostRecords(Box::new(lost::LostRecords::from_ptr(
                ptr,
                self.sample_id_all(),
            ))),
            b::PERF_RECORD_LOST_SAMPLES => Record::LostSamples(Box::new(
                lost::LostSamples::from_ptr(ptr, self.sample_id_all()),
            )),
            _ => Record::Unknown(bytes[size_of::<perf_event_header>()..].to_vec()),
        };

        (priv_, record)
    }
}

/// Owning wrapper around [`UnsafeParser`] used by [`Sampler`][crate::sample::Sampler].
pub struct Parser(pub(crate) UnsafeParser);

impl Parser {
    pub(crate) fn parse(&self, chunk: CowChunk<'_>) -> (Priv, Record) {
        unsafe { self.0.parse(chunk.as_bytes()) }
    }
}
