use super::{RecordId, SampleType};
use crate::ffi::deref_offset;

/// Records dropped before being written to the ring buffer (`PERF_RECORD_LOST`).
#[derive(Clone)]
pub struct LostRecords {
    pub record_id: Option<RecordId>,

    pub id: u64,
    pub lost_records: u64,
}

impl LostRecords {
    pub(crate) unsafe fn from_ptr(mut ptr: *const u8, sample_id_all: Option<SampleType>) -> Self {
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L891
        let id = deref_offset(&mut ptr);
        let lost_records = deref_offset(&mut ptr);
        let record_id = sample_id_all.map(|SampleType(ty)| RecordId::from_ptr(ptr, ty));

        Self {
            record_id,
            id,
            lost_records,
        }
    }
}

super::debug!(LostRecords {
    {record_id?},
    {id},
    {lost_records},
});

/// Samples dropped due to throttling (`PERF_RECORD_LOST_SAMPLES`).
#[derive(Clone)]
pub struct LostSamples {
    pub record_id: Option<RecordId>,

    pub lost_samples: u64,
}

impl LostSamples {
    pub(crate) unsafe fn from_ptr(mut ptr: *const u8, sample_id_all: Option<SampleType>) -> Self {
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L1105
        let lost_samples = deref_offset(&mut ptr);
        let record_id = sample_id_all.map(|SampleType(ty)| RecordId::from_ptr(ptr, ty));

        Self {
            record_id,
            lost_samples,
        }
    }
}

super::debug!(LostSamples {
    {record_id?},
    {lost_samples},
});
