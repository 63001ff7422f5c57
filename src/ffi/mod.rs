pub mod bindings;
pub mod syscall;

pub use bindings::{perf_event_mmap_page as Metadata, perf_event_header};

use std::sync::OnceLock;

// Dereferences the pointer and offsets by the size of the
// pointee type, then returns the dereferenced value.
#[inline]
pub unsafe fn deref_offset<T: Copy>(ptr: &mut *const u8) -> T {
    let val = *(*ptr as *const T);
    *ptr = ptr.add(size_of::<T>());
    val
}

pub type Attr = bindings::perf_event_attr;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize })
}
