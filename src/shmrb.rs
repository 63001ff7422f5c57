//! Double-mapped wrap-free ring buffer shared with an injected producer
//! (accelerator agent) over a memory-file, set up through a Unix-domain
//! `SCM_RIGHTS` handshake.
//!
//! The data region is mapped twice, back to back, into one contiguous
//! address range (`[data | data]`), so any in-range read or write of up to
//! `size` bytes starting anywhere in the first copy is automatically
//! contiguous even if it logically wraps — removing split-record handling
//! from the hot path, unlike the kernel ring buffer in [`crate::sample::rb`].

use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ffi::page_size;
use crate::ffi::syscall::{eventfd, ftruncate, memfd_create, mmap_raw, munmap};
use crate::scope::MeasurementKind;

pub const WIRE_VERSION: u64 = 1;
const HEADER_SIZE: usize = 64;

/// Fixed 64-byte header at the start of the shared memory-file. Field
/// offsets match the wire format in full so a non-Rust producer can write
/// it directly.
#[repr(C)]
struct RawHeader {
    version: u64,
    size: u64,
    head: u64,
    tail: u64,
    producer_pid: i64,
    consumer_ready: u64,
    clockid: i32,
    _pad: u32,
}

const _: () = assert!(std::mem::size_of::<RawHeader>() <= HEADER_SIZE);

/// Typed view over the mapped header, using the same
/// `AtomicU64::from_ptr`-over-shared-memory idiom the kernel ring-buffer
/// reader uses for its control page.
struct Header(NonNull<RawHeader>);

impl Header {
    unsafe fn at(ptr: NonNull<u8>) -> Self {
        Self(ptr.cast())
    }

    fn raw(&self) -> &RawHeader {
        unsafe { self.0.as_ref() }
    }

    fn head(&self) -> &AtomicU64 {
        unsafe { AtomicU64::from_ptr(&mut (*self.0.as_ptr()).head) }
    }

    fn tail(&self) -> &AtomicU64 {
        unsafe { AtomicU64::from_ptr(&mut (*self.0.as_ptr()).tail) }
    }

    fn consumer_ready(&self) -> &AtomicU64 {
        unsafe { AtomicU64::from_ptr(&mut (*self.0.as_ptr()).consumer_ready) }
    }

    fn data_size(&self) -> usize {
        self.raw().size as usize
    }
}

/// Owns the double mapping: `base` points at the header page, `data`
/// points just past it, and `[data, data + 2*data_size)` is backed by the
/// same physical pages mapped twice.
struct Mapping {
    base: NonNull<u8>,
    total_len: usize,
    data_size: usize,
}

impl Mapping {
    fn create(file: &File, data_size: usize) -> Result<Self> {
        let page = page_size();
        assert!(data_size % page == 0, "shmrb data region must be page-aligned");

        let reserve_len = page + 2 * data_size;
        // Reserve a contiguous address range to install the real mappings into.
        let base = unsafe {
            mmap_raw::<u8>(
                std::ptr::null_mut(),
                reserve_len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )?
        };

        let prot = libc::PROT_READ | libc::PROT_WRITE;
        unsafe {
            // Header + first copy of the data region.
            mmap_raw::<u8>(
                base as *mut (),
                page + data_size,
                prot,
                libc::MAP_SHARED | libc::MAP_FIXED,
                file.as_raw_fd(),
                0,
            )?;
            // Second copy of the data region, installed right after the first.
            mmap_raw::<u8>(
                base.add(page + data_size) as *mut (),
                data_size,
                prot,
                libc::MAP_SHARED | libc::MAP_FIXED,
                file.as_raw_fd(),
                page as i64,
            )?;
        }

        Ok(Self {
            base: NonNull::new(base).expect("mmap with MAP_FIXED does not return null"),
            total_len: reserve_len,
            data_size,
        })
    }

    fn header_ptr(&self) -> NonNull<u8> {
        self.base
    }

    fn data_ptr(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(page_size())) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        let _ = unsafe { munmap(self.base.as_ptr(), self.total_len) };
    }
}

/// One endpoint (producer or consumer) of a shared ring buffer.
pub struct ShmRb {
    _file: File,
    mapping: Mapping,
    header: Header,
}

impl ShmRb {
    /// Creates a new memory-file of `1 + data_pages` pages, writes the
    /// header, and maps it with the data region doubled.
    pub fn create(data_pages: usize, clockid: i32) -> Result<Self> {
        let page = page_size();
        let data_size = data_pages * page;

        let file = memfd_create("nodetrace-shmrb", 0)?;
        ftruncate(&file, (page + data_size) as i64)?;

        let mapping = Mapping::create(&file, data_size)?;
        let header = unsafe { Header::at(mapping.header_ptr()) };

        unsafe {
            let raw = header.0.as_ptr();
            (*raw).version = WIRE_VERSION;
            (*raw).size = data_size as u64;
            (*raw).head = 0;
            (*raw).tail = 0;
            (*raw).producer_pid = std::process::id() as i64;
            (*raw).consumer_ready = 0;
            (*raw).clockid = clockid;
        }

        Ok(Self {
            _file: file,
            mapping,
            header,
        })
    }

    /// Maps an already-created memory-file received over the handshake
    /// socket. Validates the wire version.
    pub fn from_file(file: File) -> Result<Self> {
        let len = file.metadata()?.len() as usize;
        let page = page_size();
        if len <= page || (len - page) % page != 0 {
            return Err(Error::new(ErrorKind::InvalidData, "malformed shmrb size"));
        }
        let data_size = len - page;

        let mapping = Mapping::create(&file, data_size)?;
        let header = unsafe { Header::at(mapping.header_ptr()) };
        if header.raw().version != WIRE_VERSION {
            return Err(Error::new(ErrorKind::InvalidData, "shmrb version mismatch"));
        }

        Ok(Self {
            _file: file,
            mapping,
            header,
        })
    }

    pub fn producer_pid(&self) -> i64 {
        self.header.raw().producer_pid
    }

    pub fn clockid(&self) -> i32 {
        self.header.raw().clockid
    }

    /// Consumer side: marks the buffer ready. Must be called after mapping
    /// completes and before the producer is allowed to issue records.
    pub fn mark_consumer_ready(&self) {
        self.header.consumer_ready().store(1, Ordering::Release);
    }

    pub fn consumer_ready(&self) -> bool {
        self.header.consumer_ready().load(Ordering::Acquire) == 1
    }

    fn data(&self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.mapping.data_ptr().as_ptr(), 2 * self.mapping.data_size)
        }
    }

    /// Producer: reserves `size` contiguous bytes, returning a pointer into
    /// the mapped (doubled) region, or `None` if the buffer doesn't have
    /// `size` free bytes. One byte of slack is always kept between head and
    /// tail so `head == tail` is unambiguously "empty".
    pub fn reserve(&self, size: usize) -> Option<NonNull<u8>> {
        let data_size = self.header.data_size();
        let head = self.header.head().load(Ordering::Relaxed);
        let tail = self.header.tail().load(Ordering::Acquire);

        let used = head.wrapping_sub(tail) as usize % data_size;
        if used + size >= data_size {
            return None;
        }

        let offset = (head as usize) % data_size;
        let ptr = unsafe { self.data().as_mut_ptr().add(offset) };
        NonNull::new(ptr)
    }

    /// Producer: advances `head` past a region returned by [`Self::reserve`].
    pub fn commit(&self, size: usize) {
        self.header.head().fetch_add(size as u64, Ordering::Release);
    }

    /// Consumer: returns a pointer to the next `size` readable bytes, or
    /// `None` if fewer than `size` bytes are available.
    pub fn tail(&self, size: usize) -> Option<NonNull<u8>> {
        let data_size = self.header.data_size();
        let head = self.header.head().load(Ordering::Acquire);
        let tail = self.header.tail().load(Ordering::Relaxed);

        let available = head.wrapping_sub(tail) as usize;
        if available < size {
            return None;
        }

        let offset = (tail as usize) % data_size;
        let ptr = unsafe { self.data().as_mut_ptr().add(offset) };
        NonNull::new(ptr)
    }

    /// Consumer: advances `tail` past a region returned by [`Self::tail`].
    pub fn pop(&self, size: usize) {
        self.header.tail().fetch_add(size as u64, Ordering::Release);
    }
}

/// Sends the producer's memory-file, tagged with `kind`, over a connected
/// `SOCK_SEQPACKET` socket — the setup handshake's producer side.
pub fn send_handshake(socket_fd: RawFd, kind: MeasurementKind, rb_file: &File) -> Result<()> {
    let tag = kind as u64;
    crate::ffi::syscall::sendmsg_fd(socket_fd, &tag.to_le_bytes(), rb_file.as_raw_fd())
}

/// Receives a producer's memory-file and its `MeasurementKind` tag on the
/// consumer side of the handshake socket.
pub fn accept_handshake(socket_fd: RawFd) -> Result<(MeasurementKind, File)> {
    let mut payload = [0u8; 8];
    let (n, fd) = crate::ffi::syscall::recvmsg_fd(socket_fd, &mut payload)?;
    if n != 8 {
        return Err(Error::new(ErrorKind::InvalidData, "short handshake payload"));
    }
    let fd = fd.ok_or_else(|| Error::new(ErrorKind::InvalidData, "handshake carried no fd"))?;
    let tag = u64::from_le_bytes(payload);
    let kind = measurement_kind_from_tag(tag)
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("unknown measurement kind tag {tag}")))?;
    let file = unsafe { File::from_raw_fd(fd.into_raw_fd()) };
    Ok((kind, file))
}

fn measurement_kind_from_tag(tag: u64) -> Option<MeasurementKind> {
    use MeasurementKind::*;
    const KINDS: &[MeasurementKind] = &[
        Sample, Metric, Switch, Syscall, BlockIo, Openmp, Cuda, Nvme, Posixio, UserspaceMetric,
    ];
    KINDS.get(tag as usize).copied()
}

/// A stop event-fd a monitor can select on alongside `epoll`, matching
/// [`crate::ffi::syscall::eventfd`]'s fd-set style.
pub fn stop_fd() -> Result<OwnedFd> {
    let file = eventfd(0, libc::EFD_NONBLOCK)?;
    Ok(OwnedFd::from(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commit_pop_round_trip() {
        let rb = ShmRb::create(1, libc::CLOCK_MONOTONIC).expect("create shmrb");
        rb.mark_consumer_ready();

        let payload = b"hello ring buffer";
        let ptr = rb.reserve(payload.len()).expect("reserve");
        unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), ptr.as_ptr(), payload.len()) };
        rb.commit(payload.len());

        let ptr = rb.tail(payload.len()).expect("tail");
        let read = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), payload.len()) };
        assert_eq!(read, payload);
        rb.pop(payload.len());

        assert!(rb.tail(1).is_none());
    }

    #[test]
    fn wraps_without_splitting() {
        let rb = ShmRb::create(1, libc::CLOCK_MONOTONIC).expect("create shmrb");
        rb.mark_consumer_ready();
        let data_size = rb.header.data_size();

        // Fill, drain, and fill again so head/tail cross the physical end of
        // the first data copy; the doubled mapping should still hand back a
        // single contiguous pointer.
        let chunk = vec![0xABu8; data_size / 4];
        for _ in 0..3 {
            let ptr = rb.reserve(chunk.len()).expect("reserve");
            unsafe { std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr.as_ptr(), chunk.len()) };
            rb.commit(chunk.len());
            let ptr = rb.tail(chunk.len()).expect("tail");
            let read = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), chunk.len()) };
            assert_eq!(read, &chunk[..]);
            rb.pop(chunk.len());
        }
    }

    #[test]
    fn measurement_kind_tag_round_trips() {
        for kind in [
            MeasurementKind::Sample,
            MeasurementKind::Cuda,
            MeasurementKind::UserspaceMetric,
        ] {
            let tag = kind as u64;
            assert_eq!(measurement_kind_from_tag(tag), Some(kind));
        }
    }
}
