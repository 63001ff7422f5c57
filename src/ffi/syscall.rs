use std::ffi::CString;
use std::fs::File;
use std::io::{Error, IoSlice, IoSliceMut, Result};
use std::mem::{size_of, transmute, MaybeUninit};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use libc::epoll_event;

use super::Attr;

pub fn perf_event_open(attr: &Attr, pid: i32, cpu: i32, group_fd: i32, flags: u64) -> Result<File> {
    let num = libc::SYS_perf_event_open;
    let fd = unsafe { libc::syscall(num, attr, pid, cpu, group_fd, flags) };
    if fd != -1 {
        Ok(unsafe { File::from_raw_fd(fd as _) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ioctl(file: &File, op: u64) -> Result<i32> {
    let fd = file.as_raw_fd();
    let result = unsafe { libc::ioctl(fd, op as _) };
    if result != -1 {
        Ok(result)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ioctl_arg(file: &File, op: u64, arg: u64) -> Result<i32> {
    let fd = file.as_raw_fd();
    let result = unsafe { libc::ioctl(fd, op as _, arg) };
    if result != -1 {
        Ok(result)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ioctl_argp<T: ?Sized>(file: &File, op: u64, argp: &mut T) -> Result<i32> {
    let fd = file.as_raw_fd();
    let result = unsafe { libc::ioctl(fd, op as _, argp) };
    if result != -1 {
        Ok(result)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn read(file: &File, buf: &mut [u8]) -> Result<usize> {
    let fd = file.as_raw_fd();
    let count = buf.len();
    let buf = buf.as_mut_ptr() as _;
    let bytes = unsafe { libc::read(fd, buf, count) };
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn read_uninit(file: &File, buf: &mut [MaybeUninit<u8>]) -> Result<usize> {
    let buf = unsafe { transmute::<&mut [_], &mut [u8]>(buf) };
    read(file, buf)
}

pub unsafe fn mmap<T>(
    ptr: *mut (),
    len: usize,
    prot: i32,
    flags: i32,
    file: &File,
    offset: i64,
) -> Result<*mut T> {
    let ptr = libc::mmap(ptr as _, len, prot, flags, file.as_raw_fd(), offset);
    if ptr != libc::MAP_FAILED {
        Ok(ptr as _)
    } else {
        Err(Error::last_os_error())
    }
}

/// `mmap` variant for anonymous and fixed-address mappings that have no
/// backing file (reserving address space, installing the second half of a
/// double-mapped ring buffer).
pub unsafe fn mmap_raw<T>(
    ptr: *mut (),
    len: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> Result<*mut T> {
    let ptr = libc::mmap(ptr as _, len, prot, flags, fd, offset);
    if ptr != libc::MAP_FAILED {
        Ok(ptr as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn munmap<T>(ptr: *mut T, len: usize) -> Result<()> {
    let result = libc::munmap(ptr as _, len);
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn epoll_create1(flags: i32) -> Result<File> {
    let fd = unsafe { libc::epoll_create1(flags) };
    if fd != -1 {
        Ok(unsafe { File::from_raw_fd(fd as _) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn epoll_ctl(epoll: &File, op: i32, file: &File, event: &mut epoll_event) -> Result<()> {
    let result = unsafe { libc::epoll_ctl(epoll.as_raw_fd(), op, file.as_raw_fd(), event as _) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn epoll_wait<'a>(
    epoll: &File,
    events: &'a mut [epoll_event],
    timeout: i32,
) -> Result<&'a [epoll_event]> {
    let len = unsafe {
        libc::epoll_wait(
            epoll.as_raw_fd(),
            events.as_mut_ptr(),
            events.len() as _,
            timeout,
        )
    };
    if len != -1 {
        Ok(&events[..len as _])
    } else {
        Err(Error::last_os_error())
    }
}

/// Creates an anonymous memory-file usable as a shared ring buffer's backing store.
pub fn memfd_create(name: &str, flags: u32) -> Result<File> {
    let name = CString::new(name).map_err(|e| Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let fd = unsafe { libc::memfd_create(name.as_ptr(), flags) };
    if fd != -1 {
        Ok(unsafe { File::from_raw_fd(fd) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ftruncate(file: &File, len: i64) -> Result<()> {
    let result = unsafe { libc::ftruncate(file.as_raw_fd(), len) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// Non-blocking self-pipe replacement used as a monitor's stop signal.
pub fn eventfd(initval: u32, flags: i32) -> Result<File> {
    let fd = unsafe { libc::eventfd(initval, flags) };
    if fd != -1 {
        Ok(unsafe { File::from_raw_fd(fd) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn eventfd_write(file: &File, val: u64) -> Result<()> {
    let result = unsafe { libc::eventfd_write(file.as_raw_fd(), val) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn sched_setaffinity(pid: i32, cpu: usize) -> Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(cpu, &mut set);
        let result = libc::sched_setaffinity(pid, size_of::<libc::cpu_set_t>(), &set);
        if result != -1 {
            Ok(())
        } else {
            Err(Error::last_os_error())
        }
    }
}

pub fn sched_getaffinity(pid: i32) -> Result<Vec<usize>> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        let result = libc::sched_getaffinity(pid, size_of::<libc::cpu_set_t>(), &mut set);
        if result == -1 {
            return Err(Error::last_os_error());
        }
        let cpus = (0..libc::CPU_SETSIZE as usize)
            .filter(|&cpu| libc::CPU_ISSET(cpu, &set))
            .collect();
        Ok(cpus)
    }
}

/// Number of CPUs currently online, per `pid 0`'s affinity mask.
pub fn online_cpu_count() -> Result<usize> {
    Ok(sched_getaffinity(0)?.len())
}

pub fn socket(domain: i32, ty: i32, protocol: i32) -> Result<OwnedFd> {
    let fd = unsafe { libc::socket(domain, ty, protocol) };
    if fd != -1 {
        Ok(unsafe { std::os::fd::OwnedFd::from_raw_fd(fd) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn bind_unix(fd: RawFd, path: &str) -> Result<()> {
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as _;
    let bytes = path.as_bytes();
    assert!(bytes.len() < addr.sun_path.len());
    for (dst, &src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = src as _;
    }
    let len = size_of::<libc::sockaddr_un>() as libc::socklen_t;
    let result =
        unsafe { libc::bind(fd, &addr as *const _ as *const libc::sockaddr, len) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn connect_unix(fd: RawFd, path: &str) -> Result<()> {
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as _;
    let bytes = path.as_bytes();
    assert!(bytes.len() < addr.sun_path.len());
    for (dst, &src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = src as _;
    }
    let len = size_of::<libc::sockaddr_un>() as libc::socklen_t;
    let result =
        unsafe { libc::connect(fd, &addr as *const _ as *const libc::sockaddr, len) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn listen(fd: RawFd, backlog: i32) -> Result<()> {
    let result = unsafe { libc::listen(fd, backlog) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn accept(fd: RawFd) -> Result<OwnedFd> {
    let result = unsafe { libc::accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
    if result != -1 {
        Ok(unsafe { OwnedFd::from_raw_fd(result) })
    } else {
        Err(Error::last_os_error())
    }
}

/// Sends `payload` over a connected `SOCK_SEQPACKET` socket together with a file
/// descriptor, via an `SCM_RIGHTS` ancillary message.
const CMSG_BUF_LEN: usize = 32;

pub fn sendmsg_fd(fd: RawFd, payload: &[u8], pass_fd: RawFd) -> Result<()> {
    let mut iov = [IoSlice::new(payload)];
    let mut cmsg_buf = [0u8; CMSG_BUF_LEN];

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = iov.as_mut_ptr() as *mut libc::iovec;
    msg.msg_iovlen = iov.len() as _;
    msg.msg_control = cmsg_buf.as_mut_ptr() as _;
    msg.msg_controllen = cmsg_buf.len() as _;

    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(size_of::<RawFd>() as _) as _;
        std::ptr::write(libc::CMSG_DATA(cmsg) as *mut RawFd, pass_fd);
    }

    let result = unsafe { libc::sendmsg(fd, &msg, 0) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// Receives a payload plus a single passed file descriptor from a `SOCK_SEQPACKET`
/// socket, the producer side of the shared ring buffer handshake.
pub fn recvmsg_fd(fd: RawFd, payload: &mut [u8]) -> Result<(usize, Option<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(payload)];
    let mut cmsg_buf = [0u8; CMSG_BUF_LEN];

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = iov.as_mut_ptr() as *mut libc::iovec;
    msg.msg_iovlen = iov.len() as _;
    msg.msg_control = cmsg_buf.as_mut_ptr() as _;
    msg.msg_controllen = cmsg_buf.len() as _;

    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n == -1 {
        return Err(Error::last_os_error());
    }

    let mut passed = None;
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        if !cmsg.is_null() && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
            let raw_fd = std::ptr::read(libc::CMSG_DATA(cmsg) as *const RawFd);
            passed = Some(OwnedFd::from_raw_fd(raw_fd));
        }
    }

    Ok((n as usize, passed))
}
