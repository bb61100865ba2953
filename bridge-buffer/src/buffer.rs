use std::{
    ffi::CString,
    num::NonZeroUsize,
    os::fd::{AsRawFd, OwnedFd},
    sync::atomic::{fence, Ordering},
    thread,
    time::Duration,
};

use nix::{
    fcntl::OFlag,
    sys::{
        mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags},
        stat::Mode,
    },
    unistd::ftruncate,
};

use crate::{
    error::BufferError,
    state::{BufferState, BufferType},
};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A group-shared contiguous array of `f64`, the last two cells of which
/// are the control cells described in the data model: index `len - 1` is
/// the buffer-state cell, index `len - 2` is the header.
///
/// Backed by a POSIX named shared-memory segment (`shm_open`) rather than
/// `memfd_create`, because the ranks sharing this buffer are independent
/// OS processes that rendezvous by name, not parent/child pairs that
/// inherit a file descriptor across `fork`.
pub struct SharedBuffer {
    name: String,
    fd: OwnedFd,
    ptr: *mut f64,
    len: usize,
    owner: bool,
}

unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Allocates a new segment of `len` `f64` cells (payload plus the two
    /// control cells) and zeroes it. Only the rank that calls `create`
    /// should later call [`SharedBuffer::destroy`]; other ranks attach
    /// with [`SharedBuffer::open`].
    pub fn create(name: &str, len: usize) -> Result<Self, BufferError> {
        let c_name = shm_name(name)?;
        let size = byte_len(len);

        let fd = shm_open(
            c_name.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|source| BufferError::ShmOpen {
            name: name.to_owned(),
            source,
        })?;

        ftruncate(fd.as_raw_fd(), size as i64).map_err(|source| {
            BufferError::Truncate {
                name: name.to_owned(),
                source,
            }
        })?;

        let ptr = map(&fd, size, name)?;
        // SAFETY: freshly truncated segment is exactly `size` bytes and
        // mapped read/write; zero-filled by the kernel already, but we
        // write explicitly so the Wait state is observable even if a
        // future implementation reuses a stale segment.
        unsafe {
            std::ptr::write_bytes(ptr, 0, len);
            std::ptr::write_volatile(
                ptr.add(len - 1),
                BufferState::Wait.as_f64(),
            );
        }

        tracing::debug!(name, len, "created shared buffer");
        Ok(Self {
            name: name.to_owned(),
            fd,
            ptr,
            len,
            owner: true,
        })
    }

    /// Attaches to a segment created elsewhere by [`SharedBuffer::create`].
    pub fn open(name: &str, len: usize) -> Result<Self, BufferError> {
        let c_name = shm_name(name)?;
        let size = byte_len(len);

        let fd = shm_open(c_name.as_c_str(), OFlag::O_RDWR, Mode::empty())
            .map_err(|source| BufferError::ShmOpen {
                name: name.to_owned(),
                source,
            })?;

        let ptr = map(&fd, size, name)?;
        Ok(Self {
            name: name.to_owned(),
            fd,
            ptr,
            len,
            owner: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Number of payload cells (capacity minus the two control cells).
    pub fn payload_len(&self) -> usize {
        self.len - 2
    }

    fn state_index(&self) -> usize {
        self.len - 1
    }

    fn header_index(&self) -> usize {
        self.len - 2
    }

    /// Reads the buffer-state cell with an acquire fence, so that any
    /// payload write that preceded the producer's matching release store
    /// is visible to the caller once this returns.
    pub fn get_state(&self) -> Result<BufferState, BufferError> {
        let raw = unsafe { std::ptr::read_volatile(self.ptr.add(self.state_index())) };
        fence(Ordering::Acquire);
        BufferState::from_f64(raw)
    }

    /// Writes the buffer-state cell with a release fence, making any
    /// payload write performed before this call visible to a consumer
    /// that subsequently observes the new state.
    pub fn set_state(&self, state: BufferState) {
        fence(Ordering::Release);
        unsafe {
            std::ptr::write_volatile(self.ptr.add(self.state_index()), state.as_f64());
        }
    }

    /// Busy-waits, sleeping [`POLL_INTERVAL`] between polls, until the
    /// state cell equals `want`. This is the sole coordination mechanism
    /// between the receiver and sender roles (see concurrency model).
    pub fn wait_for_state(&self, want: BufferState) -> Result<(), BufferError> {
        loop {
            if self.get_state()? == want {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn get_header(&self) -> i64 {
        let raw = unsafe { std::ptr::read_volatile(self.ptr.add(self.header_index())) };
        raw as i64
    }

    pub fn set_header(&self, header: i64) {
        unsafe {
            std::ptr::write_volatile(self.ptr.add(self.header_index()), header as f64);
        }
    }

    /// Returns a copy of `len` payload cells starting at `start`. Copies
    /// rather than borrows, because the underlying memory may be mutated
    /// by another process at any time outside of the state-cell protocol.
    pub fn get_slice(&self, start: usize, len: usize) -> Result<Vec<f64>, BufferError> {
        self.check_range(start, len)?;
        let mut out = vec![0.0f64; len];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = unsafe { std::ptr::read_volatile(self.ptr.add(start + i)) };
        }
        Ok(out)
    }

    pub fn write_slice(&self, start: usize, values: &[f64]) -> Result<(), BufferError> {
        self.check_range(start, values.len())?;
        for (i, value) in values.iter().enumerate() {
            unsafe {
                std::ptr::write_volatile(self.ptr.add(start + i), *value);
            }
        }
        Ok(())
    }

    fn check_range(&self, start: usize, len: usize) -> Result<(), BufferError> {
        if start + len > self.payload_len() {
            return Err(BufferError::IndexOutOfRange {
                index: start + len,
                capacity: self.payload_len(),
            });
        }
        Ok(())
    }

    /// Unmaps the segment and, if this handle owns it, unlinks the name
    /// so the kernel reclaims the memory once the last mapping drops.
    pub fn destroy(self) -> Result<(), BufferError> {
        let size = byte_len(self.len);
        unsafe {
            munmap(self.ptr.cast(), size).map_err(|source| BufferError::Munmap {
                name: self.name.clone(),
                source,
            })?;
        }
        if self.owner {
            let c_name = shm_name(&self.name)?;
            shm_unlink(c_name.as_c_str()).map_err(|source| BufferError::ShmUnlink {
                name: self.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        let size = byte_len(self.len);
        unsafe {
            if let Err(err) = munmap(self.ptr.cast(), size) {
                tracing::warn!(name = %self.name, %err, "munmap failed during drop");
            }
        }
    }
}

fn byte_len(len: usize) -> usize {
    len * std::mem::size_of::<f64>()
}

fn shm_name(name: &str) -> Result<CString, BufferError> {
    let full = if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("/{name}")
    };
    CString::new(full).map_err(|_| BufferError::InvalidName(name.to_owned()))
}

fn map(fd: &OwnedFd, size: usize, name: &str) -> Result<*mut f64, BufferError> {
    let non_zero_size =
        NonZeroUsize::new(size).ok_or_else(|| BufferError::IndexOutOfRange {
            index: 0,
            capacity: 0,
        })?;
    let ptr = unsafe {
        mmap(
            None,
            non_zero_size,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
        .map_err(|source| BufferError::Mmap {
            name: name.to_owned(),
            source,
        })?
    };
    Ok(ptr.cast())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn unique_name(tag: &str) -> String {
        format!(
            "bridge-buffer-test-{tag}-{}",
            std::process::id()
        )
    }

    #[test]
    fn state_and_header_round_trip() {
        let name = unique_name("state");
        let buf = SharedBuffer::create(&name, 6).unwrap();
        assert_eq!(buf.get_state().unwrap(), BufferState::Wait);

        buf.set_header(3);
        assert_eq!(buf.get_header(), 3);

        buf.set_state(BufferState::ReadyToTransform);
        assert_eq!(buf.get_state().unwrap(), BufferState::ReadyToTransform);

        buf.destroy().unwrap();
    }

    #[test]
    fn payload_round_trip() {
        let name = unique_name("payload");
        let buf = SharedBuffer::create(&name, 8).unwrap();
        buf.write_slice(0, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(buf.get_slice(0, 3).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(buf.payload_len(), 6);
        buf.destroy().unwrap();
    }

    #[test]
    fn out_of_range_is_rejected() {
        let name = unique_name("range");
        let buf = SharedBuffer::create(&name, 4).unwrap();
        assert!(buf.get_slice(1, 5).is_err());
        buf.destroy().unwrap();
    }

    #[test]
    fn open_attaches_to_existing_segment() {
        let name = unique_name("attach");
        let owner = Arc::new(SharedBuffer::create(&name, 6).unwrap());
        owner.write_slice(0, &[9.0]).unwrap();
        owner.set_state(BufferState::ReadyToReceive);

        let attached = SharedBuffer::open(&name, 6).unwrap();
        assert_eq!(attached.get_slice(0, 1).unwrap(), vec![9.0]);
        assert_eq!(attached.get_state().unwrap(), BufferState::ReadyToReceive);
        drop(attached);

        Arc::try_unwrap(owner).unwrap().destroy().unwrap();
    }

    #[test]
    fn wait_for_state_observes_another_thread_write() {
        let name = unique_name("wait");
        let buf = Arc::new(SharedBuffer::create(&name, 6).unwrap());
        let writer = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            writer.set_state(BufferState::ReadyToTransform);
        });
        buf.wait_for_state(BufferState::ReadyToTransform).unwrap();
        handle.join().unwrap();
        Arc::try_unwrap(buf).unwrap().destroy().unwrap();
    }
}
