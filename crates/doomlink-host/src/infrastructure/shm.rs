//! POSIX shared-memory frame publishing.
//!
//! Each published frame goes through a full open → size → map → copy → sync
//! → unmap cycle.  The object itself persists between frames and is unlinked
//! when the client picks a different name or the session ends.

use std::ffi::{c_void, OsStr, OsString};
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, MsFlags, ProtFlags};
use nix::sys::stat::Mode;
use thiserror::Error;
use tracing::{debug, warn};

use super::signal::CancelToken;

/// Shared-memory failures.  All of them end the session.
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("failed to create frame data shared memory object {name:?}: {source}")]
    Open {
        name: OsString,
        #[source]
        source: Errno,
    },

    #[error("failed to set size of frame data shared memory: {0}")]
    Resize(#[source] Errno),

    #[error("failed to map frame data shared memory: {0}")]
    Map(#[source] Errno),

    #[error("failed to synchronize frame data shared memory: {0}")]
    Sync(#[source] Errno),

    #[error("cannot publish an empty frame")]
    EmptyFrame,

    #[error("interrupted by cancellation request")]
    Cancelled,
}

/// A writable mapping that is unmapped on drop.
struct Mapping {
    ptr: NonNull<c_void>,
    len: NonZeroUsize,
}

impl Mapping {
    fn new(fd: &OwnedFd, len: NonZeroUsize) -> Result<Self, ShmError> {
        // SAFETY: a fresh shared mapping of an fd we own; no existing Rust
        // references alias it.
        let ptr = unsafe {
            mman::mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                0,
            )
        }
        .map_err(ShmError::Map)?;
        Ok(Self { ptr, len })
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is `len` bytes, readable and writable, and
        // lives as long as `self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<u8>(), self.len.get()) }
    }

    fn sync(&self) -> Result<(), ShmError> {
        // SAFETY: `ptr`/`len` describe a live mapping created by mmap.
        unsafe { mman::msync(self.ptr, self.len.get(), MsFlags::MS_SYNC) }.map_err(ShmError::Sync)
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: unmapping the region we mapped; no slices outlive `self`.
        if let Err(e) = unsafe { mman::munmap(self.ptr, self.len.get()) } {
            warn!("failed to unmap frame data shared memory: {e}");
        }
    }
}

/// Named shared-memory object that frames are copied into.
///
/// The name is kept as the exact bytes the client sent; it need not be UTF-8.
#[derive(Debug)]
pub struct SharedFrame {
    name: OsString,
}

impl SharedFrame {
    /// Targets the object `name`.  Nothing is created until the first
    /// [`publish`](Self::publish).
    pub fn new(name: impl Into<OsString>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Copies `pixels` into the object, sized to exactly `pixels.len()`, and
    /// waits until the copy is synced.
    ///
    /// # Errors
    ///
    /// Returns a [`ShmError`] if any step before the unmap fails.
    pub fn publish(&self, pixels: &[u8], cancel: &CancelToken) -> Result<(), ShmError> {
        let len = NonZeroUsize::new(pixels.len()).ok_or(ShmError::EmptyFrame)?;

        let fd = mman::shm_open(
            self.name.as_os_str(),
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|source| ShmError::Open {
            name: self.name.clone(),
            source,
        })?;

        let size = nix::libc::off_t::try_from(pixels.len())
            .map_err(|_| ShmError::Resize(Errno::EFBIG))?;
        loop {
            match nix::unistd::ftruncate(&fd, size) {
                Ok(()) => break,
                Err(Errno::EINTR) if cancel.is_cancelled() => return Err(ShmError::Cancelled),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(ShmError::Resize(e)),
            }
        }

        let mut mapping = Mapping::new(&fd, len)?;
        // The mapping keeps the object alive; the descriptor is not needed.
        drop(fd);

        mapping.as_mut_slice().copy_from_slice(pixels);
        mapping.sync()
    }

    /// Removes the object.  A missing object is not an error: the client may
    /// already have unlinked it.
    pub fn unlink(self) {
        let name = self.name.to_string_lossy();
        match mman::shm_unlink(self.name.as_os_str()) {
            Ok(()) => debug!(name = %name, "frame shared memory object removed"),
            Err(Errno::ENOENT) => {}
            Err(e) => warn!(name = %name, "failed to delete frame data shared memory object: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
