/*!
 * Shared Memory Region
 * Named POSIX shared memory object mapped into this process
 */

use crate::core::errors::{ChannelError, Result};
use crate::core::limits::SHM_SIZE_WAIT;
use crate::core::sync::SpinWait;
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::time::Instant;

/// A mapped view of one named shared memory object
///
/// Unmapped on drop. Removing the name is a separate, explicit step because
/// the name outlives any single view.
pub struct SharedRegion {
    name: String,
    base: NonNull<u8>,
    len: usize,
    created: bool,
}

// SAFETY: the region is plain mapped memory; what lives in it carries its own
// synchronization.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Open `name`, creating it if absent, and map `len` bytes of it
    ///
    /// A freshly created object is sized to `len` and zero-filled by the OS.
    /// An existing object is never resized: its size must already be `len`,
    /// and one that its creator has not sized within `SHM_SIZE_WAIT` is
    /// rejected as well.
    pub fn open_or_create(name: &str, len: usize) -> Result<Self> {
        let length = NonZeroUsize::new(len).ok_or_else(|| ChannelError::RegionTooSmall {
            region_size: len,
            unit_size: 0,
            header_size: 0,
        })?;

        let (file, created) = open_object(name)?;

        // Only the creator sizes the object, so a second opener can never
        // shrink it beneath a mapping that has already been checked
        if created {
            if let Err(e) = file.set_len(len as u64) {
                // Nobody can use an object we failed to size
                let _ = shm_unlink(name);
                return Err(ChannelError::shm("ftruncate", name, errno_of(&e)));
            }
            debug!("Created shared memory object '{}' of {} bytes", name, len);
        } else {
            let current = wait_for_size(&file, name)?;
            if current != len as u64 {
                return Err(ChannelError::LayoutMismatch {
                    name: name.to_string(),
                    detail: format!("object is {} bytes, expected {}", current, len),
                });
            }
        }

        // SAFETY: fresh mapping chosen by the kernel, backed by a live fd
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                0,
            )
        }
        .map_err(|e| ChannelError::shm("mmap", name, e))?;

        // The mapping keeps the object alive, the descriptor is no longer needed
        drop(file);

        Ok(Self {
            name: name.to_string(),
            base: ptr.cast(),
            len,
            created,
        })
    }

    /// Remove `name` from the shared memory namespace
    ///
    /// Returns `false` if it was already gone, which makes repeated removal
    /// from several processes harmless. Existing mappings stay valid.
    pub fn unlink(name: &str) -> Result<bool> {
        match shm_unlink(name) {
            Ok(()) => Ok(true),
            Err(Errno::ENOENT) => Ok(false),
            Err(e) => Err(ChannelError::shm("shm_unlink", name, e)),
        }
    }

    #[inline(always)]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this view created the named object
    pub fn created(&self) -> bool {
        self.created
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: base/len describe exactly the mapping created in open_or_create
        if let Err(e) = unsafe { munmap(self.base.cast(), self.len) } {
            warn!("Failed to unmap shared memory '{}': {}", self.name, e);
        }
    }
}

/// Open `name`, reporting whether this call created it
fn open_object(name: &str) -> Result<(File, bool)> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR;
    loop {
        match shm_open(name, OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR, mode) {
            Ok(fd) => return Ok((File::from(fd), true)),
            Err(Errno::EEXIST) => {}
            Err(e) => return Err(ChannelError::shm("shm_open", name, e)),
        }
        match shm_open(name, OFlag::O_RDWR, mode) {
            Ok(fd) => return Ok((File::from(fd), false)),
            // Removed between the two calls, try to create it again
            Err(Errno::ENOENT) => continue,
            Err(e) => return Err(ChannelError::shm("shm_open", name, e)),
        }
    }
}

/// Size of an object someone else created, once its creator has sized it
fn wait_for_size(file: &File, name: &str) -> Result<u64> {
    let deadline = Instant::now() + SHM_SIZE_WAIT;
    let mut spin = SpinWait::new();
    loop {
        let current = file
            .metadata()
            .map_err(|e| ChannelError::shm("fstat", name, errno_of(&e)))?
            .len();
        if current != 0 || Instant::now() >= deadline {
            return Ok(current);
        }
        spin.snooze();
    }
}

fn errno_of(err: &std::io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(libc::EIO))
}
