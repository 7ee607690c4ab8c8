//! Low-level POSIX shared memory operations
//!
//! A [`VenomShm`] maps one named segment. Creation is exclusive so that exactly
//! one process wins a creation race; the loser opens the winner's segment.
//! Unmapping happens on drop, unlinking is an explicit decision of the owner of
//! the cross-process reference count (see `segment`).

use crate::error::{Result, VenomError};
use rustix::fd::OwnedFd;
use rustix::fs::{fstat, ftruncate};
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::io;
use std::ptr::NonNull;
use std::time::{Duration, Instant};

const VENOM_SHM_PREFIX: &str = "/venom_";
const MAX_NAME_LEN: usize = 255 - VENOM_SHM_PREFIX.len();

/// How long `open` waits for a freshly created segment to receive its size
const SIZE_POLL_TIMEOUT: Duration = Duration::from_millis(500);
const SIZE_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Handle to a shared memory region
pub struct VenomShm {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: String,
}

// SAFETY: VenomShm can be safely shared between threads
// The shared memory region itself is synchronized via atomic operations
unsafe impl Send for VenomShm {}
unsafe impl Sync for VenomShm {}

fn full_name(name: &str) -> Result<String> {
    if name.len() > MAX_NAME_LEN {
        return Err(VenomError::NamespaceTooLong {
            max: MAX_NAME_LEN,
            got: name.len(),
        });
    }
    Ok(format!("{}{}", VENOM_SHM_PREFIX, name))
}

fn not_found_or(e: Errno, name: &str) -> VenomError {
    if e == Errno::NOENT {
        VenomError::NotFound(name.to_string())
    } else {
        VenomError::ShmOpen {
            name: name.to_string(),
            source: e.into(),
        }
    }
}

fn map_shared(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>> {
    let addr = unsafe {
        mmap(
            std::ptr::null_mut(),
            size,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::SHARED,
            fd,
            0,
        )
        .map_err(|e| VenomError::Mmap(e.into()))?
    };

    NonNull::new(addr.cast::<u8>())
        .ok_or_else(|| VenomError::Mmap(io::Error::new(io::ErrorKind::Other, "mmap returned null")))
}

impl VenomShm {
    /// Create a new shared memory region, failing if the name is taken
    ///
    /// # Arguments
    /// * `name` - Unique name for the shared memory (will be prefixed with "/venom_")
    /// * `size` - Size in bytes
    ///
    /// # Returns
    /// A zero-initialized VenomShm handle on success,
    /// `VenomError::AlreadyExists` if another process created it first
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let full_name = full_name(name)?;

        let fd = shm_open(
            full_name.as_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH,
        )
        .map_err(|e| {
            if e == Errno::EXIST {
                VenomError::AlreadyExists(name.to_string())
            } else {
                VenomError::ShmCreate {
                    name: name.to_string(),
                    source: e.into(),
                }
            }
        })?;

        let mapped = ftruncate(&fd, size as u64)
            .map_err(|e| VenomError::Truncate(e.into()))
            .and_then(|_| map_shared(&fd, size));

        let addr = match mapped {
            Ok(addr) => addr,
            Err(e) => {
                // Nobody can use a segment without a mapping, give the name back
                let _ = shm_unlink(full_name.as_str());
                return Err(e);
            }
        };

        // Zero initialize
        unsafe {
            std::ptr::write_bytes(addr.as_ptr(), 0, size);
        }

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
        })
    }

    /// Open an existing shared memory region
    ///
    /// A segment that was just created may not have been sized yet; this waits
    /// a bounded amount of time for the creator to finish `ftruncate`.
    pub fn open(name: &str) -> Result<Self> {
        let full_name = full_name(name)?;

        let fd = shm_open(full_name.as_str(), ShmOFlags::RDWR, Mode::empty())
            .map_err(|e| not_found_or(e, name))?;

        let deadline = Instant::now() + SIZE_POLL_TIMEOUT;
        let size = loop {
            let stat = fstat(&fd).map_err(|e| VenomError::Stat(e.into()))?;
            if stat.st_size > 0 {
                break stat.st_size as usize;
            }
            if Instant::now() >= deadline {
                return Err(VenomError::ShmOpen {
                    name: name.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "segment was never sized"),
                });
            }
            std::thread::sleep(SIZE_POLL_INTERVAL);
        };

        let addr = map_shared(&fd, size)?;

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
        })
    }

    /// Remove the name of a shared memory region
    ///
    /// Existing mappings stay valid until they are unmapped.
    pub fn unlink(name: &str) -> Result<()> {
        let full_name = full_name(name)?;
        shm_unlink(full_name.as_str()).map_err(|e| not_found_or(e, name))
    }

    /// Get raw pointer to shared memory
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// Get size of shared memory region
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the name of shared memory
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for VenomShm {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(prefix: &str) -> String {
        format!("{}_{}", prefix, std::process::id())
    }

    #[test]
    fn test_create_and_open() {
        let name = unique("test_shm_create");
        let size = 4096;

        let shm1 = VenomShm::create(&name, size).unwrap();
        assert_eq!(shm1.size(), size);

        unsafe {
            std::ptr::write(shm1.as_ptr(), 42u8);
        }

        // Open from another "process"
        let shm2 = VenomShm::open(&name).unwrap();
        assert_eq!(shm2.size(), size);

        let val = unsafe { std::ptr::read(shm2.as_ptr()) };
        assert_eq!(val, 42u8);

        VenomShm::unlink(&name).unwrap();
        drop(shm2);
        drop(shm1);
    }

    #[test]
    fn test_create_is_exclusive() {
        let name = unique("test_shm_exclusive");
        let shm = VenomShm::create(&name, 128).unwrap();

        match VenomShm::create(&name, 128) {
            Err(VenomError::AlreadyExists(n)) => assert_eq!(n, name),
            other => panic!("expected AlreadyExists, got {:?}", other.map(|s| s.size())),
        }

        VenomShm::unlink(&name).unwrap();
        drop(shm);
    }

    #[test]
    fn test_open_missing_and_long_name() {
        let name = unique("test_shm_missing");
        assert!(matches!(VenomShm::open(&name), Err(VenomError::NotFound(_))));
        assert!(matches!(VenomShm::unlink(&name), Err(VenomError::NotFound(_))));

        let long = "x".repeat(300);
        assert!(matches!(
            VenomShm::create(&long, 64),
            Err(VenomError::NamespaceTooLong { .. })
        ));
    }
}
