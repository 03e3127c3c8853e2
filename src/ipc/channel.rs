/*!
 * Error Channel
 * Bounded POSIX shared-memory buffer carrying child failure text to the parent
 */

use super::types::{ChannelError, ChannelResult, CHANNEL_CAPACITY};
use crate::core::types::ChannelKey;
use log::{info, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc::off_t;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::AsFd;
use std::ptr::NonNull;

const SEGMENT_LEN: NonZeroUsize = match NonZeroUsize::new(CHANNEL_CAPACITY) {
    Some(len) => len,
    None => panic!("channel capacity must be non-zero"),
};

/// Handle on one group's error channel.
///
/// The backing shared memory object does not exist until the first failing
/// child calls [`append`](Self::append); a group whose children all succeed
/// never creates it. The parent consumes and unlinks it in a single
/// [`consume`](Self::consume) call.
///
/// Writers perform a whole-buffer read-modify-write with no mutual
/// exclusion: two children failing at the same moment can race, and the
/// last writer wins. Losing a message that way is accepted, documented
/// behavior, not a bug to fix here.
pub struct ErrorChannel {
    name: String,
}

impl ErrorChannel {
    pub fn new(key: ChannelKey) -> Self {
        Self {
            name: key.shm_name(),
        }
    }

    /// Append one failure entry, creating and sizing the segment if this is
    /// the first failure. Existing text and the new entry are joined with a
    /// newline; anything past capacity is silently dropped.
    pub fn append(&self, entry: &str) -> ChannelResult<()> {
        let fd = shm_open(
            self.name.as_str(),
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|errno| ChannelError::Create {
            name: self.name.clone(),
            errno,
        })?;

        ftruncate(&fd, CHANNEL_CAPACITY as off_t).map_err(|errno| ChannelError::Resize {
            name: self.name.clone(),
            errno,
        })?;

        let mut map = Mapping::new(&fd, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE, &self.name)?;

        let current = buffer_text(map.bytes());
        let joined = if current.is_empty() {
            entry.to_string()
        } else {
            format!("{current}\n{entry}")
        };
        let clamped = clamp(joined, CHANNEL_CAPACITY);

        let buf = map.bytes_mut();
        buf.fill(0);
        buf[..clamped.len()].copy_from_slice(clamped.as_bytes());

        info!(
            "Appended {} bytes to error channel {} ({} bytes total)",
            entry.len(),
            self.name,
            clamped.len()
        );

        Ok(())
    }

    /// Read the collected text, then unlink the segment. A segment that was
    /// never created reads as empty; the unlink happens either way, so one
    /// wait cycle consumes the channel exactly once.
    pub fn consume(&self) -> ChannelResult<String> {
        let fd = match shm_open(self.name.as_str(), OFlag::O_RDONLY, Mode::empty()) {
            Ok(fd) => fd,
            Err(Errno::ENOENT) => return Ok(String::new()),
            Err(errno) => {
                return Err(ChannelError::Open {
                    name: self.name.clone(),
                    errno,
                })
            }
        };

        let map = Mapping::new(&fd, ProtFlags::PROT_READ, &self.name)?;
        let text = buffer_text(map.bytes());
        drop(map);
        drop(fd);

        match shm_unlink(self.name.as_str()) {
            Ok(()) | Err(Errno::ENOENT) => {}
            Err(errno) => {
                return Err(ChannelError::Unlink {
                    name: self.name.clone(),
                    errno,
                })
            }
        }

        info!(
            "Consumed error channel {} ({} bytes of text)",
            self.name,
            text.len()
        );

        Ok(text)
    }

    /// Probe for the segment without creating it
    pub fn exists(&self) -> bool {
        shm_open(self.name.as_str(), OFlag::O_RDONLY, Mode::empty()).is_ok()
    }
}

/// Mapped view of the segment, unmapped on drop
struct Mapping {
    ptr: NonNull<c_void>,
}

impl Mapping {
    fn new<F: AsFd>(fd: F, prot: ProtFlags, name: &str) -> ChannelResult<Self> {
        // SAFETY: mapping a freshly opened fd at a kernel-chosen address;
        // the pointer is only dereferenced through this struct, which
        // unmaps in Drop before the fd is released.
        let ptr = unsafe { mmap(None, SEGMENT_LEN, prot, MapFlags::MAP_SHARED, fd, 0) }.map_err(
            |errno| ChannelError::Map {
                name: name.to_string(),
                errno,
            },
        )?;
        Ok(Self { ptr })
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the mapping is CHANNEL_CAPACITY bytes long and stays
        // valid for the lifetime of self
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u8, CHANNEL_CAPACITY) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access
        // through this handle
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, CHANNEL_CAPACITY) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: ptr/len are exactly what mmap returned
        if let Err(errno) = unsafe { munmap(self.ptr, CHANNEL_CAPACITY) } {
            warn!("Failed to unmap error channel segment: {}", errno);
        }
    }
}

/// Text content of the buffer: bytes up to the first NUL, trimmed
fn buffer_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character
fn clamp(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}
