/*!
 * Core Types
 * Common types used across the process group
 */

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Process ID type (OS-level pid, as reported by fork)
pub type Pid = nix::unistd::Pid;

/// Exit status code reported by a terminated child
pub type ExitCode = i32;

/// Key identifying one group's shared-memory error channel.
///
/// Derived from milliseconds since the Unix epoch at construction time, so
/// two coordinators created in the same millisecond on the same host can
/// collide. That collision is an accepted limitation: the channel contents
/// become unreliable, nothing crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelKey(u64);

impl ChannelKey {
    /// Build a key from an explicit raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derive a key from the system clock (millisecond resolution)
    pub fn from_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Name of the POSIX shared memory object backing this key
    pub fn shm_name(&self) -> String {
        format!("/pg-err-{}", self.0)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
