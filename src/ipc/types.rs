/*!
 * Channel Types
 * Errors and constants for the shared-memory error channel
 */

use nix::errno::Errno;
use thiserror::Error;

/// Fixed capacity of the error channel in bytes. Text beyond this is
/// silently truncated.
pub const CHANNEL_CAPACITY: usize = 1000;

/// Channel operation result
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Shared-memory channel errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("failed to create shared memory object {name}: {errno}")]
    Create { name: String, errno: Errno },

    #[error("failed to open shared memory object {name}: {errno}")]
    Open { name: String, errno: Errno },

    #[error("failed to size shared memory object {name}: {errno}")]
    Resize { name: String, errno: Errno },

    #[error("failed to map shared memory object {name}: {errno}")]
    Map { name: String, errno: Errno },

    #[error("failed to unlink shared memory object {name}: {errno}")]
    Unlink { name: String, errno: Errno },
}
