/*!
 * procgroup
 * Forked process groups with shared-memory error reporting
 */

pub mod core;
pub mod ipc;
pub mod process;

// Re-exports
pub use crate::core::types::{ChannelKey, ExitCode, Pid};
pub use crate::ipc::{ChannelError, ChannelResult, ErrorChannel, CHANNEL_CAPACITY};
pub use crate::process::{GroupError, GroupResult, ProcessGroup};
