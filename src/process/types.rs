/*!
 * Process Group Types
 * Errors and results for process group coordination
 */

use crate::core::types::{ExitCode, Pid};
use crate::ipc::ChannelError;
use nix::errno::Errno;
use thiserror::Error;

/// Process group operation result
pub type GroupResult<T> = Result<T, GroupError>;

/// Process group errors
///
/// A failure inside a child's work never appears here directly: it crosses
/// the process boundary only as a non-zero exit status plus text in the
/// error channel, and surfaces from `wait` as [`GroupError::ChildFailed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// fork itself could not create a process; raised synchronously from
    /// `call`, never deferred to `wait`
    #[error("fork failed: {0}")]
    ForkFailed(Errno),

    /// waitpid failed for a tracked child
    #[error("wait failed for pid {pid}: {errno}")]
    WaitFailed { pid: Pid, errno: Errno },

    /// One or more joined children exited non-zero. Carries the last
    /// non-zero status observed and the combined message, including any
    /// text collected from the error channel.
    #[error("{message}")]
    ChildFailed { code: ExitCode, message: String },

    /// Shared-memory channel plumbing failed in the parent
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl GroupError {
    /// Exit status carried by a child failure, if this is one
    pub fn exit_code(&self) -> Option<ExitCode> {
        match self {
            GroupError::ChildFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
