/*!
 * Process Group
 * Forks children to run work items, joins them, and surfaces failures
 */

use super::types::{GroupError, GroupResult};
use crate::core::types::{ChannelKey, ExitCode, Pid};
use crate::ipc::ErrorChannel;
use ahash::RandomState;
use log::{error, info, warn};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, getpid, ForkResult};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe, Location};

/// Coordinates a set of forked child processes.
///
/// Each `call` forks one child that runs a single work item and then exits;
/// `wait` joins the children and turns any non-zero exit into a
/// [`GroupError::ChildFailed`] carrying the text the children left in the
/// group's shared-memory error channel. A group whose children all succeed
/// never opens the channel at all.
///
/// Dropping a group with un-joined children performs the full `wait`
/// implicitly, so forgetting to join never leaks zombies; a failure
/// surfaced at that point is logged rather than propagated.
pub struct ProcessGroup {
    key: ChannelKey,
    children: HashSet<Pid, RandomState>,
}

impl ProcessGroup {
    pub fn new() -> Self {
        Self::with_key(ChannelKey::from_clock())
    }

    /// Build a group with an explicit channel key. Two live groups sharing
    /// a key share one error channel, which makes their failure text
    /// unreliable; nothing else breaks.
    pub fn with_key(key: ChannelKey) -> Self {
        info!("Process group initialized (channel key {})", key);
        Self {
            key,
            children: HashSet::with_hasher(RandomState::new()),
        }
    }

    /// Fork a child to run `work`, returning the child's pid immediately.
    ///
    /// The child runs only `work` and then exits: success status on
    /// `Ok(())`, status 1 after recording the failure in the error channel
    /// on `Err` or panic. It never returns into the code that follows this
    /// call in the parent.
    ///
    /// A fork failure is fatal to this call and reported here, never
    /// deferred to `wait` (there is no child to report it).
    #[track_caller]
    pub fn call<F>(&mut self, work: F) -> GroupResult<Pid>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let caller = Location::caller();
        self.spawn(caller, |()| work(), ())
    }

    /// Like [`call`](Self::call), passing one positional argument value to
    /// the work item (use a tuple for an ordered sequence of values).
    #[track_caller]
    pub fn call_with<A, F>(&mut self, work: F, args: A) -> GroupResult<Pid>
    where
        F: FnOnce(A) -> anyhow::Result<()>,
    {
        let caller = Location::caller();
        self.spawn(caller, work, args)
    }

    fn spawn<A, F>(
        &mut self,
        caller: &'static Location<'static>,
        work: F,
        args: A,
    ) -> GroupResult<Pid>
    where
        F: FnOnce(A) -> anyhow::Result<()>,
    {
        // SAFETY: the child branch never returns; it runs the work item and
        // _exits, so no two copies of the parent's stack ever unwind. The
        // usual fork-in-a-threaded-process caveats apply to the work item
        // itself.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                self.children.insert(child);
                info!("Forked child {} (channel key {})", child, self.key);
                Ok(child)
            }
            Ok(ForkResult::Child) => run_child(work, args, self.key, caller),
            Err(errno) => {
                error!("Fork failed: {}", errno);
                Err(GroupError::ForkFailed(errno))
            }
        }
    }

    /// Join every tracked child, then surface the first failure seen.
    ///
    /// All joined pids are removed from the group whether or not this
    /// returns an error, so nothing is ever waited on twice; calling this
    /// again once the group is empty is a no-op.
    pub fn wait(&mut self) -> GroupResult<()> {
        let targets: Vec<Pid> = self.children.iter().copied().collect();
        self.join(&targets)
    }

    /// Join one specific child. A pid the group is not tracking (already
    /// joined, or never ours) is a no-op.
    pub fn wait_for(&mut self, pid: Pid) -> GroupResult<()> {
        if !self.children.contains(&pid) {
            return Ok(());
        }
        self.join(&[pid])
    }

    fn join(&mut self, targets: &[Pid]) -> GroupResult<()> {
        let mut failed_code: ExitCode = 0;
        let mut wait_error: Option<GroupError> = None;

        for &pid in targets {
            let status = loop {
                match waitpid(pid, None) {
                    Err(Errno::EINTR) => continue,
                    other => break other,
                }
            };
            self.children.remove(&pid);

            match status {
                Ok(WaitStatus::Exited(_, 0)) => {
                    info!("Child {} exited cleanly", pid);
                }
                Ok(WaitStatus::Exited(_, code)) => {
                    warn!("Child {} exited with code {}", pid, code);
                    failed_code = code;
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    let code = 128 + signal as ExitCode;
                    warn!("Child {} killed by {:?} (treated as code {})", pid, signal, code);
                    failed_code = code;
                }
                Ok(other) => {
                    warn!("Unexpected wait status for child {}: {:?}", pid, other);
                }
                Err(errno) => {
                    error!("Failed to wait for child {}: {}", pid, errno);
                    wait_error = Some(GroupError::WaitFailed { pid, errno });
                }
            }
        }

        if failed_code != 0 {
            // Only a failing run ever opens the channel; a clean group
            // leaves shared memory untouched.
            let text = ErrorChannel::new(self.key).consume()?;
            let mut message = format!(
                "An error occurred within a thread, the return code was: {failed_code}"
            );
            if !text.is_empty() {
                message.push('\n');
                message.push_str(&text);
            }
            return Err(GroupError::ChildFailed {
                code: failed_code,
                message,
            });
        }

        match wait_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Pids of children that have been forked but not yet joined
    pub fn active_ids(&self) -> Vec<Pid> {
        self.children.iter().copied().collect()
    }

    /// Number of un-joined children
    pub fn count(&self) -> usize {
        self.children.len()
    }
}

impl Default for ProcessGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.children.is_empty() {
            return;
        }
        info!(
            "Joining {} remaining children on process group drop",
            self.children.len()
        );
        if let Err(err) = self.wait() {
            error!("Process group teardown: {}", err);
        }
    }
}

/// Child side of the fork: run the work item, record any failure in the
/// error channel, and exit without ever returning to the caller.
fn run_child<A, F>(work: F, args: A, key: ChannelKey, caller: &'static Location<'static>) -> !
where
    F: FnOnce(A) -> anyhow::Result<()>,
{
    // The failure reaches the parent through the channel; keep the child's
    // stderr free of the default panic report.
    panic::set_hook(Box::new(|_| {}));

    let failure = match panic::catch_unwind(AssertUnwindSafe(move || work(args))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(format!("{err:#}")),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };

    let code = match failure {
        None => 0,
        Some(message) => {
            let entry = format!("Exception: {message} ({caller})");
            if let Err(err) = ErrorChannel::new(key).append(&entry) {
                error!("Child {} could not record its failure: {}", getpid(), err);
            }
            1
        }
    };

    // _exit skips atexit handlers and destructors the parent still owns
    unsafe { nix::libc::_exit(code) }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
