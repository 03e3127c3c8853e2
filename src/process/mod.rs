/*!
 * Process Module
 * Fork/execute/join coordination for groups of child processes
 */

pub mod group;
pub mod types;

pub use group::ProcessGroup;
pub use types::{GroupError, GroupResult};
