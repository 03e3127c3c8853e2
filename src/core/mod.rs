/*!
 * Core Module
 * Common types shared across the crate
 */

pub mod types;

pub use types::{ChannelKey, ExitCode, Pid};
