/*!
 * IPC Module
 * The single cross-process channel: a bounded shared-memory error buffer
 */

pub mod channel;
pub mod types;

pub use channel::ErrorChannel;
pub use types::{ChannelError, ChannelResult, CHANNEL_CAPACITY};
