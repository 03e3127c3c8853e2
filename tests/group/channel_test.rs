/*!
 * Error Channel Tests
 * Shared-memory buffer lifecycle: lazy create, append, consume-once
 */

use pretty_assertions::assert_eq;
use procgroup::{ChannelKey, ErrorChannel, CHANNEL_CAPACITY};
use serial_test::serial;

fn clean_channel(raw: u64) -> ErrorChannel {
    let channel = ErrorChannel::new(ChannelKey::new(raw));
    let _ = channel.consume();
    channel
}

#[test]
#[serial]
fn test_consume_of_missing_channel_is_empty() {
    let channel = clean_channel(0xAB5E17);
    assert!(!channel.exists());
    assert_eq!(channel.consume().unwrap(), "");
}

#[test]
#[serial]
fn test_append_creates_segment_lazily() {
    let channel = clean_channel(0x1A21);
    assert!(!channel.exists());

    channel.append("Exception: boom (here)").unwrap();
    assert!(channel.exists());

    assert_eq!(channel.consume().unwrap(), "Exception: boom (here)");
}

#[test]
#[serial]
fn test_entries_are_newline_joined() {
    let channel = clean_channel(0x2B42);
    channel.append("first").unwrap();
    channel.append("second").unwrap();

    assert_eq!(channel.consume().unwrap(), "first\nsecond");
}

#[test]
#[serial]
fn test_consume_unlinks_the_segment() {
    let channel = clean_channel(0x3C63);
    channel.append("once").unwrap();

    assert_eq!(channel.consume().unwrap(), "once");
    assert!(!channel.exists());
    // consumed exactly once: a second read degrades to empty
    assert_eq!(channel.consume().unwrap(), "");
}

#[test]
#[serial]
fn test_overflow_is_silently_truncated() {
    let channel = clean_channel(0x4D84);
    let oversized = "x".repeat(CHANNEL_CAPACITY + 500);
    channel.append(&oversized).unwrap();

    let text = channel.consume().unwrap();
    assert_eq!(text.len(), CHANNEL_CAPACITY);
    assert!(text.bytes().all(|b| b == b'x'));
}

#[test]
#[serial]
fn test_appends_past_capacity_keep_earlier_text() {
    let channel = clean_channel(0x5E05);
    let first = "a".repeat(CHANNEL_CAPACITY - 10);
    channel.append(&first).unwrap();
    channel.append("bbbbbbbbbbbbbbbbbbbb").unwrap();

    let text = channel.consume().unwrap();
    assert_eq!(text.len(), CHANNEL_CAPACITY);
    assert!(text.starts_with(&first));
}
