use tracing::warn;

use crate::delivery::DeliverySink;
use crate::transport::MessageHandle;

/// Hard per-message length ceiling, in characters. Telegram caps messages at
/// 4096; staying under leaves headroom for formatting expansion.
pub const MESSAGE_CEILING: usize = 4000;

/// Minimum character gap between consecutive in-place edits.
const CADENCE_FLOOR: usize = 20;

/// What a finished turn delivered, for commit and reporting.
#[derive(Debug)]
pub struct DeliverySummary {
    /// Concatenation of every segment that reached the chat, in order.
    pub shown: String,
    /// Characters consumed from the backend, delivered or not.
    pub total_chars: usize,
    pub message_sent: bool,
    pub failed_flushes: usize,
}

/// Turn-scoped state machine translating an unbounded fragment stream into
/// bounded send/edit operations.
///
/// At most one message is "open" at a time; it grows through in-place edits
/// until the buffer reaches the ceiling, at which point the ceiling-sized
/// head is emitted and the message is sealed. Sealed messages are never
/// touched again; further content opens a fresh message.
///
/// Edits are throttled to one per `max(20, ceiling / 10)` buffered
/// characters, which bounds them at roughly ten per message however the
/// fragments arrive.
///
/// A flush that fails even after the plain-text retry is dropped; the turn
/// continues and later flushes are still attempted. `shown` accumulates
/// only what actually reached the chat.
pub struct ChunkScheduler<'a> {
    sink: &'a DeliverySink,
    ceiling: usize,
    cadence_gap: usize,
    buffer: String,
    buffer_chars: usize,
    open_handle: Option<MessageHandle>,
    message_sent: bool,
    /// Characters of `buffer` already visible in the open message.
    flushed_chars: usize,
    shown: String,
    total_chars: usize,
    failed_flushes: usize,
}

impl<'a> ChunkScheduler<'a> {
    pub fn new(sink: &'a DeliverySink, ceiling: usize) -> Self {
        Self {
            sink,
            ceiling,
            cadence_gap: (ceiling / 10).max(CADENCE_FLOOR),
            buffer: String::new(),
            buffer_chars: 0,
            open_handle: None,
            message_sent: false,
            flushed_chars: 0,
            shown: String::new(),
            total_chars: 0,
            failed_flushes: 0,
        }
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    /// Consume one fragment, emitting whatever operations fall due.
    pub async fn feed(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let added = fragment.chars().count();
        self.buffer.push_str(fragment);
        self.buffer_chars += added;
        self.total_chars += added;

        // A single fragment can overshoot the ceiling many times over
        // (whole-answer backends); drain in ceiling-sized pieces.
        while self.buffer_chars >= self.ceiling {
            self.seal_overflow().await;
        }

        if !self.message_sent && self.buffer_chars > 0 {
            self.open_message().await;
        } else if self.open_handle.is_some()
            && self.buffer_chars - self.flushed_chars >= self.cadence_gap
        {
            self.cadence_edit().await;
        }
    }

    /// Emit the ceiling-sized head of the buffer and seal the message it
    /// landed in. Sealing happens whether or not the flush succeeded.
    async fn seal_overflow(&mut self) {
        let (head, rest) = split_at_chars(&self.buffer, self.ceiling);
        let result = match self.open_handle {
            Some(handle) => self.sink.edit(handle, &head).await,
            None => self.sink.send(&head).await.map(|_| ()),
        };
        match result {
            Ok(()) => {
                self.shown.push_str(&head);
                self.message_sent = true;
            }
            Err(e) => {
                warn!("dropping sealed segment after delivery failure: {e}");
                self.failed_flushes += 1;
                // Whatever was already flushed into the open message is
                // still on screen.
                self.shown.push_str(prefix_chars(&head, self.flushed_chars));
            }
        }
        self.open_handle = None;
        self.flushed_chars = 0;
        self.buffer = rest;
        self.buffer_chars -= self.ceiling;
    }

    async fn open_message(&mut self) {
        match self.sink.send(&self.buffer).await {
            Ok(handle) => {
                self.open_handle = Some(handle);
                self.message_sent = true;
                self.flushed_chars = self.buffer_chars;
            }
            Err(e) => {
                warn!("initial send failed, will retry on next fragment: {e}");
                self.failed_flushes += 1;
            }
        }
    }

    async fn cadence_edit(&mut self) {
        let Some(handle) = self.open_handle else {
            return;
        };
        match self.sink.edit(handle, &self.buffer).await {
            Ok(()) => self.flushed_chars = self.buffer_chars,
            Err(e) => {
                warn!("progress edit failed: {e}");
                self.failed_flushes += 1;
            }
        }
    }

    /// Flush whatever remains buffered. Called on stream end, normal or not.
    pub async fn finish(mut self) -> DeliverySummary {
        if self.buffer_chars > 0 {
            match self.open_handle {
                Some(handle) => {
                    if self.buffer_chars == self.flushed_chars {
                        // Already fully on screen; no edit needed.
                        self.shown.push_str(&self.buffer);
                    } else {
                        match self.sink.edit(handle, &self.buffer).await {
                            Ok(()) => self.shown.push_str(&self.buffer),
                            Err(e) => {
                                warn!("final edit failed: {e}");
                                self.failed_flushes += 1;
                                let visible = prefix_chars(&self.buffer, self.flushed_chars);
                                self.shown += visible;
                            }
                        }
                    }
                }
                None => match self.sink.send(&self.buffer).await {
                    Ok(_) => {
                        self.shown.push_str(&self.buffer);
                        self.message_sent = true;
                    }
                    Err(e) => {
                        warn!("final send failed: {e}");
                        self.failed_flushes += 1;
                    }
                },
            }
        }
        DeliverySummary {
            shown: self.shown,
            total_chars: self.total_chars,
            message_sent: self.message_sent,
            failed_flushes: self.failed_flushes,
        }
    }
}

/// Split after the first `n` characters, respecting UTF-8 boundaries.
fn split_at_chars(s: &str, n: usize) -> (String, String) {
    match s.char_indices().nth(n) {
        Some((idx, _)) => (s[..idx].to_string(), s[idx..].to_string()),
        None => (s.to_string(), String::new()),
    }
}

fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
