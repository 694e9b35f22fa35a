//! Per-stream mailbox (spec.md §4.B).

use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::Notify;

/// One event the reader task has appended to a [`Channel`], in arrival
/// order. Deliberately a tagged enum rather than the engine's own `Event`:
/// a `Channel` only ever needs the subset `post` interprets, plus a catch-all
/// so unrecognized-but-relevant events (RST_STREAM) still wake the waiter
/// even though `post` does not special-case them (spec.md §9 design notes).
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    ResponseReceived(Vec<(String, String)>),
    DataReceived(Bytes),
    StreamEnded,
    Other,
}

/// A passive mailbox for one in-flight stream.
///
/// The reader task appends events and signals `wakeup`; the `post` call
/// that owns this stream clears `wakeup` before awaiting it and drains
/// `events` after being woken. `events` carries its own short-lived lock
/// (distinct from the Connection's stream-table lock) so the reader can
/// append without holding the table lock across the append, and `post` can
/// await the `Notify` without holding any lock at all.
pub(crate) struct Channel {
    pub(crate) wakeup: Notify,
    events: Mutex<Vec<ChannelEvent>>,
}

impl Channel {
    pub(crate) fn new() -> Channel {
        Channel {
            wakeup: Notify::new(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Appends an event and wakes whoever is (or will be) waiting.
    pub(crate) fn push(&self, event: ChannelEvent) {
        self.events.lock().unwrap().push(event);
        self.wakeup.notify_one();
    }

    /// Drains and returns every event accumulated so far, in arrival order.
    pub(crate) fn drain(&self) -> Vec<ChannelEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}
