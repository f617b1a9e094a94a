use std::sync::atomic::{AtomicI64, Ordering};

/// Lock-free allocator of firehose sequence numbers.
///
/// Sequence numbers are strictly increasing across all events emitted by
/// this process; no two events ever share one.
pub struct Sequencer {
    last: AtomicI64,
}

impl Sequencer {
    /// Create a sequencer that will hand out `last_seq + 1` next.
    ///
    /// Pass the maximum persisted sequence number when resuming so the
    /// stream continues where it left off.
    pub fn new(last_seq: i64) -> Self {
        Sequencer {
            last: AtomicI64::new(last_seq),
        }
    }

    /// Allocate the next sequence number.
    pub fn next_seq(&self) -> i64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The most recently allocated sequence number, without advancing.
    /// Used to validate resumption cursors.
    pub fn current_seq(&self) -> i64 {
        self.last.load(Ordering::Relaxed)
    }

    /// Rewind the counter. Test support only; resetting a live stream
    /// would violate monotonicity for connected subscribers.
    pub fn reset_seq(&self, value: i64) {
        self.last.store(value, Ordering::Relaxed);
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Sequencer::new(0)
    }
}
