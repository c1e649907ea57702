//! The shared sample slot (§5): a single lock-free byte the scavenger writes
//! and every subscriber session reads. No queueing — a session that misses an
//! update simply reads the latest value next time it wakes (§5 invariant:
//! single-writer, many-reader, drop-on-slow-consumer).

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    value: AtomicU8,
    has_arrived: AtomicBool,
}

/// A cheaply cloneable handle to the shared sample slot.
#[derive(Clone, Default)]
pub struct SampleSlot(Arc<Inner>);

impl SampleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called only by the scavenger. Publishing never blocks and never waits
    /// on readers.
    pub fn publish(&self, byte: u8) {
        self.0.value.store(byte, Ordering::Release);
        self.0.has_arrived.store(true, Ordering::Release);
    }

    /// The latest published byte, if any notification has ever arrived.
    pub fn latest(&self) -> Option<u8> {
        if self.0.has_arrived.load(Ordering::Acquire) {
            Some(self.0.value.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpublished_slot_has_no_value() {
        assert_eq!(SampleSlot::new().latest(), None);
    }

    #[test]
    fn publish_then_read() {
        let slot = SampleSlot::new();
        slot.publish(72);
        assert_eq!(slot.latest(), Some(72));
        slot.publish(80);
        assert_eq!(slot.latest(), Some(80));
    }

    #[test]
    fn clones_share_state() {
        let slot = SampleSlot::new();
        let clone = slot.clone();
        slot.publish(64);
        assert_eq!(clone.latest(), Some(64));
    }
}
