//! # Frame Relay
//!
//! Single slot hand-off of the most recent item (usually a vision frame) from a producer thread to
//! the main loop. Publishing overwrites any item which has not been taken yet, so a slow consumer
//! only ever sees the latest item and never sees the same item twice.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Consumer side of the relay.
pub struct FrameRelay<T> {
    shared: Arc<Shared<T>>,
}

/// Producer side of the relay, cheap to clone and send to other threads.
pub struct FramePublisher<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    slot: Mutex<Option<T>>,

    /// Number of items overwritten before being taken
    num_dropped: AtomicU64,

    /// Number of items published
    num_published: AtomicU64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T> FrameRelay<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                num_dropped: AtomicU64::new(0),
                num_published: AtomicU64::new(0),
            }),
        }
    }

    /// Get a publisher which writes into this relay.
    pub fn publisher(&self) -> FramePublisher<T> {
        FramePublisher {
            shared: self.shared.clone(),
        }
    }

    /// Take the pending item, leaving the slot empty. Returns `None` if nothing new was published
    /// since the last take.
    pub fn try_take(&self) -> Option<T> {
        self.shared
            .slot
            .lock()
            .expect("FrameRelay: slot mutex poisoned")
            .take()
    }

    /// Number of items which were overwritten before being taken.
    pub fn num_dropped(&self) -> u64 {
        self.shared.num_dropped.load(Ordering::Relaxed)
    }

    /// Number of items published into the relay.
    pub fn num_published(&self) -> u64 {
        self.shared.num_published.load(Ordering::Relaxed)
    }
}

impl<T> Default for FrameRelay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FramePublisher<T> {
    /// Publish an item, replacing any item which hasn't been taken yet.
    pub fn publish(&self, item: T) {
        let previous = self
            .shared
            .slot
            .lock()
            .expect("FrameRelay: slot mutex poisoned")
            .replace(item);

        if previous.is_some() {
            self.shared.num_dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.num_published.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T> Clone for FramePublisher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_last_write_wins() {
        let relay = FrameRelay::new();
        let publisher = relay.publisher();

        publisher.publish("A");
        publisher.publish("B");

        assert_eq!(relay.try_take(), Some("B"));
        assert_eq!(relay.try_take(), None);
        assert_eq!(relay.num_dropped(), 1);
        assert_eq!(relay.num_published(), 2);
    }

    #[test]
    fn test_publish_from_other_thread() {
        let relay = FrameRelay::new();
        let publisher = relay.publisher();

        thread::spawn(move || {
            for i in 0..100u32 {
                publisher.publish(i);
            }
        })
        .join()
        .unwrap();

        // Only the latest frame is left and it is only delivered once
        assert_eq!(relay.try_take(), Some(99));
        assert_eq!(relay.try_take(), None);
        assert_eq!(relay.num_dropped(), 99);
    }
}
