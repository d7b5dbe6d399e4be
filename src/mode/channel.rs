//! Single-slot mode hand-off from the audio thread to the UI thread
//!
//! The slot holds at most one [`Mode`]. Posting into a full slot replaces the
//! older value, so a slow consumer only ever sees the latest mode. After each
//! post the producer calls the consumer's waker, which is expected to schedule
//! a drain on the UI thread (for example by requesting a repaint) rather than
//! touching any UI state itself.

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::Mode;

/// Callback used to wake the UI thread
pub type Waker = Box<dyn Fn() + Send + Sync>;

struct Shared {
    slot: ArrayQueue<Mode>,
    waker: Mutex<Option<Waker>>,
    closed: AtomicBool,
    /// Modes replaced before the consumer drained them
    overwritten: AtomicUsize,
}

impl Shared {
    fn wake(&self) {
        if let Some(waker) = self.waker.lock().as_ref() {
            waker();
        }
    }
}

/// Create a connected sender/receiver pair
pub fn mode_channel() -> (ModeSender, ModeReceiver) {
    let shared = Arc::new(Shared {
        slot: ArrayQueue::new(1),
        waker: Mutex::new(None),
        closed: AtomicBool::new(false),
        overwritten: AtomicUsize::new(0),
    });

    (
        ModeSender {
            shared: shared.clone(),
        },
        ModeReceiver { shared },
    )
}

/// Producer half, owned by the audio thread
pub struct ModeSender {
    shared: Arc<Shared>,
}

impl ModeSender {
    /// Post a mode, replacing any value the consumer has not drained yet
    pub fn send(&self, mode: Mode) {
        if let Some(stale) = self.shared.slot.force_push(mode) {
            self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Dropped undelivered mode {}", stale);
        }
        self.shared.wake();
    }
}

impl Drop for ModeSender {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake();
    }
}

/// Consumer half, owned by the UI thread
pub struct ModeReceiver {
    shared: Arc<Shared>,
}

impl ModeReceiver {
    /// Install the callback invoked after every post
    pub fn set_waker<F>(&self, waker: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.waker.lock() = Some(Box::new(waker));
    }

    /// Take the pending mode, if any
    pub fn try_recv(&self) -> Option<Mode> {
        self.shared.slot.pop()
    }

    /// Whether a mode is waiting to be drained
    pub fn has_pending(&self) -> bool {
        !self.shared.slot.is_empty()
    }

    /// True once the sender is gone; no further modes will arrive
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn overwritten_count(&self) -> usize {
        self.shared.overwritten.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_latest_value_wins() {
        let (tx, rx) = mode_channel();
        tx.send(Mode::new("talking"));
        tx.send(Mode::new("screaming"));

        assert_eq!(rx.try_recv(), Some(Mode::new("screaming")));
        assert_eq!(rx.try_recv(), None);
        assert_eq!(rx.overwritten_count(), 1);
    }

    #[test]
    fn test_waker_called_per_send() {
        let (tx, rx) = mode_channel();
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        rx.set_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(Mode::new("talking"));
        tx.send(Mode::default());
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert!(rx.has_pending());
    }

    #[test]
    fn test_closed_after_sender_drop() {
        let (tx, rx) = mode_channel();
        tx.send(Mode::new("talking"));
        drop(tx);

        assert!(rx.is_closed());
        // Value posted before the drop is still delivered
        assert_eq!(rx.try_recv(), Some(Mode::new("talking")));
    }

    #[test]
    fn test_cross_thread_delivery() {
        let (tx, rx) = mode_channel();
        let producer = thread::spawn(move || {
            for i in 0..1000 {
                let mode = if i % 2 == 0 { "talking" } else { "screaming" };
                tx.send(Mode::new(mode));
            }
            tx.send(Mode::default());
        });
        producer.join().unwrap();

        assert_eq!(rx.try_recv(), Some(Mode::default()));
        assert!(rx.try_recv().is_none());
    }
}
