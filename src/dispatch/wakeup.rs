//! Wakeup plumbing (§4.6): the self-pipe equivalent that lets producers
//! interrupt the dispatcher's blocking multiplex call. `tokio::sync::Notify`
//! stands in for the write end of the pipe; the nonblock-event flag mirrors
//! the original design's separate "is there any work" bit so `shutdown()`
//! can guarantee the loop wakes even if nothing else would.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Default)]
pub struct Wakeup {
    notify: Notify,
    nonblock_event: AtomicBool,
    stop: AtomicBool,
}

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupts the dispatcher's current or next blocking wait.
    pub fn signal(&self) {
        self.nonblock_event.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.signal();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn has_work(&self) -> bool {
        self.nonblock_event.load(Ordering::SeqCst)
    }

    pub fn set_has_work(&self, value: bool) {
        self.nonblock_event.store(value, Ordering::SeqCst);
    }
}
