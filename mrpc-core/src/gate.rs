//! One-shot-style "wait until the active count returns to zero" gate.
//!
//! Both stream processors track how many request slots/processors are
//! currently active so shutdown can wait for the fleet to drain before
//! stopping the writer and releasing the byte stream.

use flume::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ActiveGate {
    count: AtomicUsize,
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for ActiveGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveGate {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            count: AtomicUsize::new(0),
            tx,
            rx,
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Marks one more resource active, clearing any stale "drained" signal.
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let _ = self.rx.try_recv();
    }

    /// Marks one resource inactive; signals waiters if the count just hit 0.
    pub fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.tx.try_send(());
        }
    }

    /// Resolves immediately if the count is already 0, otherwise waits for
    /// the next 0-crossing signal.
    pub async fn wait_for_zero(&self) {
        if self.count() == 0 {
            return;
        }
        let _ = self.rx.recv_async().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn resolves_immediately_when_already_zero() {
        let gate = ActiveGate::new();
        gate.wait_for_zero().await;
    }

    #[compio::test]
    async fn waits_until_last_decrement() {
        let gate = ActiveGate::new();
        gate.increment();
        gate.increment();
        assert_eq!(gate.count(), 2);
        gate.decrement();
        gate.decrement();
        gate.wait_for_zero().await;
        assert_eq!(gate.count(), 0);
    }
}
