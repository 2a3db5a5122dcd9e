//! Fixed-capacity pool of reusable objects, built on a pre-filled bounded
//! `flume` channel.
//!
//! Every connection-scoped resource that must stay within a hard bound —
//! packets, request slots, request processors — is checked out of one of
//! these and checked back in when the caller is done with it, instead of
//! being allocated and freed per use.

use flume::{bounded, Receiver, Sender};

/// A bounded pool of `T`. Cloning shares the same underlying channel, so a
/// `Pool` can be handed to every fiber that needs to acquire/release from it.
pub struct Pool<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Pool<T> {
    /// Builds a pool of `capacity` items, each produced by `make`.
    pub fn new(capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let (tx, rx) = bounded(capacity);
        for _ in 0..capacity {
            tx.try_send(make())
                .unwrap_or_else(|_| unreachable!("channel just sized to capacity"));
        }
        Self { tx, rx }
    }

    /// Total capacity of the pool (items in circulation, checked out or not).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    /// Number of items currently checked in (available to acquire).
    #[must_use]
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Waits for an item to become available and checks it out.
    pub async fn acquire(&self) -> T {
        self.rx
            .recv_async()
            .await
            .unwrap_or_else(|_| unreachable!("pool outlives its own sender"))
    }

    /// Checks out an item without waiting, if one is available.
    #[must_use]
    pub fn try_acquire(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Returns an item to the pool.
    ///
    /// # Panics
    /// Panics (debug-only) if more items are released than the pool's
    /// capacity, which indicates a double-release bug upstream.
    pub fn release(&self, item: T) {
        let result = self.tx.try_send(item);
        debug_assert!(result.is_ok(), "released an item beyond pool capacity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_recycle() {
        let pool = Pool::new(2, || 0u32);
        assert_eq!(pool.available(), 2);
        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 2);
    }

    #[compio::test]
    async fn acquire_waits_for_release() {
        let pool = Pool::new(1, || "item".to_string());
        let item = pool.acquire().await;
        assert!(pool.try_acquire().is_none());
        pool.release(item);
        let item = pool.acquire().await;
        assert_eq!(item, "item");
    }
}
