//! Round-robin-starting-point bit allocator used to hand out conversation ids.
//!
//! Despite the name this isn't a packed/SIMD bitset — it's a simple linear
//! scan that remembers where it last found a free slot so repeated
//! acquire/release cycles stay O(1) amortized instead of always scanning
//! from zero.

/// Fixed-size id allocator. `size` must be > 0.
#[derive(Debug, Clone)]
pub struct IdBitmap {
    used: Vec<bool>,
    last_free: usize,
}

impl IdBitmap {
    /// # Panics
    /// Panics if `size == 0`.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "IdBitmap size must be positive");
        Self {
            used: vec![false; size],
            last_free: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    /// Finds and marks the next free id, starting the scan where the last
    /// successful acquire left off. Returns `None` if every id is in use.
    pub fn acquire(&mut self) -> Option<usize> {
        let size = self.used.len();
        let mut n = self.last_free;
        for _ in 0..size {
            if !self.used[n] {
                self.used[n] = true;
                self.last_free = n;
                return Some(n);
            }
            n = (n + 1) % size;
        }
        None
    }

    /// Releases a previously acquired id.
    ///
    /// # Panics
    /// Panics (debug-only) if `id` was not currently acquired — the caller
    /// owns the id and double-release indicates a logic bug upstream.
    pub fn release(&mut self, id: usize) {
        debug_assert!(self.used[id], "releasing an id that was not acquired: {id}");
        self.used[id] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_fills_then_exhausts() {
        let mut bm = IdBitmap::new(4);
        let ids: Vec<_> = (0..4).map(|_| bm.acquire().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(bm.acquire(), None);
    }

    #[test]
    fn release_then_reacquire_round_robins() {
        let mut bm = IdBitmap::new(3);
        let a = bm.acquire().unwrap();
        let _b = bm.acquire().unwrap();
        let _c = bm.acquire().unwrap();
        bm.release(a);
        let reacquired = bm.acquire().unwrap();
        assert_eq!(reacquired, a);
    }

    #[test]
    #[should_panic]
    fn zero_size_panics() {
        IdBitmap::new(0);
    }
}
