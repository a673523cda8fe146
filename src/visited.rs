//! Visited-list pool (C3): reusable "has this vertex been touched in this
//! traversal" scratchpads with O(1) reset via a generation tag.
//!
//! Each scratchpad holds a `u16` tag per vertex capacity; a vertex is
//! "visited" iff its tag equals the scratchpad's current generation.
//! `reset()` bumps the generation instead of re-zeroing the array, except on
//! the rare wraparound where the array genuinely must be cleared.

use std::sync::{Arc, Mutex, PoisonError};

/// One reusable visited-tracking scratchpad.
#[derive(Debug)]
pub struct Scratchpad {
    tags: Vec<u16>,
    generation: u16,
}

impl Scratchpad {
    fn new(capacity: usize) -> Self {
        Self {
            tags: vec![0; capacity],
            generation: 1,
        }
    }

    /// Mark `idx` as visited in the current traversal.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds for the pool's capacity.
    pub fn visit(&mut self, idx: usize) {
        self.tags[idx] = self.generation;
    }

    /// Whether `idx` has been visited in the current traversal.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds for the pool's capacity.
    #[must_use]
    pub fn is_visited(&self, idx: usize) -> bool {
        self.tags[idx] == self.generation
    }

    /// Begin a new traversal: increment the generation so every tag from the
    /// previous traversal reads as unvisited. Zeroes the array on the rare
    /// wraparound through zero.
    fn reset(&mut self) {
        let (next, wrapped) = self.generation.overflowing_add(1);
        if wrapped {
            self.tags.iter_mut().for_each(|t| *t = 0);
            self.generation = 1;
        } else {
            self.generation = next;
        }
    }
}

/// Pool of [`Scratchpad`]s, sized once for the owning graph's fixed
/// capacity, behind a mutex-guarded free list. `checkout` returns a scoped
/// [`ScratchpadGuard`] that returns its scratchpad to the pool on every exit
/// path, including unwinding.
pub struct VisitedListPool {
    capacity: usize,
    free: Mutex<Vec<Scratchpad>>,
}

impl VisitedListPool {
    /// Create a pool sized for `capacity` vertices.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Acquire a scratchpad, reusing one from the free list if available.
    /// The scratchpad's generation is advanced so it starts each checkout
    /// clean.
    #[must_use]
    pub fn checkout(self: &Arc<Self>) -> ScratchpadGuard {
        let mut scratchpad = {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.pop().unwrap_or_else(|| Scratchpad::new(self.capacity))
        };
        scratchpad.reset();
        ScratchpadGuard {
            pool: self.clone(),
            scratchpad: Some(scratchpad),
        }
    }
}

/// RAII handle to a checked-out [`Scratchpad`]. Returns the scratchpad to
/// its pool's free list when dropped.
pub struct ScratchpadGuard {
    pool: Arc<VisitedListPool>,
    scratchpad: Option<Scratchpad>,
}

impl std::ops::Deref for ScratchpadGuard {
    type Target = Scratchpad;
    fn deref(&self) -> &Scratchpad {
        self.scratchpad.as_ref().expect("scratchpad taken")
    }
}

impl std::ops::DerefMut for ScratchpadGuard {
    fn deref_mut(&mut self) -> &mut Scratchpad {
        self.scratchpad.as_mut().expect("scratchpad taken")
    }
}

impl Drop for ScratchpadGuard {
    fn drop(&mut self) {
        if let Some(scratchpad) = self.scratchpad.take() {
            let mut free = self
                .pool
                .free
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            free.push(scratchpad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_and_query() {
        let mut s = Scratchpad::new(4);
        assert!(!s.is_visited(2));
        s.visit(2);
        assert!(s.is_visited(2));
        assert!(!s.is_visited(0));
    }

    #[test]
    fn reset_clears_without_full_rewrite() {
        let mut s = Scratchpad::new(4);
        s.visit(1);
        s.reset();
        assert!(!s.is_visited(1));
    }

    #[test]
    fn generation_wraparound_zeroes_array() {
        let mut s = Scratchpad::new(2);
        s.generation = u16::MAX;
        s.visit(0);
        s.reset();
        assert_eq!(s.generation, 1);
        assert!(!s.is_visited(0));
        assert!(s.tags.iter().all(|&t| t == 0));
    }

    #[test]
    fn pool_reuses_released_scratchpads() {
        let pool = Arc::new(VisitedListPool::new(8));
        {
            let mut guard = pool.checkout();
            guard.visit(3);
        }
        assert_eq!(pool.free.lock().unwrap().len(), 1);
        let guard = pool.checkout();
        assert!(!guard.is_visited(3), "checkout must reset generation");
    }

    #[test]
    fn pool_releases_on_panic_unwind() {
        let pool = Arc::new(VisitedListPool::new(4));
        let pool2 = pool.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = pool2.checkout();
            panic!("simulated failure mid-traversal");
        });
        assert!(result.is_err());
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
