//! File-rotation synchronization point, owned by [`super::PipelineController`]
//! and shared by reference across streams. Replaces a pair of module-level
//! atomics with a value the controller actually owns.

use std::sync::{Condvar, Mutex};

struct State {
    arrived: usize,
    generation: u64,
}

/// A reusable barrier: `arrive_and_wait` blocks until `total` callers have
/// arrived, then releases all of them and resets for the next round.
pub struct FileRotationBarrier {
    state: Mutex<State>,
    released: Condvar,
}

impl FileRotationBarrier {
    pub fn new() -> Self {
        FileRotationBarrier {
            state: Mutex::new(State { arrived: 0, generation: 0 }),
            released: Condvar::new(),
        }
    }

    /// Blocks until `total` streams have called this for the current round.
    /// Returns `true` for the caller that completed the round (the one
    /// that observed `arrived == total`), `false` for the rest.
    pub fn arrive_and_wait(&self, total: usize) -> bool {
        let mut guard = self.state.lock().unwrap();
        guard.arrived += 1;
        let my_generation = guard.generation;
        if guard.arrived < total {
            let _guard = self
                .released
                .wait_while(guard, |s| s.generation == my_generation)
                .unwrap();
            false
        } else {
            guard.arrived = 0;
            guard.generation = guard.generation.wrapping_add(1);
            self.released.notify_all();
            true
        }
    }
}

impl Default for FileRotationBarrier {
    fn default() -> Self {
        FileRotationBarrier::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn releases_all_once_total_arrivals_reached() {
        let barrier = Arc::new(FileRotationBarrier::new());
        let mut handles = Vec::new();
        for _ in 0..3 {
            let b = Arc::clone(&barrier);
            handles.push(thread::spawn(move || b.arrive_and_wait(3)));
        }
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|&&last| last).count(), 1);
    }

    #[test]
    fn barrier_is_reusable_across_rounds() {
        let barrier = FileRotationBarrier::new();
        assert!(barrier.arrive_and_wait(1));
        assert!(barrier.arrive_and_wait(1));
    }
}
