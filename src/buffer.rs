//! Fixed-capacity, drop-on-full staging queue shared between a receiver and
//! a processor thread.
//!
//! Overflow is a metered loss, not an error: once `full` is set, further
//! inserts are no-ops until the consumer clears the buffer. This is the
//! detector's back-pressure policy, not a bug to route around.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Inner<T> {
    items: Vec<T>,
    capacity: usize,
    full: bool,
}

/// Thread-safe fixed-capacity buffer with condvar-notified inserts.
///
/// `wait_for_pull_all` waits on this buffer's own mutex/condvar pair, not a
/// throwaway local one, so a notification fired between a caller's emptiness
/// check and its wait is never lost.
pub struct BoundedBuffer<T> {
    inner: Mutex<Inner<T>>,
    data_added: Condvar,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedBuffer {
            inner: Mutex::new(Inner {
                items: Vec::with_capacity(capacity),
                capacity,
                full: false,
            }),
            data_added: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    pub fn full(&self) -> bool {
        self.inner.lock().unwrap().full
    }

    pub fn empty(&self) -> bool {
        self.inner.lock().unwrap().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    /// Blocking insert. Appends up to the remaining free space, then sets
    /// the full flag; any overflow from `items` is dropped silently.
    pub fn insert<I: IntoIterator<Item = T>>(&self, items: I) {
        let mut guard = self.inner.lock().unwrap();
        push_bounded(&mut guard, items);
        self.data_added.notify_all();
    }

    /// Non-blocking insert. If the lock is already held, returns without
    /// copying anything — the producer accepts the loss rather than block.
    pub fn try_insert<I: IntoIterator<Item = T>>(&self, items: I) {
        if let Ok(mut guard) = self.inner.try_lock() {
            push_bounded(&mut guard, items);
            self.data_added.notify_all();
        }
    }

    /// Blocking drain: moves every element out to the caller, clearing the
    /// full flag.
    pub fn copy_and_clear(&self, out: &mut Vec<T>) {
        let mut guard = self.inner.lock().unwrap();
        out.extend(guard.items.drain(..));
        guard.full = false;
    }

    /// Waits up to `timeout` for a notification, then drains. If the wait
    /// times out with nothing in the buffer, `out` is left untouched.
    pub fn wait_for_pull_all(&self, out: &mut Vec<T>, timeout: Duration) {
        let mut guard = self.inner.lock().unwrap();
        if guard.items.is_empty() {
            let (g, _timeout_result) = self
                .data_added
                .wait_timeout_while(guard, timeout, |inner| inner.items.is_empty())
                .unwrap();
            guard = g;
        }
        out.extend(guard.items.drain(..));
        guard.full = false;
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.items.clear();
        guard.full = false;
    }

    /// Non-blocking clear; returns `false` without acting if the lock is
    /// currently held elsewhere.
    pub fn try_clear(&self) -> bool {
        if let Ok(mut guard) = self.inner.try_lock() {
            guard.items.clear();
            guard.full = false;
            true
        } else {
            false
        }
    }
}

fn push_bounded<T, I: IntoIterator<Item = T>>(inner: &mut Inner<T>, items: I) {
    if inner.full {
        return;
    }
    let mut free_space = inner.capacity - inner.items.len();
    for item in items {
        if free_space == 0 {
            inner.full = true;
            break;
        }
        inner.items.push(item);
        free_space -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn never_grows_past_capacity() {
        let buf: BoundedBuffer<i32> = BoundedBuffer::new(3);
        buf.insert(vec![1, 2, 3, 4, 5]);
        assert!(buf.full());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn full_blocks_further_inserts_until_clear() {
        let buf: BoundedBuffer<i32> = BoundedBuffer::new(2);
        buf.insert(vec![1, 2]);
        assert!(buf.full());
        buf.insert(vec![3, 4]);
        assert_eq!(buf.len(), 2);
        buf.clear();
        assert!(!buf.full());
        assert_eq!(buf.len(), 0);
        buf.insert(vec![9]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn copy_and_clear_drains_everything() {
        let buf: BoundedBuffer<i32> = BoundedBuffer::new(4);
        buf.insert(vec![1, 2, 3]);
        let mut out = Vec::new();
        buf.copy_and_clear(&mut out);
        assert_eq!(out, vec![1, 2, 3]);
        assert!(buf.empty());
        assert!(!buf.full());
    }

    #[test]
    fn wait_for_pull_all_wakes_on_notify() {
        let buf = Arc::new(BoundedBuffer::<i32>::new(4));
        let producer = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.insert(vec![7]);
        });
        let mut out = Vec::new();
        buf.wait_for_pull_all(&mut out, Duration::from_millis(500));
        handle.join().unwrap();
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn wait_for_pull_all_times_out_leaving_container_untouched() {
        let buf: BoundedBuffer<i32> = BoundedBuffer::new(4);
        let mut out = vec![99];
        buf.wait_for_pull_all(&mut out, Duration::from_millis(20));
        assert_eq!(out, vec![99]);
    }
}
