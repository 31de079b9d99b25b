//! Synchronization helpers shared by the parallel samplers.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A mutex that is granted in the order it was requested.
///
/// Each call to [`lock`] takes a ticket and waits until its number is served, so a thread that
/// locks in a loop cannot starve another that is waiting. Chains hold their current hypothesis
/// in one of these: the swapper between tempered chains gets its turn even while a sampler
/// steps continuously.
///
/// A panic while the lock is held does not poison it for later users.
///
/// # Examples
///
/// ```
/// use lotinduction::sync::OrderedLock;
/// use std::sync::Arc;
/// use std::thread;
///
/// let counter = Arc::new(OrderedLock::new(0));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let counter = Arc::clone(&counter);
///         thread::spawn(move || {
///             for _ in 0..100 {
///                 *counter.lock() += 1;
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(*counter.lock(), 400);
/// ```
///
/// [`lock`]: #method.lock
#[derive(Debug)]
pub struct OrderedLock<T> {
    tickets: Mutex<Tickets>,
    turn: Condvar,
    value: Mutex<T>,
}
#[derive(Debug)]
struct Tickets {
    next: u64,
    serving: u64,
}
impl<T> OrderedLock<T> {
    pub fn new(value: T) -> Self {
        OrderedLock {
            tickets: Mutex::new(Tickets {
                next: 0,
                serving: 0,
            }),
            turn: Condvar::new(),
            value: Mutex::new(value),
        }
    }
    /// Block until every earlier caller has had and released the lock, then take it.
    pub fn lock(&self) -> OrderedLockGuard<'_, T> {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = tickets.next;
        tickets.next += 1;
        while tickets.serving != ticket {
            tickets = self
                .turn
                .wait(tickets)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(tickets);
        OrderedLockGuard {
            lock: self,
            guard: self.value.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
    pub fn into_inner(self) -> T {
        self.value
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Access to the value of an [`OrderedLock`]. The next ticket is served when this is dropped.
///
/// [`OrderedLock`]: struct.OrderedLock.html
pub struct OrderedLockGuard<'a, T> {
    lock: &'a OrderedLock<T>,
    guard: MutexGuard<'a, T>,
}
impl<'a, T> Deref for OrderedLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}
impl<'a, T> DerefMut for OrderedLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
impl<'a, T> Drop for OrderedLockGuard<'a, T> {
    fn drop(&mut self) {
        // the inner guard is released right after this; the next ticket waits on it briefly
        let mut tickets = self
            .lock
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tickets.serving += 1;
        self.lock.turn.notify_all();
    }
}

/// The last `capacity` values of a stream, and a count of everything ever added.
///
/// ```
/// use lotinduction::sync::FiniteHistory;
///
/// let mut accepted = FiniteHistory::new(3);
/// for &x in &[true, false, true, true] {
///     accepted.add(x);
/// }
/// assert_eq!(accepted.len(), 3);
/// assert_eq!(accepted.total(), 4);
/// assert_eq!(accepted.mean(), Some(2.0 / 3.0));
/// ```
#[derive(Debug, Clone)]
pub struct FiniteHistory<T> {
    window: VecDeque<T>,
    capacity: usize,
    total: u64,
}
impl<T> FiniteHistory<T> {
    pub fn new(capacity: usize) -> Self {
        FiniteHistory {
            window: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }
    pub fn add(&mut self, x: T) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(x);
    }
    /// Values currently remembered.
    pub fn len(&self) -> usize {
        self.window.len()
    }
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
    /// Values ever added.
    pub fn total(&self) -> u64 {
        self.total
    }
    /// Remembered values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.window.iter()
    }
    pub fn clear(&mut self) {
        self.window.clear();
        self.total = 0;
    }
}
impl<T: Copy + Into<f64>> FiniteHistory<T> {
    /// The mean of the remembered values, if there are any. For booleans this is the fraction
    /// that were true.
    pub fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            let sum: f64 = self.window.iter().map(|&x| x.into()).sum();
            Some(sum / self.window.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn waiting_threads_are_served_in_order() {
        let lock = Arc::new(OrderedLock::new(Vec::new()));
        let guard = lock.lock();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lock = Arc::clone(&lock);
                let handle = thread::spawn(move || lock.lock().push(i));
                // let this thread take its ticket before the next one starts
                thread::sleep(Duration::from_millis(50));
                handle
            })
            .collect();
        drop(guard);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn history_forgets_oldest() {
        let mut h = FiniteHistory::new(2);
        assert_eq!(h.mean(), None);
        h.add(1.0);
        h.add(2.0);
        h.add(4.0);
        assert_eq!(h.iter().copied().collect::<Vec<f64>>(), vec![2.0, 4.0]);
        assert_eq!(h.mean(), Some(3.0));
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.total(), 0);
    }
}
