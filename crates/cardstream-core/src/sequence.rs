//! Per-session sequence numbers
//!
//! The render surface only accepts updates whose sequence is strictly
//! greater than the last one it saw. [`SequenceAllocator::issue`] runs the
//! caller's hand-off while the counter is still locked, so numbers reach
//! the dispatch queue in the order they were handed out.

use parking_lot::Mutex;

/// Strictly increasing counter scoped to one render session
#[derive(Debug)]
pub struct SequenceAllocator {
    next: Mutex<u64>,
    base: u64,
}

impl SequenceAllocator {
    /// Create an allocator whose first number is `base`
    #[inline]
    #[must_use]
    pub fn new(base: u64) -> Self {
        Self {
            next: Mutex::new(base),
            base,
        }
    }

    /// Take the next number
    #[inline]
    pub fn next(&self) -> u64 {
        self.issue(|sequence| sequence)
    }

    /// Take the next number and run `f` with it before releasing the lock
    ///
    /// `f` must not block; it is meant for enqueueing onto an unbounded
    /// channel.
    pub fn issue<R>(&self, f: impl FnOnce(u64) -> R) -> R {
        let mut next = self.next.lock();
        let sequence = *next;
        *next += 1;
        f(sequence)
    }

    /// Number the next call to [`next`](Self::next) would return
    #[inline]
    #[must_use]
    pub fn peek(&self) -> u64 {
        *self.next.lock()
    }

    /// How many numbers have been handed out
    #[inline]
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.peek() - self.base
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}
