//! Wait-list / join primitive embedded in every [`crate::task::Task`].
//!
//! Grounded on `alterstack/src/awaitable.cpp` in full: a single atomic word
//! encodes `{ head: *mut Task, is_finished: bool }`. Once `is_finished`
//! flips true it never reverts; while false, `head` points at an intrusive
//! list of tasks parked here, each in `Waiting` state.

use crate::scheduler;
use crate::task::Task;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Packs `{head, is_finished}` into one word: the low bit carries
/// `is_finished`, the rest carries the pointer. Valid because `Task` is
/// never placed at an odd address (the allocator always returns addresses
/// aligned to the struct's alignment, which is at least 2 given it
/// contains 8-byte atomics).
#[inline]
fn pack(head: *mut Task, is_finished: bool) -> usize {
    debug_assert_eq!(head as usize & 1, 0, "Task pointer must be at least 2-byte aligned");
    (head as usize) | (is_finished as usize)
}

#[inline]
fn unpack(word: usize) -> (*mut Task, bool) {
    ((word & !1usize) as *mut Task, word & 1 != 0)
}

pub struct Awaitable {
    data: AtomicUsize,
}

impl Default for Awaitable {
    fn default() -> Self {
        Self::new()
    }
}

impl Awaitable {
    pub const fn new() -> Self {
        Awaitable {
            data: AtomicUsize::new(0),
        }
    }

    /// Links the calling thread's current task onto this Awaitable's wait
    /// list. Returns `false` (without modifying task state) if the
    /// Awaitable had already finished.
    fn insert_current_task_in_waitlist(&self) -> bool {
        let current = scheduler::current_task();
        let mut observed = self.data.load(Ordering::Acquire);
        let (mut head, mut finished) = unpack(observed);
        if finished {
            return false;
        }
        // Locking not needed: the only other transition this task's state
        // can undergo right now is Waiting -> Running on wakeup, and it
        // cannot be woken before it is actually linked into the list below.
        unsafe {
            (*current).set_state_waiting();
            (*current).clear_context();
            (*current).set_next(head);
        }
        loop {
            let new_word = pack(current, false);
            match self
                .data
                .compare_exchange_weak(observed, new_word, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => {
                    observed = actual;
                    let (h, f) = unpack(observed);
                    head = h;
                    finished = f;
                    if finished {
                        // Raced with release(): undo the state change and
                        // report "not actually queued".
                        unsafe {
                            (*current).set_state_running();
                            (*current).set_context_sentinel();
                        }
                        return false;
                    }
                    unsafe {
                        (*current).set_next(head);
                    }
                }
            }
        }
    }

    /// Parks the current task here until [`Awaitable::release`] is called,
    /// unless this Awaitable has already finished, in which case this
    /// returns immediately.
    pub fn wait(&self) {
        if self.insert_current_task_in_waitlist() {
            scheduler::schedule(scheduler::current_task());
        }
    }

    /// Marks this Awaitable finished and moves every waiter back onto the
    /// runnable queue (or its native runner's wait word). Idempotent:
    /// concurrent calls observe `is_finished == true` and become no-ops.
    pub fn release(&self) {
        let mut observed = self.data.load(Ordering::Acquire);
        loop {
            let (_, finished) = unpack(observed);
            if finished {
                return;
            }
            let new_word = pack(core::ptr::null_mut(), true);
            match self
                .data
                .compare_exchange_weak(observed, new_word, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }
        let (head, _) = unpack(observed);
        if !head.is_null() {
            scheduler::wake_list_to_running(head);
        }
    }

    pub fn is_finished(&self) -> bool {
        unpack(self.data.load(Ordering::Acquire)).1
    }
}

impl Drop for Awaitable {
    fn drop(&mut self) {
        let (head, finished) = unpack(self.data.load(Ordering::Acquire));
        if finished || head.is_null() {
            return;
        }
        // Reaching here means a task is being destroyed while other tasks
        // are still parked on it without anyone ever having called
        // `release()` — a programming error upstream. Parking here rather
        // than corrupting the still-linked waiters mirrors the original's
        // defensive `wait()` call in this situation.
        self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use sequential_test::sequential;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn fresh_awaitable_is_not_finished() {
        let a = Awaitable::new();
        assert!(!a.is_finished());
    }

    #[test]
    fn release_is_idempotent_with_no_waiters() {
        let a = Awaitable::new();
        a.release();
        assert!(a.is_finished());
        a.release();
        assert!(a.is_finished());
    }

    #[test]
    fn pack_unpack_roundtrips() {
        let ptr = 0x1000usize as *mut Task;
        assert_eq!(unpack(pack(ptr, false)), (ptr, false));
        assert_eq!(unpack(pack(ptr, true)), (ptr, true));
        assert_eq!(unpack(pack(core::ptr::null_mut(), true)), (core::ptr::null_mut(), true));
    }

    #[test]
    #[sequential]
    fn join_on_already_finished_task_returns_immediately() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let task = Task::new(move || {
            ran_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        task.join();
        task.join();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
