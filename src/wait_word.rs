//! Kernel wait word: a futex-like primitive used to block and wake an OS
//! thread that has run out of runnable tasks.
//!
//! Algorithm (see `alterstack/include/alterstack/Futex.hpp`):
//!
//! `wait()` tries to consume a pending "have work" flag without sleeping;
//! only if none is pending does it register itself as a waiter and block on
//! the kernel primitive. `notify(n)` sets the flag before checking whether
//! anyone is waiting, so a notify that races a wait can never be lost: the
//! waiter either observes the flag already set (and returns immediately) or
//! is woken by the kernel call.

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        use linux as backend;
    } else {
        mod portable;
        use portable as backend;
    }
}

/// A single wait/notify slot, analogous to the original `Futex` class.
///
/// One `WaitWord` is embedded per [`crate::runner::TaskRunner`], used by
/// thread-bound tasks (including background workers) to park when there is
/// nothing runnable.
pub struct WaitWord {
    have_work: AtomicI32,
    wait_count: AtomicU32,
}

impl Default for WaitWord {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitWord {
    pub const fn new() -> Self {
        WaitWord {
            have_work: AtomicI32::new(1),
            wait_count: AtomicU32::new(0),
        }
    }

    /// Blocks until some other thread calls [`WaitWord::notify`], unless
    /// work was already flagged as available, in which case this returns
    /// immediately having consumed the flag.
    pub fn wait(&self) {
        let have_work = self.have_work.load(Ordering::Acquire);
        if have_work != 0 {
            let had_work = self.have_work.swap(0, Ordering::Release);
            if had_work != 0 {
                return;
            }
        }
        self.wait_count.fetch_add(1, Ordering::Relaxed);
        backend::wait(&self.have_work, 0);
        self.wait_count.fetch_sub(1, Ordering::Release);
    }

    /// Wakes up to `count` waiters, setting the "have work" flag first so a
    /// concurrent `wait()` can never miss this notification.
    pub fn notify(&self, count: i32) {
        if self.have_work.load(Ordering::Acquire) == 0 {
            self.have_work.store(1, Ordering::Release);
        }
        if self.wait_count.load(Ordering::Acquire) > 0 {
            backend::wake(&self.have_work, count);
        }
    }

    /// Wakes every thread currently waiting on this word.
    pub fn notify_all(&self) {
        self.notify(i32::MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn notify_before_wait_is_not_lost() {
        let word = WaitWord::new();
        word.notify(1);
        // have_work was already 1 at construction plus the notify; either
        // way wait() must return without blocking.
        word.wait();
    }

    #[test]
    fn waiter_wakes_on_notify() {
        let word = Arc::new(WaitWord::new());
        // Drain the initial "have work" state so the waiter actually parks.
        word.wait();

        let waiter = Arc::clone(&word);
        let handle = thread::spawn(move || {
            waiter.wait();
        });

        thread::sleep(Duration::from_millis(20));
        word.notify(1);
        handle.join().expect("waiter thread panicked");
    }

    #[test]
    fn double_notify_all_wakes_no_one_extra() {
        let word = WaitWord::new();
        word.notify_all();
        word.notify_all();
        // No waiters were ever registered; this must simply not panic or
        // hang.
    }
}
