//! Portable wait-word backend for non-Linux Unix targets without a futex
//! syscall: a `Mutex`/`Condvar` pair guarding the same notion of "work
//! available" the Linux backend implements directly on the atomic word.
//!
//! This does not use the shared atomic `word` for synchronization (the
//! mutex is the source of truth here); it only reads `word` to decide
//! whether to block at all, keeping behavior consistent with the futex
//! backend's happens-before relationship.

use core::sync::atomic::AtomicI32;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

static PARK: Mutex<()> = Mutex::new(());
static CONDVAR: Condvar = Condvar::new();

pub(super) fn wait(word: &AtomicI32, expected: i32) {
    let guard = PARK.lock().unwrap_or_else(|e| e.into_inner());
    // Bound the wait so a racing notify that happened between our caller's
    // load and our lock acquisition is never missed for longer than this.
    let _ = CONDVAR.wait_timeout_while(guard, Duration::from_millis(1), |_| {
        word.load(core::sync::atomic::Ordering::Acquire) == expected
    });
}

pub(super) fn wake(_word: &AtomicI32, count: i32) {
    let _guard = PARK.lock().unwrap_or_else(|e| e.into_inner());
    if count <= 1 {
        CONDVAR.notify_one();
    } else {
        CONDVAR.notify_all();
    }
}
