//! Seed scenario 3: join wakes a waiter.
//!
//! A slow task yields ten times (sleeping briefly between each) before
//! finishing; a second task joins it and should only observe completion
//! after the last yield. Exercises the `Awaitable` wait list and the wake
//! path back out of it.

use mntask::Task;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    env_logger::init();

    let finished = Arc::new(AtomicBool::new(false));
    let yields_done = Arc::new(AtomicUsize::new(0));

    let slow_finished = Arc::clone(&finished);
    let slow_yields = Arc::clone(&yields_done);
    let slow = Task::new(move || {
        for _ in 0..10 {
            std::thread::sleep(Duration::from_millis(1));
            Task::yield_now();
            slow_yields.fetch_add(1, Ordering::SeqCst);
        }
        slow_finished.store(true, Ordering::SeqCst);
        println!("slow task done after {} yields", slow_yields.load(Ordering::SeqCst));
    });

    let slow_ptr: *const Task = slow.as_ref();
    // SAFETY: `slow` is only dropped after this closure (run on the waiter
    // task) and the later `slow.join()` on the main thread have both
    // finished running; the pointer never outlives `slow` itself.
    let slow_ref: &'static Task = unsafe { &*slow_ptr };
    let waiter_finished = Arc::clone(&finished);
    let waiter_yields = Arc::clone(&yields_done);
    let waiter = Task::new(move || {
        slow_ref.join();
        assert!(waiter_finished.load(Ordering::SeqCst));
        assert_eq!(waiter_yields.load(Ordering::SeqCst), 10);
        println!("waiter observed completion");
    });

    waiter.join();
    slow.join();
}
