//! Seed scenario 4: priority preference.
//!
//! `set_priority` only affects a task's *next* enqueue, but `Task::new`
//! already runs the task up to its first suspend point before handing the
//! caller a handle — so a task's very first parking always happens at the
//! default priority, before the spawner gets a chance to call
//! `set_priority` on it. Every task here yields twice: the first yield just
//! buys time for the spawner to set the real priority; the second is the
//! one that actually lands the task in the right lane. Only after that
//! second round does priority order the remaining batch.

use mntask::Task;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const LOW_PRIORITY_COUNT: usize = 100;

fn main() {
    env_logger::init();

    let low_completed = Arc::new(AtomicUsize::new(0));
    let high_rank = Arc::new(AtomicUsize::new(usize::MAX));

    let mut low_tasks = Vec::with_capacity(LOW_PRIORITY_COUNT);
    for _ in 0..LOW_PRIORITY_COUNT {
        let low_completed = Arc::clone(&low_completed);
        let task = Task::new(move || {
            Task::yield_now();
            Task::yield_now();
            low_completed.fetch_add(1, Ordering::SeqCst);
        });
        task.set_priority(2);
        low_tasks.push(task);
    }

    let high_completed = Arc::clone(&low_completed);
    let high_rank_clone = Arc::clone(&high_rank);
    let high_task = Task::new(move || {
        Task::yield_now();
        Task::yield_now();
        let rank = high_completed.load(Ordering::SeqCst);
        high_rank_clone.store(rank, Ordering::SeqCst);
    });
    high_task.set_priority(0);

    // Every task is currently parked after its first yield, with its real
    // priority now set. Drive one more round of scheduling per task so each
    // re-enqueues itself under that real priority before running on to
    // completion.
    for _ in 0..=LOW_PRIORITY_COUNT {
        Task::yield_now();
    }

    high_task.join();
    for task in &low_tasks {
        task.join();
    }

    let rank = high_rank.load(Ordering::SeqCst);
    println!("high-priority task observed {rank} low-priority completions ahead of it");
    assert!(
        rank < LOW_PRIORITY_COUNT,
        "high-priority task should finish before the low-priority batch fully drains"
    );
}
