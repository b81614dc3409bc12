//! Background worker thread pool.
//!
//! Grounded on `alterstack/include/alterstack/BgThread.hpp` +
//! `alterstack/src/bg_thread.cpp` (per-worker idle loop, `stop_requested`/
//! `wake_up`/`ensure_thread_stopped` shape) and
//! `alterstack/include/alterstack/BgRunner.hpp` + `alterstack/src/bg_runner.cpp`
//! (pool construction from `min_spare`, `sleep_count`-gated `notify`).
//!
//! Each worker is a thread-bound task running the scheduler's idle loop; it
//! parks on its own runner's wait word (the same word a task wake-up would
//! notify if this thread's native task were ever a join target) whenever
//! the runnable queue comes up empty.

use crate::runner::{self, WaitWordHandle};
use crate::scheduler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One background OS thread running the scheduler idle loop.
struct BgWorker {
    stop_requested: Arc<AtomicBool>,
    /// Set right before this worker parks on its wait word, cleared right
    /// after. Used by [`BgRunner::notify`] to pick at most one sleeping
    /// worker to wake, the way the original's shared `sleep_count` gate
    /// decides whether a kernel wake is worth issuing at all.
    sleeping: Arc<AtomicBool>,
    wait_word: WaitWordHandle,
    handle: Option<JoinHandle<()>>,
}

impl BgWorker {
    fn spawn(id: u32) -> BgWorker {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let sleeping = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<WaitWordHandle>();
        let worker_stop = Arc::clone(&stop_requested);
        let worker_sleeping = Arc::clone(&sleeping);
        let handle = thread::Builder::new()
            .name(format!("mntask-bg-{id}"))
            .spawn(move || {
                runner::make_background_runner();
                // SAFETY: sent once, immediately, before this thread's
                // native task can be touched by anyone else; the receiving
                // end only reads it after this thread is alive and has
                // registered, and the thread outlives every use of it (the
                // pointer is only dereferenced by `BgRunner::notify`, which
                // stops being called once `stop_requested` is observed and
                // the thread has been joined).
                let handle = unsafe { runner::wait_word_handle() };
                if tx.send(handle).is_err() {
                    return;
                }
                worker_loop(&worker_stop, &worker_sleeping);
            })
            .expect("mntask: failed to spawn background worker thread");
        let wait_word = rx
            .recv()
            .expect("mntask: background worker thread exited before registering its wait word");
        BgWorker {
            stop_requested,
            sleeping,
            wait_word,
            handle: Some(handle),
        }
    }
}

fn worker_loop(stop_requested: &AtomicBool, sleeping: &AtomicBool) {
    let native = runner::native_task();
    loop {
        scheduler::schedule(native);
        if stop_requested.load(Ordering::Acquire) {
            log::debug!("background worker: stop requested, exiting");
            return;
        }
        sleeping.store(true, Ordering::Release);
        runner::wait_on_native_wait_word();
        sleeping.store(false, Ordering::Release);
        if stop_requested.load(Ordering::Acquire) {
            log::debug!("background worker: stop requested after wake, exiting");
            return;
        }
    }
}

/// Pool of background worker threads the scheduler wakes to drain the
/// runnable queue when no application thread is available to do so.
pub(crate) struct BgRunner {
    workers: Vec<BgWorker>,
    /// Stored for forward compatibility with the original's `set_max_cores`,
    /// which is itself unimplemented in the reference source; this crate
    /// does not grow the pool beyond `min_spare` either. See `DESIGN.md`.
    #[allow(dead_code)]
    max_running: u32,
}

impl BgRunner {
    /// Spawns `min_spare` workers, capped by available concurrency.
    pub(crate) fn with_capacity(min_spare: u32, max_running: u32) -> BgRunner {
        let available = thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        let count = min_spare.min(available).max(1);
        log::debug!("BgRunner: spawning {count} background worker(s)");
        let workers = (0..count).map(BgWorker::spawn).collect();
        BgRunner { workers, max_running }
    }

    /// Wakes at most one sleeping worker, skipping the kernel call entirely
    /// if none is currently parked.
    pub(crate) fn notify(&self) {
        for worker in &self.workers {
            if worker.sleeping.swap(false, Ordering::AcqRel) {
                worker.wait_word.notify(1);
                return;
            }
        }
    }

    /// Wakes every worker unconditionally; used only during shutdown, where
    /// every worker must observe `stop_requested` and exit.
    fn notify_all(&self) {
        for worker in &self.workers {
            worker.wait_word.notify_all();
        }
    }
}

impl Drop for BgRunner {
    fn drop(&mut self) {
        log::debug!("BgRunner: stopping {} worker(s)", self.workers.len());
        for worker in &self.workers {
            worker.stop_requested.store(true, Ordering::Release);
        }
        self.notify_all();
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_and_stops_cleanly() {
        let pool = BgRunner::with_capacity(2, 2);
        assert!(!pool.workers.is_empty());
        pool.notify();
        drop(pool);
    }
}
