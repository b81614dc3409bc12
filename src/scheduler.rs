//! The process-wide scheduler singleton: picks the next runnable task,
//! performs the context switch, and runs the post-switch fixup that keeps
//! the "exactly one thread observes a task with `context == null`" invariant
//! intact.
//!
//! Grounded on `alterstack/src/scheduler.cpp` in full (`do_schedule`,
//! `switch_to`, `post_jump_fcontext`, `get_next_task`,
//! `add_waiting_list_to_running`, `wait_while_context_is_null`) and
//! `alterstack/include/alterstack/scheduler.hpp`.

use crate::background::BgRunner;
use crate::config::{CONTEXT_NULL_FIRST_BACKOFF, CONTEXT_NULL_RETRY_BACKOFF, DEFAULT_MIN_SPARE_WORKERS};
use crate::context::{self, Transfer};
use crate::priority_queue::PriorityQueue;
use crate::runner::{self, RunnerKind};
use crate::task::{Task, TaskState};
use std::sync::OnceLock;

struct Scheduler {
    running_queue: PriorityQueue<Task>,
    bg_runner: BgRunner,
}

static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();
static POOL_CAPACITY: OnceLock<(u32, u32)> = OnceLock::new();

/// Overrides the background pool's `(min_spare, max_running)` sizing before
/// the scheduler singleton is first touched. Has no effect once a task has
/// already been spawned or joined on this process (the singleton has
/// already latched in its default sizing by then), mirroring
/// `BgRunner::with_capacity`'s role as a constructor-time parameter rather
/// than a live-reconfiguration knob.
pub fn configure_background_pool(min_spare: u32, max_running: u32) {
    let _ = POOL_CAPACITY.set((min_spare, max_running));
}

fn instance() -> &'static Scheduler {
    SCHEDULER.get_or_init(|| {
        let (min_spare, max_running) = POOL_CAPACITY
            .get()
            .copied()
            .unwrap_or((DEFAULT_MIN_SPARE_WORKERS, DEFAULT_MIN_SPARE_WORKERS));
        log::debug!("Scheduler: constructing singleton, min_spare={min_spare}, max_running={max_running}");
        Scheduler {
            running_queue: PriorityQueue::new(),
            bg_runner: BgRunner::with_capacity(min_spare, max_running),
        }
    })
}

/// Returns the current OS thread's current task, lazily falling back to its
/// native (thread-bound) task if nothing has been set yet.
pub(crate) fn current_task() -> *mut Task {
    let current = runner::current_task_raw();
    if current.is_null() {
        let native = runner::native_task();
        runner::set_current_task(native);
        native
    } else {
        current
    }
}

/// Switches immediately from the calling context to `task`, leaving the
/// caller's own context stored once it is later resumed.
pub(crate) fn run_new_task(task: *mut Task) {
    log::debug!("Scheduler::run_new_task: {task:p}");
    switch_to(task);
}

/// Picks the next runnable task and switches to it. Returns `false` without
/// switching if nothing is runnable and `current` may simply keep running;
/// blocks and retries if `current` is a thread-bound task with nothing left
/// to do but wait.
pub(crate) fn schedule(current: *mut Task) -> bool {
    loop {
        if let Some(next) = get_next_task(current) {
            switch_to(next);
            return true;
        }
        // SAFETY: `current` is always a live task pointer supplied by a
        // suspension point on its own thread.
        let state = unsafe { (*current).state() };
        if state == TaskState::Running {
            log::trace!("Scheduler::schedule: nowhere to switch, continuing current task");
            return false;
        }
        // Only a thread-bound task reaches here: an unbound current task in
        // Waiting/Finished state always finds its native task via
        // `get_next_task`'s fallback case, so `next` would have been `Some`
        // above.
        log::trace!("Scheduler::schedule: thread-bound task idle, parking on wait word");
        runner::wait_on_native_wait_word();
    }
}

/// Runs the post-switch fixup for the first time a freshly made context is
/// entered — identical bookkeeping to what a normal `switch_to` resume does,
/// since a fresh context's entry function stands in for "control returned
/// from `jump_context`" the first time it is ever resumed.
pub(crate) fn on_task_entry(transfer: Transfer) {
    post_switch_fixup(transfer);
}

fn switch_to(next: *mut Task) {
    let old = current_task();
    runner::set_current_task(next);
    // SAFETY: `next` was selected by `get_next_task`, which only ever
    // returns tasks whose context is non-null (enqueue is deferred until
    // context is observed non-null; the native-task fallback always holds a
    // context saved by this same thread's own prior switch).
    let next_ctx = unsafe { (*next).context_ptr() };
    debug_assert!(!next_ctx.is_null(), "switch_to target has a null context");
    log::trace!("Scheduler::switch_to: {old:p} -> {next:p}");
    // SAFETY: `next_ctx` is a context this thread is the sole owner of
    // resuming, per the invariant above; `old` outlives the jump (it is a
    // live task pointer, either unbound and about to be re-enqueued or
    // thread-bound and kept alive by its owning OS thread).
    let transfer = unsafe { context::jump_context(next_ctx, old as *mut u8) };
    post_switch_fixup(transfer);
}

/// Shared tail of both a resumed `switch_to` call and a freshly entered
/// context's first invocation: finalizes the task that switched away from
/// us (storing its new saved context, re-enqueueing it if it is still
/// runnable) and clears our own context now that we are the one running.
fn post_switch_fixup(transfer: Transfer) {
    let current = runner::current_task_raw();
    debug_assert!(!current.is_null(), "post_switch_fixup with no current task set");
    // SAFETY: `current` was just set by the switching thread in `switch_to`
    // before the jump that landed here.
    unsafe {
        (*current).clear_context();
    }
    let prev_task = transfer.data as *mut Task;
    // SAFETY: `prev_task` is the `old` pointer `switch_to` passed as `data`;
    // it stays alive at least until this fixup runs (see `switch_to`'s
    // safety comment).
    unsafe {
        (*prev_task).store_context(transfer.context);
        if !(*prev_task).is_thread_bound() && (*prev_task).state() == TaskState::Running {
            log::trace!("Scheduler::post_switch_fixup: re-enqueueing {prev_task:p}");
            enqueue_unbound_task(prev_task);
        }
    }
}

/// Implements the next-task selection algorithm.
fn get_next_task(current: *mut Task) -> Option<*mut Task> {
    // SAFETY: `current` is a live task pointer for the duration of this call.
    let is_thread_bound = unsafe { (*current).is_thread_bound() };
    let mut next = if is_thread_bound {
        get_running_from_queue()
    } else {
        match runner::kind() {
            RunnerKind::Common => get_running_from_native().or_else(get_running_from_queue),
            RunnerKind::Background => get_running_from_queue(),
        }
    };
    if next.is_none() && !is_thread_bound {
        // SAFETY: see above.
        let state = unsafe { (*current).state() };
        if state == TaskState::Finished || state == TaskState::Waiting {
            log::trace!("Scheduler::get_next_task: unwinding unbound current back to native task");
            next = Some(runner::native_task());
        }
    }
    next
}

fn get_running_from_queue() -> Option<*mut Task> {
    let mut have_more = false;
    let task = instance().running_queue.get_item(&mut have_more);
    if task.is_some() {
        log::trace!("Scheduler::get_running_from_queue: got task, have_more={have_more}");
        if have_more {
            instance().bg_runner.notify();
        }
    }
    task
}

fn get_running_from_native() -> Option<*mut Task> {
    let native = runner::native_task();
    // SAFETY: `native_task()` always returns a valid, live pointer owned by
    // this thread's runner.
    if unsafe { (*native).state() } == TaskState::Running {
        Some(native)
    } else {
        None
    }
}

fn enqueue_unbound_task(task: *mut Task) {
    debug_assert!(!task.is_null());
    // SAFETY: `task` is a live, unbound task pointer about to be published
    // to other threads through the priority queue.
    let priority = unsafe { (*task).priority() };
    instance().running_queue.put_item(task, priority);
    log::trace!("Scheduler::enqueue_unbound_task: {task:p} at priority {priority}");
    instance().bg_runner.notify();
}

/// Moves every task on a just-released wait list back onto the runnable
/// path: thread-bound tasks are woken directly through their wait word,
/// unbound tasks are enqueued once their context is observably non-null
/// (deferred with a short bounded backoff otherwise, to avoid racing a
/// switch still in flight on another thread).
pub(crate) fn wake_list_to_running(task_list: *mut Task) {
    debug_assert!(!task_list.is_null());
    let mut deferred: *mut Task = core::ptr::null_mut();
    let mut list = task_list;
    while !list.is_null() {
        let task = list;
        // SAFETY: `task` is a valid node of a list this call exclusively
        // owns (handed over once by `Awaitable::release`).
        unsafe {
            list = (*task).next();
            (*task).set_next(core::ptr::null_mut());
            (*task).set_state_running();
        }
        if unsafe { (*task).is_thread_bound() } {
            log::trace!("Scheduler::wake_list_to_running: waking thread-bound task {task:p}");
            unsafe {
                (*task).notify_thread_bound();
            }
        } else if unsafe { (*task).context_ptr() }.is_null() {
            // Task is not yet suspended (a racing wake); defer enqueueing
            // until its context is observably non-null.
            unsafe {
                (*task).set_next(deferred);
            }
            deferred = task;
        } else {
            enqueue_unbound_task(task);
        }
    }
    while !deferred.is_null() {
        let task = deferred;
        // SAFETY: same as above, this is a list this call exclusively owns.
        unsafe {
            deferred = (*task).next();
            (*task).set_next(core::ptr::null_mut());
        }
        wait_while_context_is_null(task);
        enqueue_unbound_task(task);
    }
}

/// Spin-backoff used while a racing wake waits for a task's context to
/// become observable. The window this covers is normally extremely brief:
/// the switching thread is already mid-way through `switch_to`.
fn wait_while_context_is_null(task: *mut Task) {
    // SAFETY: `task` is a live pointer for the duration of this call.
    if unsafe { (*task).context_ptr() }.is_null() {
        log::trace!("Scheduler::wait_while_context_is_null: waiting for {task:p}");
        std::thread::sleep(CONTEXT_NULL_FIRST_BACKOFF);
        while unsafe { (*task).context_ptr() }.is_null() {
            std::thread::sleep(CONTEXT_NULL_RETRY_BACKOFF);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequential_test::sequential;

    #[test]
    #[sequential]
    fn yield_with_empty_queue_returns_false() {
        let current = current_task();
        assert!(!schedule(current));
    }

    #[test]
    #[sequential]
    fn single_task_runs_and_joins() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let task = Task::new(move || {
            ran_clone.store(true, Ordering::SeqCst);
        });
        task.join();
        assert!(ran.load(Ordering::SeqCst));
    }
}
