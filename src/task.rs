//! A scheduled unit of work: either an unbound task running user code on its
//! own guarded stack, or the thread-bound identity of an OS thread that has
//! entered the scheduler.
//!
//! Grounded on `alterstack/include/alterstack/task.hpp` and
//! `alterstack/src/task.cpp`. The original's `TaskBase`/`BoundTask`/`Task`
//! inheritance graph collapses into one `Task` struct carrying
//! `is_thread_bound`, per the Open Question decision recorded in
//! `DESIGN.md`.

use crate::awaitable::Awaitable;
use crate::config::{DEFAULT_STACK_SIZE, PRIORITY_LEVELS};
use crate::context::{self, RawContext, Transfer};
use crate::error;
use crate::list::IntrusiveLink;
use crate::scheduler;
use crate::stack::GuardedStack;
use crate::wait_word::WaitWord;
use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum TaskState {
    Running = 0,
    Waiting = 1,
    Finished = 2,
}

impl From<u8> for TaskState {
    fn from(v: u8) -> Self {
        match v {
            0 => TaskState::Running,
            1 => TaskState::Waiting,
            2 => TaskState::Finished,
            other => unreachable!("Task state byte {other} is not a valid TaskState"),
        }
    }
}

/// Marks a task that lost the race to park on an [`Awaitable`] (it had
/// already finished by the time the CAS landed): not really suspended, but
/// not null either, since null specifically means "some thread is actively
/// executing this task's stack right now".
fn running_sentinel() -> RawContext {
    0x1usize as RawContext
}

/// One scheduled unit of work.
///
/// An unbound task owns a [`GuardedStack`] and a boxed user callable; a
/// thread-bound task has neither and instead represents the OS thread's own
/// native call stack. Both share the rest of the state machine.
pub struct Task {
    awaitable: Awaitable,
    /// Suspended-context snapshot. Null while some thread is actively
    /// running this task; non-null while it is parked, either in the
    /// runnable queue or on an `Awaitable`'s wait list.
    context: AtomicPtr<u8>,
    state: AtomicU8,
    is_thread_bound: bool,
    priority: AtomicUsize,
    next: Cell<*mut Task>,
    stack: Option<GuardedStack>,
    runnable: UnsafeCell<Option<Box<dyn FnOnce() + Send + 'static>>>,
    /// Used to park/wake the OS thread that owns this task when it is
    /// thread-bound; unused (but harmless) for unbound tasks.
    wait_word: WaitWord,
}

impl IntrusiveLink for Task {
    fn next(&self) -> *mut Task {
        self.next.get()
    }

    fn set_next(&self, next: *mut Task) {
        self.next.set(next);
    }
}

impl Task {
    /// Spawns an unbound task running `runnable` on its own guarded stack.
    /// Scheduling begins immediately: the calling OS thread switches onto
    /// the new task before this call returns.
    pub fn new<F>(runnable: F) -> Box<Task>
    where
        F: FnOnce() + Send + 'static,
    {
        let stack = GuardedStack::new(DEFAULT_STACK_SIZE)
            .unwrap_or_else(|e| error::abort_on_stack_failure(e));
        // SAFETY: `run_wrapper` matches `EntryFn`'s signature; the stack
        // outlives the context for as long as the task is alive (it is
        // dropped together, after `Task::drop`'s spin-wait guarantees no
        // thread is still executing on it).
        let ctx = unsafe { context::make_context(stack.stack_top(), stack.size(), run_wrapper) };
        let mut task = Box::new(Task {
            awaitable: Awaitable::new(),
            context: AtomicPtr::new(ctx),
            state: AtomicU8::new(TaskState::Running as u8),
            is_thread_bound: false,
            priority: AtomicUsize::new(0),
            next: Cell::new(core::ptr::null_mut()),
            stack: Some(stack),
            runnable: UnsafeCell::new(Some(Box::new(runnable))),
            wait_word: WaitWord::new(),
        });
        let ptr: *mut Task = task.as_mut();
        log::debug!("Task::new: spawning unbound task {ptr:p}");
        scheduler::run_new_task(ptr);
        task
    }

    /// Builds the thread-bound task representing the calling OS thread's own
    /// native call stack. Only ever called once per thread, lazily, by
    /// [`crate::runner::TaskRunner`].
    pub(crate) fn new_thread_bound() -> Box<Task> {
        Box::new(Task {
            awaitable: Awaitable::new(),
            context: AtomicPtr::new(core::ptr::null_mut()),
            state: AtomicU8::new(TaskState::Running as u8),
            is_thread_bound: true,
            priority: AtomicUsize::new(0),
            next: Cell::new(core::ptr::null_mut()),
            stack: None,
            runnable: UnsafeCell::new(None),
            wait_word: WaitWord::new(),
        })
    }

    /// Yields the currently running task, letting the scheduler switch to
    /// another runnable task if one exists. Returns immediately (no switch)
    /// if nothing else is runnable.
    pub fn yield_now() {
        let current = scheduler::current_task();
        scheduler::schedule(current);
    }

    /// Blocks the calling task until `self` reaches `Finished`. Returns
    /// immediately if it already has.
    pub fn join(&self) {
        if self.state() == TaskState::Finished {
            return;
        }
        self.awaitable.wait();
    }

    /// Sets the priority lane (0 = highest) used for this task's future
    /// enqueues onto the runnable queue. Out-of-range values panic: unlike
    /// the internal priority queue (which silently clamps), misuse of the
    /// public API is a programming error worth surfacing immediately.
    pub fn set_priority(&self, priority: usize) {
        if priority >= PRIORITY_LEVELS {
            panic!(
                "Error: set_priority: priority {priority} is invalid. It must be between 0 and {}.",
                PRIORITY_LEVELS - 1
            );
        }
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub(crate) fn priority(&self) -> usize {
        self.priority.load(Ordering::Relaxed)
    }

    pub(crate) fn is_thread_bound(&self) -> bool {
        self.is_thread_bound
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state_running(&self) {
        self.state.store(TaskState::Running as u8, Ordering::Release);
    }

    pub(crate) fn set_state_waiting(&self) {
        self.state.store(TaskState::Waiting as u8, Ordering::Release);
    }

    pub(crate) fn set_state_finished(&self) {
        self.state.store(TaskState::Finished as u8, Ordering::Release);
    }

    pub(crate) fn context_ptr(&self) -> RawContext {
        self.context.load(Ordering::Acquire)
    }

    pub(crate) fn clear_context(&self) {
        self.context.store(core::ptr::null_mut(), Ordering::Release);
    }

    pub(crate) fn store_context(&self, ctx: RawContext) {
        self.context.store(ctx, Ordering::Release);
    }

    pub(crate) fn set_context_sentinel(&self) {
        self.context.store(running_sentinel(), Ordering::Release);
    }

    /// Wakes this task's owning OS thread, for thread-bound tasks only:
    /// mirrors `BoundTask::notify()`'s `m_task_runner->native_futex.notify()`.
    pub(crate) fn notify_thread_bound(&self) {
        self.wait_word.notify(1);
    }

    pub(crate) fn wait_word(&self) -> &WaitWord {
        &self.wait_word
    }

    /// Takes the boxed runnable out, leaving `None` behind. Only ever called
    /// once, by this task's own `run_wrapper` invocation on its own stack.
    fn take_runnable(&self) -> Option<Box<dyn FnOnce() + Send + 'static>> {
        // SAFETY: only this task's own entry invocation touches the cell,
        // and it does so exactly once before any other code can observe it.
        unsafe { (*self.runnable.get()).take() }
    }
}

#[cfg(feature = "testing")]
impl Task {
    /// Test-only accessor for this task's state, gated behind a
    /// [`crate::passkey::Passkey`] so only code that can mint one (test
    /// harnesses built with the `testing` feature) can observe it from
    /// outside the crate.
    pub fn state_for_testing(&self, _key: crate::passkey::Passkey<Task>) -> &'static str {
        match self.state() {
            TaskState::Running => "Running",
            TaskState::Waiting => "Waiting",
            TaskState::Finished => "Finished",
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // Release any waiters before tearing down: matches
        // `TaskBase::~TaskBase`'s implicit `Awaitable::~Awaitable` call
        // ordering (Task owns its Awaitable, so its drop glue runs this
        // release first by construction) plus the explicit `release()` both
        // `Task::~Task` and `BoundTask::~BoundTask` perform up front.
        self.awaitable.release();
        if self.is_thread_bound {
            self.set_state_finished();
            return;
        }
        // An unbound task's stack must not be freed while some thread is
        // still executing on it. `context == null` while a thread is
        // actively running the task (see the struct doc); once the task
        // reaches `Finished` *and* `context` is non-null again, it is safe.
        while self.state() != TaskState::Finished || self.context_ptr().is_null() {
            Task::yield_now();
            std::thread::yield_now();
        }
    }
}

/// Entry point for a freshly made context, invoked the first time an
/// unbound task's context is resumed. Never returns: the task's final act is
/// handing control to the scheduler's terminal switch, which itself never
/// switches back to a `Finished` task.
extern "C" fn run_wrapper(prev: RawContext, data: *mut u8) {
    scheduler::on_task_entry(Transfer {
        context: prev,
        data,
    });
    let current = scheduler::current_task();
    // SAFETY: `current` is this task, whose own stack is executing this
    // function; no other thread can be touching it concurrently.
    let runnable = unsafe { (*current).take_runnable() };
    if let Some(runnable) = runnable {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(runnable));
        if let Err(payload) = outcome {
            let message = panic_message(&payload);
            log::error!("task {current:p} panicked: {message}");
            // Unwinding further would cross a swapped stack and corrupt the
            // scheduler's invariants, so this is treated as fatal.
            std::process::abort();
        }
    }
    // SAFETY: `current` is still this task; nothing else has a live
    // reference to it. All stack-local objects above are dropped by the
    // time this call happens, since `schedule` never returns here.
    unsafe {
        (*current).awaitable.release();
        (*current).set_state_finished();
    }
    scheduler::schedule(current);
    unreachable!("a Finished task's context must never be resumed");
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequential_test::sequential;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[test]
    #[sequential]
    fn new_task_runs_to_completion_and_joins() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let task = Task::new(move || {
            counter_clone.fetch_add(1, AtomicOrdering::SeqCst);
        });
        task.join();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    #[sequential]
    fn yield_now_lets_another_task_make_progress() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let task = Task::new(move || {
            Task::yield_now();
            counter_clone.fetch_add(1, AtomicOrdering::SeqCst);
        });
        Task::yield_now();
        task.join();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    #[sequential]
    #[should_panic(expected = "set_priority")]
    fn set_priority_out_of_range_panics() {
        let task = Task::new(|| {});
        task.set_priority(PRIORITY_LEVELS);
    }

    #[test]
    #[sequential]
    fn set_priority_in_range_is_accepted() {
        let task = Task::new(|| {});
        task.set_priority(PRIORITY_LEVELS - 1);
        assert_eq!(task.priority(), PRIORITY_LEVELS - 1);
        task.join();
    }
}
