//! Per-OS-thread scheduler state.
//!
//! Grounded on `alterstack/include/alterstack/task_runner.hpp`: each thread
//! lazily builds one `TaskRunner` the first time it touches the scheduler,
//! holding its current task, its thread-bound "native" task (the identity
//! of whatever the OS thread was doing before it entered the scheduler),
//! a wait word for parking when idle, and which kind of runner it is.

use crate::task::Task;
use crate::wait_word::WaitWord;
use core::cell::Cell;
use std::ptr::NonNull;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunnerKind {
    /// The main thread, or any application thread that calls into the
    /// scheduler (e.g. by constructing or joining a task).
    Common,
    /// A background worker thread spawned by the thread pool.
    Background,
}

pub struct TaskRunner {
    /// Stable heap address for the thread-bound task identity; kept alive
    /// for the whole life of the thread. Its embedded wait word doubles as
    /// this thread's park/wake slot (`BoundTask::notify()`'s target).
    native_task: Box<Task>,
    current_task: Cell<*mut Task>,
    kind: Cell<RunnerKind>,
}

thread_local! {
    static RUNNER: TaskRunner = TaskRunner::new();
}

impl TaskRunner {
    fn new() -> Self {
        TaskRunner {
            native_task: Task::new_thread_bound(),
            current_task: Cell::new(core::ptr::null_mut()),
            kind: Cell::new(RunnerKind::Common),
        }
    }

    /// Runs `f` with access to this thread's runner, lazily constructing it
    /// on first use.
    pub fn with_current<R>(f: impl FnOnce(&TaskRunner) -> R) -> R {
        RUNNER.with(f)
    }

    pub fn current_task(&self) -> *mut Task {
        self.current_task.get()
    }

    pub fn set_current_task(&self, task: *mut Task) {
        self.current_task.set(task);
    }

    pub fn native_task(&self) -> *mut Task {
        self.native_task.as_ref() as *const Task as *mut Task
    }

    pub fn wait_word(&self) -> &WaitWord {
        self.native_task.wait_word()
    }

    pub fn kind(&self) -> RunnerKind {
        self.kind.get()
    }

    /// Flips this runner into `Background` mode; called once by a
    /// background worker right after its thread starts.
    pub fn make_background_runner(&self) {
        self.kind.set(RunnerKind::Background);
    }
}

/// Returns the address of this thread's native (thread-bound) task,
/// creating the runner if this is the first call on this thread.
pub fn native_task() -> *mut Task {
    TaskRunner::with_current(|r| r.native_task())
}

/// Returns this thread's current task pointer as tracked by its runner, or
/// null if it has never been set (e.g. a freshly created runner before its
/// first schedule call).
pub fn current_task_raw() -> *mut Task {
    TaskRunner::with_current(|r| r.current_task())
}

pub fn set_current_task(task: *mut Task) {
    TaskRunner::with_current(|r| r.set_current_task(task));
}

pub fn kind() -> RunnerKind {
    TaskRunner::with_current(|r| r.kind())
}

pub fn make_background_runner() {
    TaskRunner::with_current(|r| r.make_background_runner());
}

pub fn wait_on_native_wait_word() {
    TaskRunner::with_current(|r| r.wait_word().wait());
}

/// # Safety
/// The returned pointer is only valid to dereference for the lifetime of the
/// owning thread (it addresses that thread's own native task); callers must
/// not retain it past that.
pub unsafe fn wait_word_ptr() -> NonNull<WaitWord> {
    TaskRunner::with_current(|r| NonNull::from(r.wait_word()))
}

/// A handle to one thread's wait word, safe to send to and call from other
/// threads. Used by [`crate::background::BgRunner`] to wake a specific idle
/// worker from outside its own thread.
///
/// # Safety
/// Valid to dereference only while the owning OS thread is still alive (it
/// addresses that thread's thread-local native task). `BgRunner` upholds
/// this by joining every worker thread before dropping its handles.
pub struct WaitWordHandle(NonNull<WaitWord>);

// SAFETY: the pointee is only ever mutated through its own atomics;
// `WaitWord::notify`/`notify_all` take `&self` and are safe to call
// concurrently from any thread for as long as the owning thread is alive.
unsafe impl Send for WaitWordHandle {}
unsafe impl Sync for WaitWordHandle {}

impl WaitWordHandle {
    pub(crate) fn notify(&self, count: i32) {
        // SAFETY: see the struct's safety section.
        unsafe {
            self.0.as_ref().notify(count);
        }
    }

    pub(crate) fn notify_all(&self) {
        // SAFETY: see the struct's safety section.
        unsafe {
            self.0.as_ref().notify_all();
        }
    }
}

/// Captures the calling thread's wait word as a handle other threads can
/// notify. Intended to be called once, by a background worker right after
/// it starts, and handed back to whoever is constructing the pool.
///
/// # Safety
/// Must only be called from a thread that will stay alive for as long as
/// the returned handle is used.
pub unsafe fn wait_word_handle() -> WaitWordHandle {
    WaitWordHandle(wait_word_ptr())
}
