//! Compile-time tunables.
//!
//! These mirror constants `alterstack` hardcodes as macros or magic numbers;
//! they are not meant to be runtime-configurable, since `alterstack` itself
//! does not make them so either.

/// Number of priority lanes in the lock-free priority queue. The original
/// source hardcodes `QUEUE_COUNT = 3`; see `DESIGN.md` for the open-question
/// resolution.
pub const PRIORITY_LEVELS: usize = 3;

/// Slot count of the bounded almost-FIFO buffer, chosen to fit two atomic
/// counters and the slot array in a single 64-byte cache line.
pub const BOUND_BUFFER_SLOTS: usize = 7;

/// Default stack size allocated for an unbound task, excluding the guard
/// page. Platform-conventional "few hundred KiB" default.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Default number of background worker threads started by the scheduler's
/// thread pool.
pub const DEFAULT_MIN_SPARE_WORKERS: u32 = 1;

/// Backoff used by [`crate::scheduler::wait_while_context_is_null`] between
/// rechecks of a task's `context` field while it transitions from `Waiting`
/// to parked.
pub const CONTEXT_NULL_RETRY_BACKOFF: core::time::Duration = core::time::Duration::from_micros(10);

/// Initial backoff before the first recheck, shorter than the steady-state
/// backoff since the window is usually extremely brief.
pub const CONTEXT_NULL_FIRST_BACKOFF: core::time::Duration = core::time::Duration::from_micros(2);
