//! Error taxonomy.
//!
//! The scheduler's public task API (`Task::yield_now`, `Task::join`, task
//! construction and destruction) never fails from the caller's point of
//! view, so it never returns a `Result`. The two remaining error classes are
//! treated as follows: allocation failure is fatal, and misuse of the
//! public API panics with a descriptive message following the
//! `"Error: <operation>: <condition>."` convention.

use core::fmt;

/// Errors that can occur while acquiring OS resources for a task's stack.
///
/// This is the one boundary where a syscall can fail for reasons that are
/// not themselves a programming error (e.g. the process is out of address
/// space). Callers are expected to treat it as fatal: a task cannot run
/// without its stack.
#[derive(Debug)]
pub enum SchedulerError {
    /// `mmap` failed to reserve the stack region.
    StackReserve(std::io::Error),
    /// `mprotect` failed to install the guard page.
    GuardPage(std::io::Error),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::StackReserve(e) => write!(f, "failed to reserve task stack: {e}"),
            SchedulerError::GuardPage(e) => write!(f, "failed to protect stack guard page: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Aborts the process after logging `err`, matching the "allocation failure
/// is fatal" rule. Stack allocation has no recovery path: a task cannot run
/// without its stack, and the caller has already committed to creating it.
pub fn abort_on_stack_failure(err: SchedulerError) -> ! {
    log::error!("fatal: {err}");
    std::process::abort();
}
