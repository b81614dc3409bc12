//! Context switch primitive.
//!
//! `jump_context` saves the caller's callee-saved registers onto its own
//! stack, switches to the target context, and resumes whatever was
//! suspended there. The first time a context built by `make_context` is
//! resumed, control lands in a small trampoline that calls the context's
//! entry function with `(prev_context, data)`, the same
//! `{old_context_ptr, data}` pair `alterstack`'s `jump_fcontext` hands its
//! callers.
//!
//! Grounded on `alterstack/include/alterstack/scheduler.hpp`'s
//! `scontext::make_fcontext`/`jump_fcontext` contract, with the actual
//! register-save assembly shaped after
//! `numpy1314-oscamp-base-experiment/exercises/04_context_switch/02_green_threads/src/lib.rs`'s
//! `TaskContext`/`switch_context`.

use core::fmt;

/// Opaque pointer to a suspended context's saved registers, living on that
/// context's own stack. Valid until exactly one thread resumes it.
pub type RawContext = *mut u8;

/// Entry point invoked the first time a context created by `make_context`
/// is resumed. Never returns in practice: the task body ends by handing
/// control to the scheduler's terminal switch, which never switches back.
pub type EntryFn = extern "C" fn(prev: RawContext, data: *mut u8);

/// Result of a context switch: the context that switched into us, and the
/// data it passed.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Transfer {
    pub context: RawContext,
    pub data: *mut u8,
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("context", &self.context)
            .field("data", &self.data)
            .finish()
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        use self::x86_64 as backend;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        use self::aarch64 as backend;
    } else {
        compile_error!(
            "mntask has no context-switch backend for this architecture; \
             add one under src/context/ rather than silently no-op'ing."
        );
    }
}

/// Builds a fresh context ready to run `entry` the first time it is jumped
/// to, using `[stack_top - size, stack_top)` as its stack (stack grows
/// down from `stack_top`).
///
/// # Safety
///
/// `stack_top` must be the high end of a region of at least `size` writable
/// bytes that outlives the returned context, and that nothing else is
/// using.
pub unsafe fn make_context(stack_top: *mut u8, size: usize, entry: EntryFn) -> RawContext {
    backend::make_context(stack_top, size, entry)
}

/// Switches to `target`, passing `data`. Returns once some other context
/// jumps back to the context that called this function.
///
/// # Safety
///
/// `target` must be a context previously returned by `make_context` that
/// has not already been resumed by another thread, or a context pointer
/// obtained from a `Transfer` returned by an earlier `jump_context` call on
/// this same logical chain.
pub unsafe fn jump_context(target: RawContext, data: *mut u8) -> Transfer {
    backend::jump_context(target, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ENTERED: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn record_entry(prev: RawContext, data: *mut u8) {
        ENTERED.fetch_add(1, Ordering::SeqCst);
        // `prev` is the context the caller captured when it jumped here;
        // jumping back into it resumes the test right after its own
        // `jump_context` call.
        // SAFETY: `prev` was just captured by the live call below and is
        // still on the call stack waiting to be resumed.
        unsafe {
            jump_context(prev, data);
        }
        unreachable!("test context must not be resumed twice");
    }

    #[test]
    fn switches_into_fresh_context_and_back() {
        ENTERED.store(0, Ordering::SeqCst);
        let stack = crate::stack::GuardedStack::new(crate::config::DEFAULT_STACK_SIZE)
            .expect("stack alloc");
        // SAFETY: `stack` outlives the jump below and nothing else uses it.
        let ctx = unsafe { make_context(stack.stack_top(), stack.size(), record_entry) };

        // SAFETY: `ctx` was just created and not yet resumed.
        let transfer = unsafe { jump_context(ctx, core::ptr::null_mut()) };
        assert_eq!(ENTERED.load(Ordering::SeqCst), 1);
        assert!(!transfer.context.is_null());
    }
}
