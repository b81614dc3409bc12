//! Guard-page stack allocator.
//!
//! Each unbound [`crate::task::Task`] owns one [`GuardedStack`]: a
//! contiguous `mmap`'d region with an unreadable, unwritable guard page at
//! the low end so a stack overflow faults instead of silently corrupting
//! whatever memory happens to sit below it.

use crate::error::SchedulerError;
use std::io;
use std::ptr::NonNull;

/// An owned, guarded stack region. Allocated in the constructor, unmapped in
/// `Drop`, exactly as `alterstack::Stack` does.
pub struct GuardedStack {
    base: NonNull<u8>,
    /// Total mapped size, including the guard page.
    mapped_size: usize,
    /// Usable stack size, excluding the guard page.
    usable_size: usize,
}

// The mapping is exclusively owned by one `GuardedStack` at a time and only
// ever handed to the task that owns it; the raw pointer itself carries no
// aliasing beyond that ownership.
unsafe impl Send for GuardedStack {}

const PAGE_SIZE: usize = 4096;

impl GuardedStack {
    /// Allocates a stack of at least `usable_size` bytes (rounded up to a
    /// page boundary) plus one leading guard page.
    pub fn new(usable_size: usize) -> Result<Self, SchedulerError> {
        let usable_size = round_up_to_page(usable_size.max(PAGE_SIZE));
        let mapped_size = usable_size + PAGE_SIZE;

        // SAFETY: requesting an anonymous, non-file-backed mapping with no
        // fixed address; all arguments are valid per the mmap(2) contract.
        let addr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                mapped_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(SchedulerError::StackReserve(io::Error::last_os_error()));
        }
        let base = addr as *mut u8;

        // Guard page sits at the low end: the stack grows downward on every
        // architecture this crate targets, so the first page touched on
        // overflow is the one we protect.
        // SAFETY: `base` was just mapped above with room for at least one
        // full page.
        let rc = unsafe { libc::mprotect(base as *mut libc::c_void, PAGE_SIZE, libc::PROT_NONE) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            // SAFETY: unmapping the region we just failed to fully set up.
            unsafe {
                libc::munmap(base as *mut libc::c_void, mapped_size);
            }
            return Err(SchedulerError::GuardPage(err));
        }

        Ok(GuardedStack {
            // SAFETY: mmap returned a non-null, non-MAP_FAILED pointer.
            base: unsafe { NonNull::new_unchecked(base) },
            mapped_size,
            usable_size,
        })
    }

    /// Returns the initial stack pointer value for a downward-growing
    /// stack: the highest address of the usable region.
    pub fn stack_top(&self) -> *mut u8 {
        // SAFETY: offset stays within the mapped region (usable_size bytes
        // past the guard page).
        unsafe { self.base.as_ptr().add(PAGE_SIZE).add(self.usable_size) }
    }

    /// Usable stack size in bytes, excluding the guard page.
    pub fn size(&self) -> usize {
        self.usable_size
    }
}

impl Drop for GuardedStack {
    fn drop(&mut self) {
        // SAFETY: `base`/`mapped_size` describe exactly the region this
        // `GuardedStack` mapped in `new`, and nothing else holds a
        // reference to it by the time `Drop` runs (the owning task has
        // already reached `Finished` with a non-null context; see
        // `Task::drop`).
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.mapped_size);
        }
    }
}

fn round_up_to_page(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_page_aligned_usable_region() {
        let stack = GuardedStack::new(crate::config::DEFAULT_STACK_SIZE).expect("stack alloc");
        assert_eq!(stack.size() % PAGE_SIZE, 0);
        assert!(stack.size() >= crate::config::DEFAULT_STACK_SIZE);
        assert!(!stack.stack_top().is_null());
    }

    #[test]
    fn rounds_small_sizes_up_to_one_page() {
        let stack = GuardedStack::new(1).expect("stack alloc");
        assert_eq!(stack.size(), PAGE_SIZE);
    }
}
