//! Linux futex backend for [`super::WaitWord`].

use core::sync::atomic::AtomicI32;

pub(super) fn wait(word: &AtomicI32, expected: i32) {
    // SAFETY: `word` is a valid, properly aligned i32 for the lifetime of
    // this call; a spurious return (EAGAIN/EINTR) is tolerated by the
    // caller, which re-checks its own condition in a loop.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicI32 as *mut i32,
            libc::FUTEX_WAIT,
            expected,
            core::ptr::null::<libc::timespec>(),
            core::ptr::null::<i32>(),
            0i32,
        );
    }
}

pub(super) fn wake(word: &AtomicI32, count: i32) {
    // SAFETY: see `wait`.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicI32 as *mut i32,
            libc::FUTEX_WAKE,
            count,
            core::ptr::null::<libc::timespec>(),
            core::ptr::null::<i32>(),
            0i32,
        );
    }
}
