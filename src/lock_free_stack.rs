//! Treiber lock-free LIFO stack, used as one priority lane inside
//! [`crate::priority_queue::PriorityQueue`].
//!
//! Grounded on `alterstack/include/alterstack/lock_free_stack.hpp`.

use crate::list::IntrusiveLink;
use core::sync::atomic::{AtomicPtr, Ordering};

pub struct LockFreeStack<T: IntrusiveLink> {
    head: AtomicPtr<T>,
}

// SAFETY: mutation of the list happens exclusively through atomic CAS/
// exchange on `head`; stored nodes are caller-owned intrusive lists.
unsafe impl<T: IntrusiveLink> Sync for LockFreeStack<T> {}
unsafe impl<T: IntrusiveLink> Send for LockFreeStack<T> {}

impl<T: IntrusiveLink> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IntrusiveLink> LockFreeStack<T> {
    pub const fn new() -> Self {
        LockFreeStack {
            head: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Pushes a single item onto the stack. Returns `true` if the stack was
    /// empty before this push, which callers use to decide whether a
    /// sleeping consumer needs waking.
    pub fn push(&self, item: *mut T) -> bool {
        debug_assert!(!item.is_null());
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `item` is exclusively owned by this call; no other
            // thread observes it until the CAS below publishes it.
            unsafe {
                (*item).set_next(head);
            }
            match self
                .head
                .compare_exchange_weak(head, item, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return head.is_null(),
                Err(actual) => head = actual,
            }
        }
    }

    /// Atomically takes the entire stack, leaving it empty, and returns the
    /// list head (or null if the stack was empty).
    pub fn pop_all(&self) -> *mut T {
        self.head.swap(core::ptr::null_mut(), Ordering::Acquire)
    }

    /// Advisory emptiness check used to skip the atomic swap in `pop_all`
    /// when scanning lanes that are probably empty; a racing push can make
    /// this stale, so callers must not rely on it for correctness.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Node {
        id: u32,
        next: Cell<*mut Node>,
    }
    impl IntrusiveLink for Node {
        fn next(&self) -> *mut Node {
            self.next.get()
        }
        fn set_next(&self, next: *mut Node) {
            self.next.set(next);
        }
    }
    unsafe impl Sync for Node {}

    fn leak(id: u32) -> *mut Node {
        Box::into_raw(Box::new(Node {
            id,
            next: Cell::new(core::ptr::null_mut()),
        }))
    }

    #[test]
    fn push_reports_was_empty() {
        let stack: LockFreeStack<Node> = LockFreeStack::new();
        assert!(stack.push(leak(1)));
        assert!(!stack.push(leak(2)));
    }

    #[test]
    fn pop_all_returns_lifo_order_and_empties() {
        let stack: LockFreeStack<Node> = LockFreeStack::new();
        stack.push(leak(1));
        stack.push(leak(2));
        stack.push(leak(3));
        let head = stack.pop_all();
        assert!(stack.is_empty());
        let mut ids = Vec::new();
        let mut node = head;
        while !node.is_null() {
            ids.push(unsafe { (*node).id });
            node = unsafe { (*node).next() };
        }
        assert_eq!(ids, vec![3, 2, 1]);
        let mut node = head;
        while !node.is_null() {
            let next = unsafe { (*node).next() };
            unsafe {
                drop(Box::from_raw(node));
            }
            node = next;
        }
    }

    #[test]
    fn pop_all_on_empty_stack_returns_null() {
        let stack: LockFreeStack<Node> = LockFreeStack::new();
        assert!(stack.pop_all().is_null());
    }
}
