//! Intrusive singly-linked list support.
//!
//! Every lock-free structure in this crate (the bounded buffer, the
//! lock-free stack, an Awaitable's wait list) threads its items through a
//! single `next` pointer embedded in the item itself, rather than
//! allocating separate list nodes. A type opts in by implementing
//! [`IntrusiveLink`].

/// A type that can be linked into an intrusive singly-linked list.
///
/// Implementors own exactly one `next` slot; a given instance can only be a
/// member of one list at a time (enforced by the caller, not by this trait).
pub trait IntrusiveLink {
    /// Returns the next item in the list, or a null-equivalent if this is
    /// the tail.
    fn next(&self) -> *mut Self;

    /// Sets the next item in the list.
    fn set_next(&self, next: *mut Self);
}

/// Walks from `head` to the last node of the list and returns it.
///
/// # Safety
///
/// `head` must be a valid, non-null pointer to a well-formed list (every
/// `next` pointer in the chain is either null or a valid pointer of the
/// same provenance).
pub unsafe fn find_tail<T: IntrusiveLink>(head: *mut T) -> *mut T {
    debug_assert!(!head.is_null());
    let mut node = head;
    loop {
        let next = (*node).next();
        if next.is_null() {
            return node;
        }
        node = next;
    }
}
