//! Lock-free priority queue: a [`BoundBuffer`] hot cache in front of
//! [`crate::config::PRIORITY_LEVELS`] [`LockFreeStack`] priority lanes.
//!
//! Grounded on `alterstack/include/alterstack/lock_free_queue.hpp`.

use crate::bounded_buffer::BoundBuffer;
use crate::config::PRIORITY_LEVELS;
use crate::list::IntrusiveLink;
use crate::lock_free_stack::LockFreeStack;

#[repr(align(64))]
pub struct PriorityQueue<T: IntrusiveLink> {
    item_buffer: BoundBuffer<T>,
    priority_lanes: [LockFreeStack<T>; PRIORITY_LEVELS],
}

impl<T: IntrusiveLink> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IntrusiveLink> PriorityQueue<T> {
    pub fn new() -> Self {
        PriorityQueue {
            item_buffer: BoundBuffer::new(),
            priority_lanes: core::array::from_fn(|_| LockFreeStack::new()),
        }
    }

    /// Dequeues a single item, or `None` if the queue is empty.
    /// `have_more_items` is set if more items remain reachable right now (a
    /// false negative is possible, a false positive is not).
    pub fn get_item(&self, have_more_items: &mut bool) -> Option<*mut T> {
        if let Some(item) = self.item_buffer.get_item(have_more_items) {
            return Some(item);
        }
        let mut items_list = core::ptr::null_mut();
        for lane in &self.priority_lanes {
            // Skip the atomic swap for a lane that is observably empty;
            // `pop_all` still runs on the first lane that might not be, so a
            // stale "empty" read here only costs an extra iteration, never a
            // lost item.
            if lane.is_empty() {
                continue;
            }
            items_list = lane.pop_all();
            if !items_list.is_null() {
                break;
            }
        }
        if items_list.is_null() {
            return None;
        }
        let item = items_list;
        // SAFETY: `item` is a valid list head just drained from a lane this
        // call exclusively owns.
        let rest = unsafe { (*item).next() };
        unsafe {
            (*item).set_next(core::ptr::null_mut());
        }
        if !rest.is_null() {
            self.item_buffer.put_items_list(rest);
            *have_more_items = true;
        }
        Some(item)
    }

    /// Enqueues a single item at `priority`, clamping out-of-range
    /// priorities to the lowest (last) lane rather than rejecting them.
    pub fn put_item(&self, item: *mut T, priority: usize) {
        let priority = priority.min(PRIORITY_LEVELS - 1);
        self.priority_lanes[priority].push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::collections::HashSet;

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
    fn empty_queue_returns_none() {
        let q: PriorityQueue<Node> = PriorityQueue::new();
        let mut more = false;
        assert!(q.get_item(&mut more).is_none());
    }

    #[test]
    fn out_of_range_priority_is_clamped() {
        let q: PriorityQueue<Node> = PriorityQueue::new();
        q.put_item(leak(1), 999);
        let mut more = false;
        let item = q.get_item(&mut more).expect("item present");
        assert_eq!(unsafe { (*item).id }, 1);
        unsafe {
            drop(Box::from_raw(item));
        }
    }

    #[test]
    fn high_priority_lane_served_before_low() {
        let q: PriorityQueue<Node> = PriorityQueue::new();
        for i in 0..5 {
            q.put_item(leak(100 + i), 2);
        }
        q.put_item(leak(1), 0);

        let mut more = false;
        let item = q.get_item(&mut more).expect("item present");
        assert_eq!(unsafe { (*item).id }, 1);
        unsafe {
            drop(Box::from_raw(item));
        }
    }

    #[test]
    fn drains_every_item_exactly_once() {
        let q: PriorityQueue<Node> = PriorityQueue::new();
        let mut ids = HashSet::new();
        for i in 0..50u32 {
            q.put_item(leak(i), (i % 3) as usize);
            ids.insert(i);
        }
        let mut seen = HashSet::new();
        loop {
            let mut more = false;
            match q.get_item(&mut more) {
                Some(item) => {
                    seen.insert(unsafe { (*item).id });
                    unsafe {
                        drop(Box::from_raw(item));
                    }
                }
                None => break,
            }
        }
        assert_eq!(seen, ids);
    }
}
