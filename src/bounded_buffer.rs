//! Bounded almost-FIFO buffer: the hot ingress/egress cache in front of a
//! [`crate::priority_queue::PriorityQueue`]'s priority stacks.
//!
//! Grounded on `alterstack/include/alterstack/bound_buffer.hpp` in full.
//! Seven cache-line-friendly slots hold intrusive `T` lists; `get_item`
//! returns a single `T` and redistributes whatever tail it uncovered back
//! across the slots, `put_items_list` drops a whole list into one slot
//! (splitting only happens on the `get` side, never on `put`).

use crate::config::BOUND_BUFFER_SLOTS;
use crate::list::{find_tail, IntrusiveLink};
use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

/// Cache-line-aligned bounded buffer of intrusive `T` lists.
#[repr(align(64))]
pub struct BoundBuffer<T: IntrusiveLink> {
    get_position: AtomicU32,
    put_position: AtomicU32,
    slots: [AtomicPtr<T>; BOUND_BUFFER_SLOTS],
}

// SAFETY: all access to `slots` goes through atomic operations; `T` values
// stored here are raw pointers the caller guarantees exclusive list
// ownership of.
unsafe impl<T: IntrusiveLink> Sync for BoundBuffer<T> {}
unsafe impl<T: IntrusiveLink> Send for BoundBuffer<T> {}

impl<T: IntrusiveLink> Default for BoundBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IntrusiveLink> BoundBuffer<T> {
    pub fn new() -> Self {
        BoundBuffer {
            get_position: AtomicU32::new(0),
            put_position: AtomicU32::new(0),
            slots: core::array::from_fn(|_| AtomicPtr::new(core::ptr::null_mut())),
        }
    }

    /// Returns a single `T` (with `next == null`) from the buffer, or
    /// `None` if it is empty. `have_more` is set to `true` if popping this
    /// slot uncovered a list whose tail had to be redistributed elsewhere
    /// (a false negative is possible; a false positive is not).
    pub fn get_item(&self, have_more: &mut bool) -> Option<*mut T> {
        let mut index = self.get_position.load(Ordering::Relaxed);
        let mut i = 0u32;
        loop {
            if i >= BOUND_BUFFER_SLOTS as u32 {
                return None;
            }
            let slot = &self.slots[(index.wrapping_add(i) as usize) % BOUND_BUFFER_SLOTS];
            let item = slot.swap(core::ptr::null_mut(), Ordering::Acquire);
            if !item.is_null() {
                self.get_position.fetch_add(i + 1, Ordering::Relaxed);
                // SAFETY: `item` was a valid list head stored by a prior
                // `put_items_list`/`store_tail` call.
                let next = unsafe { (*item).next() };
                if !next.is_null() {
                    self.store_tail(next);
                    // SAFETY: `item` is a valid, exclusively-owned node.
                    unsafe {
                        (*item).set_next(core::ptr::null_mut());
                    }
                    *have_more = true;
                }
                return Some(item);
            }
            let next_index = self.get_position.load(Ordering::Relaxed);
            if index != next_index {
                index = next_index;
                i = 0;
            } else {
                i += 1;
            }
        }
    }

    /// Stores `items_list` (a single item or an intrusive list) into one
    /// slot, preferring an empty slot and otherwise appending onto an
    /// occupied one.
    pub fn put_items_list(&self, items_list: *mut T) {
        debug_assert!(!items_list.is_null());
        if self.store_in_empty_slot(items_list) {
            return;
        }
        self.store_in_occupied_slot(items_list);
    }

    fn store_in_empty_slot(&self, item: *mut T) -> bool {
        let mut index = self.put_position.load(Ordering::Relaxed);
        let mut i = 0u32;
        while i < BOUND_BUFFER_SLOTS as u32 {
            let slot = &self.slots[(index.wrapping_add(i) as usize) % BOUND_BUFFER_SLOTS];
            if slot
                .compare_exchange(
                    core::ptr::null_mut(),
                    item,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.put_position.fetch_add(i + 1, Ordering::Relaxed);
                return true;
            }
            let next_index = self.put_position.load(Ordering::Relaxed);
            if index != next_index {
                index = next_index;
                i = 0;
            } else {
                i += 1;
            }
        }
        false
    }

    /// Distributes `items_list` across empty slots one item at a time;
    /// whatever remains once a slot is found occupied (or the list runs
    /// out) is appended in full onto one occupied slot.
    fn store_tail(&self, mut items_list: *mut T) {
        for _ in 0..(BOUND_BUFFER_SLOTS as u32 - 1) {
            if items_list.is_null() {
                return;
            }
            let item = items_list;
            // SAFETY: `item` is a valid list node owned by this call.
            items_list = unsafe { (*item).next() };
            unsafe {
                (*item).set_next(core::ptr::null_mut());
            }
            if !self.store_in_empty_slot(item) {
                unsafe {
                    (*item).set_next(items_list);
                }
                self.store_in_occupied_slot(item);
                return;
            }
        }
        if !items_list.is_null() {
            self.store_in_occupied_slot(items_list);
        }
    }

    fn store_in_occupied_slot(&self, mut items_list: *mut T) {
        let index = self.put_position.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[(index as usize) % BOUND_BUFFER_SLOTS];
        let old_list = slot.swap(items_list, Ordering::AcqRel);
        if old_list.is_null() {
            return;
        }
        // SAFETY: `old_list` is a valid list previously installed by a put
        // call; `find_tail` only follows `next` pointers.
        let tail = unsafe { find_tail(old_list) };
        unsafe {
            (*tail).set_next(items_list);
        }
        loop {
            match slot.compare_exchange_weak(items_list, old_list, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => {
                    items_list = actual;
                    unsafe {
                        (*tail).set_next(items_list);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

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

    fn leak_node(id: u32) -> *mut Node {
        Box::into_raw(Box::new(Node {
            id,
            next: Cell::new(core::ptr::null_mut()),
        }))
    }

    #[test]
    fn put_then_get_round_trips_single_item() {
        let buf: BoundBuffer<Node> = BoundBuffer::new();
        let n = leak_node(1);
        buf.put_items_list(n);
        let mut has_more = false;
        let got = buf.get_item(&mut has_more).expect("item present");
        assert_eq!(unsafe { (*got).id }, 1);
        assert!(unsafe { (*got).next() }.is_null());
        assert!(!has_more);
        unsafe {
            drop(Box::from_raw(got));
        }
    }

    #[test]
    fn empty_buffer_returns_none() {
        let buf: BoundBuffer<Node> = BoundBuffer::new();
        let mut has_more = false;
        assert!(buf.get_item(&mut has_more).is_none());
    }

    #[test]
    fn list_longer_than_one_slot_is_fully_drained() {
        let buf: BoundBuffer<Node> = BoundBuffer::new();
        // Build a 20-item intrusive list, well over BOUND_BUFFER_SLOTS.
        let nodes: Vec<*mut Node> = (0..20).map(leak_node).collect();
        for window in nodes.windows(2) {
            unsafe {
                (*window[0]).set_next(window[1]);
            }
        }
        buf.put_items_list(nodes[0]);

        let mut seen = HashSet::new();
        loop {
            let mut has_more = false;
            match buf.get_item(&mut has_more) {
                Some(item) => {
                    assert!(unsafe { (*item).next() }.is_null());
                    seen.insert(unsafe { (*item).id });
                }
                None => break,
            }
        }
        assert_eq!(seen.len(), 20);
        for n in nodes {
            unsafe {
                drop(Box::from_raw(n));
            }
        }
    }

    #[test]
    fn fills_all_slots_then_appends_to_occupied() {
        let buf: BoundBuffer<Node> = BoundBuffer::new();
        let nodes: Vec<*mut Node> = (0..BOUND_BUFFER_SLOTS as u32 + 3).map(leak_node).collect();
        for &n in &nodes {
            buf.put_items_list(n);
        }
        let mut seen = HashSet::new();
        loop {
            let mut has_more = false;
            match buf.get_item(&mut has_more) {
                Some(item) => {
                    seen.insert(unsafe { (*item).id });
                }
                None => break,
            }
        }
        assert_eq!(seen.len(), nodes.len());
        for n in nodes {
            unsafe {
                drop(Box::from_raw(n));
            }
        }
    }

    #[test]
    fn concurrent_put_get_loses_nothing() {
        let buf = Arc::new(BoundBuffer::<Node>::new());
        const N: u32 = 1000;
        for i in 0..N {
            buf.put_items_list(leak_node(i));
        }

        let mut handles = Vec::new();
        let seen: Arc<std::sync::Mutex<HashSet<u32>>> =
            Arc::new(std::sync::Mutex::new(HashSet::new()));
        for _ in 0..4 {
            let buf = Arc::clone(&buf);
            let seen = Arc::clone(&seen);
            handles.push(thread::spawn(move || loop {
                let mut has_more = false;
                match buf.get_item(&mut has_more) {
                    Some(item) => {
                        let id = unsafe { (*item).id };
                        seen.lock().unwrap().insert(id);
                        unsafe {
                            drop(Box::from_raw(item));
                        }
                    }
                    None => {
                        if seen.lock().unwrap().len() as u32 == N {
                            return;
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len() as u32, N);
    }
}
