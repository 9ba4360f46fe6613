//! Intrusive linked list implementation.

use core::{marker::PhantomData, ptr::NonNull};

/// Intrusive, singly linked list used for the free slots of a slab.
///
/// The first word of every item stores the address of the next item.
pub struct LinkedList {
    head: Option<NonNull<usize>>,
}

impl LinkedList {
    /// Create a new `LinkedList`.
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Returns whether this list is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Push the given item to the front of the list.
    ///
    /// Takes the pointer into your data structure, that contains the
    /// address for the next element.
    ///
    /// # Safety
    ///
    /// `item` must be valid for writes, aligned to `usize`, and must stay
    /// valid while it is part of this list.
    pub unsafe fn push(&mut self, item: NonNull<usize>) {
        *item.as_ptr() = self.head.map_or(0, |head| head.as_ptr() as usize);
        self.head = Some(item);
    }

    /// Removes the first item from this list.
    pub fn pop(&mut self) -> Option<NonNull<usize>> {
        let item = self.head?;
        // SAFETY
        // The caller of `push` guarantees that the item is still valid.
        self.head = NonNull::new(unsafe { *item.as_ptr() } as *mut usize);
        Some(item)
    }

    /// Check if `item` is part of this list.
    pub fn contains(&self, item: NonNull<usize>) -> bool {
        self.iter().any(|other| other == item)
    }

    /// Returns an immutable iterator over the elements of `self`.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            head: self.head,
            _lifetime: PhantomData,
        }
    }
}

impl Default for LinkedList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'list> {
    head: Option<NonNull<usize>>,
    _lifetime: PhantomData<&'list LinkedList>,
}

impl Iterator for Iter<'_> {
    type Item = NonNull<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.head?;
        // SAFETY
        // Safety arguments must be provided by the caller of `push`.
        self.head = NonNull::new(unsafe { *item.as_ptr() } as *mut usize);
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut slots = [0usize; 3];
        let base = slots.as_mut_ptr();
        let mut list = LinkedList::new();

        unsafe {
            for idx in 0..3 {
                list.push(NonNull::new(base.add(idx)).unwrap());
            }
        }

        assert!(list.contains(NonNull::new(base).unwrap()));
        assert_eq!(list.iter().count(), 3);
        assert_eq!(list.pop(), NonNull::new(unsafe { base.add(2) }));
        assert_eq!(list.pop(), NonNull::new(unsafe { base.add(1) }));
        assert_eq!(list.pop(), NonNull::new(base));
        assert!(list.pop().is_none());
        assert!(list.is_empty());
    }
}
