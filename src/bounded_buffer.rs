//! BoundedBuffer - fixed-capacity inline storage
//!
//! The backing store of [`StaticVector`](crate::StaticVector) and
//! [`StaticString`](crate::StaticString). Elements live inline next to the
//! length counter, so the whole buffer is one contiguous block without any
//! pointer: copying its bytes to another address yields the same buffer.
//!
//! # Layout
//! ```text
//! +-----------+----------------------------------+
//! | len usize | data [MaybeUninit<T>; N]         |
//! +-----------+----------------------------------+
//! ```
//! An all-zero bit pattern is a valid empty buffer, which is what a freshly
//! loaned shared memory slot contains.

use crate::error::ContainerError;
use std::mem::MaybeUninit;
use std::ptr;

/// Fixed-capacity storage with a logical length
#[repr(C)]
pub struct BoundedBuffer<T, const N: usize> {
    len: usize,
    data: [MaybeUninit<T>; N],
}

impl<T, const N: usize> BoundedBuffer<T, N> {
    /// Compile-time capacity
    pub const CAPACITY: usize = N;

    /// Create an empty buffer
    #[inline]
    pub fn new() -> Self {
        Self {
            len: 0,
            // SAFETY: an array of MaybeUninit needs no initialization
            data: unsafe { MaybeUninit::<[MaybeUninit<T>; N]>::uninit().assume_init() },
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        N
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Append an element at the end
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), ContainerError> {
        if self.len == N {
            return Err(ContainerError::CapacityExceeded {
                capacity: N,
                required: N + 1,
            });
        }
        self.data[self.len].write(value);
        self.len += 1;
        Ok(())
    }

    /// Remove the last element
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the slot at the old `len - 1` was live, the length no longer covers it
        Some(unsafe { self.data[self.len].assume_init_read() })
    }

    /// Bounds-checked shared access
    #[inline]
    pub fn get(&self, index: usize) -> Result<&T, ContainerError> {
        if index >= self.len {
            return Err(ContainerError::OutOfBounds {
                index,
                len: self.len,
            });
        }
        // SAFETY: index < len, slot is live
        Ok(unsafe { self.data[index].assume_init_ref() })
    }

    /// Bounds-checked exclusive access
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, ContainerError> {
        if index >= self.len {
            return Err(ContainerError::OutOfBounds {
                index,
                len: self.len,
            });
        }
        // SAFETY: index < len, slot is live
        Ok(unsafe { self.data[index].assume_init_mut() })
    }

    /// Insert at `index`, shifting later elements one slot to the right
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), ContainerError> {
        if index > self.len {
            return Err(ContainerError::OutOfBounds {
                index,
                len: self.len,
            });
        }
        if self.len == N {
            return Err(ContainerError::CapacityExceeded {
                capacity: N,
                required: N + 1,
            });
        }

        unsafe {
            let base = self.data.as_mut_ptr();
            ptr::copy(base.add(index), base.add(index + 1), self.len - index);
        }
        self.data[index].write(value);
        self.len += 1;
        Ok(())
    }

    /// Remove at `index`, shifting later elements one slot to the left
    pub fn remove(&mut self, index: usize) -> Result<T, ContainerError> {
        if index >= self.len {
            return Err(ContainerError::OutOfBounds {
                index,
                len: self.len,
            });
        }

        unsafe {
            let value = self.data[index].assume_init_read();
            let base = self.data.as_mut_ptr();
            ptr::copy(base.add(index + 1), base.add(index), self.len - index - 1);
            self.len -= 1;
            Ok(value)
        }
    }

    /// Drop every element past `new_len`
    pub fn truncate(&mut self, new_len: usize) {
        while self.len > new_len {
            self.len -= 1;
            unsafe {
                self.data[self.len].assume_init_drop();
            }
        }
    }

    /// Drop all elements
    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` slots are live and contiguous
        unsafe { std::slice::from_raw_parts(self.data.as_ptr().cast::<T>(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: the first `len` slots are live and contiguous
        unsafe { std::slice::from_raw_parts_mut(self.data.as_mut_ptr().cast::<T>(), self.len) }
    }

    /// Append a copy of `values`, all or nothing
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), ContainerError>
    where
        T: Clone,
    {
        let required = self.len + values.len();
        if required > N {
            return Err(ContainerError::CapacityExceeded { capacity: N, required });
        }
        for value in values {
            self.data[self.len].write(value.clone());
            self.len += 1;
        }
        Ok(())
    }
}

impl<T, const N: usize> Default for BoundedBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, const N: usize> Clone for BoundedBuffer<T, N> {
    fn clone(&self) -> Self {
        let mut copy = Self::new();
        for value in self.as_slice() {
            copy.data[copy.len].write(value.clone());
            copy.len += 1;
        }
        copy
    }
}

impl<T, const N: usize> Drop for BoundedBuffer<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: std::fmt::Debug, const N: usize> std::fmt::Debug for BoundedBuffer<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_push_pop_len() {
        let mut buf = BoundedBuffer::<u32, 3>::new();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 3);

        buf.push(1).unwrap();
        buf.push(2).unwrap();
        buf.push(3).unwrap();
        assert!(buf.is_full());
        assert_eq!(
            buf.push(4),
            Err(ContainerError::CapacityExceeded {
                capacity: 3,
                required: 4
            })
        );

        assert_eq!(buf.pop(), Some(3));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_indexed_access() {
        let mut buf = BoundedBuffer::<u8, 4>::new();
        buf.push(10).unwrap();
        buf.push(20).unwrap();

        assert_eq!(*buf.get(1).unwrap(), 20);
        *buf.get_mut(0).unwrap() = 11;
        assert_eq!(buf.as_slice(), &[11, 20]);

        // Capacity is 4 but only two elements are live
        assert_eq!(buf.get(2), Err(ContainerError::OutOfBounds { index: 2, len: 2 }));
    }

    #[test]
    fn test_insert_remove_shift() {
        let mut buf = BoundedBuffer::<char, 4>::new();
        buf.push('a').unwrap();
        buf.push('c').unwrap();
        buf.insert(1, 'b').unwrap();
        buf.insert(3, 'd').unwrap();
        assert_eq!(buf.as_slice(), &['a', 'b', 'c', 'd']);
        assert!(matches!(buf.insert(0, 'z'), Err(ContainerError::CapacityExceeded { .. })));

        assert_eq!(buf.remove(0), Ok('a'));
        assert_eq!(buf.as_slice(), &['b', 'c', 'd']);
        assert_eq!(buf.remove(5), Err(ContainerError::OutOfBounds { index: 5, len: 3 }));
        assert!(matches!(buf.insert(4, 'x'), Err(ContainerError::OutOfBounds { .. })));
    }

    #[test]
    fn test_extend_is_all_or_nothing() {
        let mut buf = BoundedBuffer::<u16, 4>::new();
        buf.extend_from_slice(&[1, 2, 3]).unwrap();
        assert!(buf.extend_from_slice(&[4, 5]).is_err());
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_drops_live_elements_only() {
        let marker = Rc::new(());
        {
            let mut buf = BoundedBuffer::<Rc<()>, 8>::new();
            buf.push(marker.clone()).unwrap();
            buf.push(marker.clone()).unwrap();
            assert_eq!(Rc::strong_count(&marker), 3);
            buf.truncate(1);
            assert_eq!(Rc::strong_count(&marker), 2);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn test_zeroed_bytes_are_empty_buffer() {
        let layout = std::alloc::Layout::new::<BoundedBuffer<u64, 16>>();
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) } as *mut BoundedBuffer<u64, 16>;

        let buf = unsafe { &mut *ptr };
        assert!(buf.is_empty());
        buf.push(7).unwrap();
        assert_eq!(buf.as_slice(), &[7]);

        unsafe {
            std::alloc::dealloc(ptr as *mut u8, layout);
        }
    }
}
