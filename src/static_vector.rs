//! StaticVector - relocatable fixed-capacity vector
//!
//! Behaves like a `Vec<T>` whose capacity is the const parameter `N`. It never
//! allocates and never reallocates; every operation that would grow it past
//! `N` returns [`ContainerError::CapacityExceeded`] and leaves the contents
//! untouched.

use crate::bounded_buffer::BoundedBuffer;
use crate::error::ContainerError;
use crate::relocatable::Relocatable;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};

/// Fixed-capacity, insertion-ordered sequence
///
/// ```
/// use venom_pubsub::StaticVector;
///
/// let mut v = StaticVector::<u64, 2>::new();
/// v.try_push_back(1).unwrap();
/// v.try_push_back(2).unwrap();
/// assert!(v.try_push_back(3).is_err());
/// assert_eq!(v.iter().sum::<u64>(), 3);
/// ```
#[repr(C)]
pub struct StaticVector<T, const N: usize> {
    buffer: BoundedBuffer<T, N>,
}

// SAFETY: elements are stored inline and are themselves relocatable
unsafe impl<T: Relocatable, const N: usize> Relocatable for StaticVector<T, N> {}

impl<T, const N: usize> StaticVector<T, N> {
    pub const CAPACITY: usize = N;

    #[inline]
    pub fn new() -> Self {
        Self {
            buffer: BoundedBuffer::new(),
        }
    }

    /// `count` clones of `value`
    pub fn try_from_value(count: usize, value: T) -> Result<Self, ContainerError>
    where
        T: Clone,
    {
        if count > N {
            return Err(ContainerError::CapacityExceeded {
                capacity: N,
                required: count,
            });
        }
        let mut v = Self::new();
        for _ in 0..count {
            v.buffer.push(value.clone())?;
        }
        Ok(v)
    }

    /// Clone of every element of `values`
    pub fn try_from_slice(values: &[T]) -> Result<Self, ContainerError>
    where
        T: Clone,
    {
        let mut v = Self::new();
        v.buffer.extend_from_slice(values)?;
        Ok(v)
    }

    #[inline]
    pub fn try_push_back(&mut self, value: T) -> Result<(), ContainerError> {
        self.buffer.push(value)
    }

    #[inline]
    pub fn pop_back(&mut self) -> Option<T> {
        self.buffer.pop()
    }

    #[inline]
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), ContainerError> {
        self.buffer.insert(index, value)
    }

    #[inline]
    pub fn remove(&mut self, index: usize) -> Result<T, ContainerError> {
        self.buffer.remove(index)
    }

    #[inline]
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), ContainerError>
    where
        T: Clone,
    {
        self.buffer.extend_from_slice(values)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Result<&T, ContainerError> {
        self.buffer.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, ContainerError> {
        self.buffer.get_mut(index)
    }

    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.buffer.truncate(len)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        N
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.buffer.as_slice()
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.buffer.as_mut_slice()
    }
}

impl<T, const N: usize> Default for StaticVector<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, const N: usize> Clone for StaticVector<T, N> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
        }
    }
}

impl<T, const N: usize> Deref for StaticVector<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const N: usize> DerefMut for StaticVector<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a StaticVector<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<T: PartialEq, const N: usize> PartialEq for StaticVector<T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, const N: usize> Eq for StaticVector<T, N> {}

impl<T: PartialEq, const N: usize> PartialEq<[T]> for StaticVector<T, N> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Hash, const N: usize> Hash for StaticVector<T, N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}

impl<T: std::fmt::Debug, const N: usize> std::fmt::Debug for StaticVector<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T: Clone, const N: usize> TryFrom<&[T]> for StaticVector<T, N> {
    type Error = ContainerError;

    fn try_from(values: &[T]) -> Result<Self, Self::Error> {
        Self::try_from_slice(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_string::StaticString;
    use std::mem::{size_of, MaybeUninit};

    fn fill_and_check<const N: usize>() {
        let mut v = StaticVector::<u32, N>::new();
        for i in 0..N {
            v.try_push_back(i as u32).unwrap();
            assert_eq!(v.len(), i + 1);
        }

        let before: Vec<u32> = v.iter().copied().collect();
        assert_eq!(
            v.try_push_back(99),
            Err(ContainerError::CapacityExceeded {
                capacity: N,
                required: N + 1
            })
        );
        assert_eq!(v.iter().copied().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_push_up_to_capacity() {
        fill_and_check::<0>();
        fill_and_check::<1>();
        fill_and_check::<7>();
        fill_and_check::<64>();
    }

    #[test]
    fn test_try_from_value() {
        let v = StaticVector::<u64, 4>::try_from_value(2, 9).unwrap();
        assert_eq!(v.as_slice(), &[9, 9]);

        assert_eq!(
            StaticVector::<u64, 4>::try_from_value(5, 9).unwrap_err(),
            ContainerError::CapacityExceeded {
                capacity: 4,
                required: 5
            }
        );
        assert!(StaticVector::<u64, 4>::try_from_value(4, 1).unwrap().is_full());
    }

    #[test]
    fn test_iteration_is_ordered_and_restartable() {
        let v = StaticVector::<&str, 4>::try_from_slice(&["a", "b", "c"]).unwrap();

        let first: Vec<_> = v.iter().collect();
        let second: Vec<_> = (&v).into_iter().collect();
        assert_eq!(first, vec![&"a", &"b", &"c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_pop_clear_and_index() {
        let mut v = StaticVector::<i16, 3>::try_from_slice(&[1, -2, 3]).unwrap();
        assert_eq!(v[1], -2);
        v[1] = 2;
        assert_eq!(v.pop_back(), Some(3));
        assert_eq!(v, StaticVector::<i16, 3>::try_from_slice(&[1, 2]).unwrap());
        v.clear();
        assert!(v.is_empty());
        assert_eq!(v.pop_back(), None);
        assert_eq!(v.get(0), Err(ContainerError::OutOfBounds { index: 0, len: 0 }));
    }

    #[test]
    #[should_panic]
    fn test_index_out_of_bounds_panics() {
        let v = StaticVector::<u8, 8>::try_from_value(2, 0).unwrap();
        let _ = v[2];
    }

    #[test]
    fn test_nested_containers() {
        let mut v = StaticVector::<StaticString<8>, 2>::new();
        v.try_push_back(StaticString::from_utf8(b"bla").unwrap()).unwrap();
        v.try_push_back(StaticString::from_utf8(b"blub").unwrap()).unwrap();
        assert_eq!(v[0].as_str(), "bla");
        assert_eq!(v[1].as_str(), "blub");
    }

    #[test]
    fn test_relocation_by_byte_copy() {
        let original = StaticVector::<u64, 8>::try_from_slice(&[3, 1, 4, 1, 5]).unwrap();

        let mut moved = MaybeUninit::<StaticVector<u64, 8>>::uninit();
        unsafe {
            std::ptr::copy_nonoverlapping(
                &original as *const _ as *const u8,
                moved.as_mut_ptr() as *mut u8,
                size_of::<StaticVector<u64, 8>>(),
            );
        }
        let moved = unsafe { moved.assume_init() };

        assert_eq!(moved, original);
        assert_eq!(moved.len(), 5);
        assert_eq!(moved.get(4), Ok(&5));
        assert_eq!(moved.iter().sum::<u64>(), 14);
    }
}
