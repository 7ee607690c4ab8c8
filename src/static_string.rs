//! StaticString - relocatable fixed-capacity UTF-8 string
//!
//! Up to `N` bytes of UTF-8 stored inline. The byte length is the only length;
//! there is no separate character count and no terminator. Input is validated
//! on every mutation and rejected as a whole: a string is never truncated or
//! repaired to make it fit.

use crate::bounded_buffer::BoundedBuffer;
use crate::error::ContainerError;
use crate::relocatable::Relocatable;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::str::FromStr;

/// Fixed-capacity UTF-8 text
///
/// ```
/// use venom_pubsub::StaticString;
///
/// let mut s = StaticString::<8>::from_utf8(b"hello").unwrap();
/// assert!(s.push_str(" world").is_err());
/// s.push_str("!").unwrap();
/// assert_eq!(s, "hello!");
/// ```
#[repr(C)]
pub struct StaticString<const N: usize> {
    bytes: BoundedBuffer<u8, N>,
}

// SAFETY: plain bytes stored inline
unsafe impl<const N: usize> Relocatable for StaticString<N> {}

fn validate(bytes: &[u8]) -> Result<&str, ContainerError> {
    std::str::from_utf8(bytes).map_err(|e| ContainerError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })
}

impl<const N: usize> StaticString<N> {
    pub const CAPACITY: usize = N;

    #[inline]
    pub fn new() -> Self {
        Self {
            bytes: BoundedBuffer::new(),
        }
    }

    /// Copy `bytes` after validating UTF-8 and capacity
    pub fn from_utf8(bytes: &[u8]) -> Result<Self, ContainerError> {
        validate(bytes)?;
        let mut s = Self::new();
        s.bytes.extend_from_slice(bytes)?;
        Ok(s)
    }

    /// Replace the whole content
    pub fn assign(&mut self, value: &str) -> Result<(), ContainerError> {
        if value.len() > N {
            return Err(ContainerError::CapacityExceeded {
                capacity: N,
                required: value.len(),
            });
        }
        self.bytes.clear();
        self.bytes.extend_from_slice(value.as_bytes())
    }

    /// Append a string slice
    pub fn push_str(&mut self, value: &str) -> Result<(), ContainerError> {
        self.bytes.extend_from_slice(value.as_bytes())
    }

    /// Append raw bytes that must form valid UTF-8 on their own
    pub fn try_append(&mut self, bytes: &[u8]) -> Result<(), ContainerError> {
        let valid = validate(bytes)?;
        self.push_str(valid)
    }

    /// Append a single character
    pub fn try_push(&mut self, c: char) -> Result<(), ContainerError> {
        let mut encoded = [0u8; 4];
        self.push_str(c.encode_utf8(&mut encoded))
    }

    /// Remove and return the last character
    pub fn pop(&mut self) -> Option<char> {
        let c = self.as_str().chars().next_back()?;
        self.bytes.truncate(self.len() - c.len_utf8());
        Some(c)
    }

    /// Shorten to `new_len` bytes; must land on a character boundary
    pub fn truncate(&mut self, new_len: usize) -> Result<(), ContainerError> {
        if new_len >= self.len() {
            return Ok(());
        }
        if !self.as_str().is_char_boundary(new_len) {
            return Err(ContainerError::NotCharBoundary { index: new_len });
        }
        self.bytes.truncate(new_len);
        Ok(())
    }

    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: every mutation validates UTF-8 before storing
        unsafe { std::str::from_utf8_unchecked(self.bytes.as_slice()) }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Length in bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        N
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.bytes.is_full()
    }
}

impl<const N: usize> Default for StaticString<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Clone for StaticString<N> {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }
}

impl<const N: usize> Deref for StaticString<N> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> PartialEq for StaticString<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Eq for StaticString<N> {}

impl<const N: usize> PartialEq<str> for StaticString<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> PartialEq<&str> for StaticString<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> PartialOrd for StaticString<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> Ord for StaticString<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl<const N: usize> Hash for StaticString<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl<const N: usize> fmt::Debug for StaticString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for StaticString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> FromStr for StaticString<N> {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_utf8(s.as_bytes())
    }
}

impl<const N: usize> TryFrom<&str> for StaticString<N> {
    type Error = ContainerError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_utf8(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{size_of, MaybeUninit};

    #[test]
    fn test_from_utf8_round_trip() {
        let inputs: [&[u8]; 5] = [b"", b"a", b"hello", "\u{00e9}t\u{00e9}".as_bytes(), "\u{1f980}".as_bytes()];
        for input in inputs {
            let s = StaticString::<8>::from_utf8(input).unwrap();
            assert_eq!(s.as_bytes(), input);
            assert_eq!(s.len(), input.len());
        }
    }

    #[test]
    fn test_from_utf8_rejects_without_partial_result() {
        assert_eq!(
            StaticString::<8>::from_utf8(b"abc\xff").unwrap_err(),
            ContainerError::InvalidUtf8 { valid_up_to: 3 }
        );
        assert_eq!(
            StaticString::<4>::from_utf8(b"hello").unwrap_err(),
            ContainerError::CapacityExceeded {
                capacity: 4,
                required: 5
            }
        );
        // Truncated multi-byte sequence
        assert!(StaticString::<8>::from_utf8(&[0xe2, 0x82]).is_err());
    }

    #[test]
    fn test_append_fail_fast() {
        let mut s = StaticString::<6>::from_utf8(b"abc").unwrap();
        assert!(s.push_str("defg").is_err());
        assert_eq!(s, "abc");

        assert_eq!(
            s.try_append(b"d\xc3"),
            Err(ContainerError::InvalidUtf8 { valid_up_to: 1 })
        );
        assert_eq!(s, "abc");

        s.try_append(b"de").unwrap();
        s.try_push('f').unwrap();
        assert!(s.is_full());
        assert!(s.try_push('g').is_err());
        assert_eq!(s.to_string(), "abcdef");
    }

    #[test]
    fn test_pop_and_truncate_respect_chars() {
        let mut s = StaticString::<16>::from_utf8("a\u{00e9}\u{1f980}".as_bytes()).unwrap();
        assert_eq!(s.pop(), Some('\u{1f980}'));
        assert_eq!(s.len(), 3);
        assert_eq!(s.truncate(2), Err(ContainerError::NotCharBoundary { index: 2 }));
        s.truncate(1).unwrap();
        assert_eq!(s, "a");
        s.assign("xyz").unwrap();
        assert_eq!(s.as_str(), "xyz");
        assert!(s.assign(&"z".repeat(17)).is_err());
        assert_eq!(s.as_str(), "xyz");
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let a: StaticString<8> = "abc".parse().unwrap();
        let b: StaticString<8> = "abd".parse().unwrap();
        let c: StaticString<8> = "ab".parse().unwrap();
        assert!(a < b);
        assert!(c < a);
        assert_eq!(a, StaticString::<8>::try_from("abc").unwrap());
        assert_eq!(format!("{:?}", a), "\"abc\"");
    }

    #[test]
    fn test_relocation_by_byte_copy() {
        let original = StaticString::<32>::from_utf8("relocated \u{00fc}".as_bytes()).unwrap();

        let layout = std::alloc::Layout::new::<StaticString<32>>();
        let region = unsafe { std::alloc::alloc(layout) };
        unsafe {
            std::ptr::copy_nonoverlapping(
                &original as *const _ as *const u8,
                region,
                size_of::<StaticString<32>>(),
            );
        }

        let moved = unsafe { &*(region as *const StaticString<32>) };
        assert_eq!(moved, &original);
        assert_eq!(moved.as_str(), "relocated \u{00fc}");
        assert_eq!(moved.chars().count(), original.chars().count());

        // Second hop through a MaybeUninit on the stack
        let mut again = MaybeUninit::<StaticString<32>>::uninit();
        unsafe {
            std::ptr::copy_nonoverlapping(region, again.as_mut_ptr() as *mut u8, layout.size());
            std::alloc::dealloc(region, layout);
        }
        let again = unsafe { again.assume_init() };
        assert_eq!(again.as_str(), original.as_str());
    }
}
