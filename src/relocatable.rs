//! Relocatable payload types
//!
//! A payload placed in shared memory is read by processes that map the segment
//! at a different base address. It must therefore be self-contained: no heap
//! pointers, no references, no file descriptors, a size known at compile time.
//! [`Relocatable`] marks such types; [`TypeDetail`] is the fingerprint every
//! opener of a service has to agree on.

use std::mem::{align_of, size_of};

/// Marker for types whose bytes stay meaningful in another address space.
///
/// Shared memory payloads are never dropped, so implementors must not rely on
/// `Drop` for correctness.
///
/// Prefer [`relocatable!`](macro@crate::relocatable) for payload structs: it
/// implements the trait and rejects any field that is not `Relocatable`
/// itself.
///
/// # Safety
/// The implementor guarantees that the type contains no pointers or
/// references (directly or through its fields), that every field is itself
/// `Relocatable`, and that a byte-wise copy of a value is an equivalent value.
///
/// ```
/// use venom_pubsub::{Relocatable, StaticString};
///
/// #[repr(C)]
/// struct Pair(u64, StaticString<8>);
///
/// unsafe impl Relocatable for Pair {}
/// ```
pub unsafe trait Relocatable: Sized + 'static {
    /// Name used for the payload-type fingerprint.
    ///
    /// Override it to let identical layouts declared in different crates
    /// communicate.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Define a `#[repr(C)]` struct and implement [`Relocatable`] for it
///
/// Every field type must implement `Relocatable`; anything else, such as a
/// `Vec` or a reference, is a compile error. An optional leading
/// `type_name = "...";` overrides [`Relocatable::type_name`].
///
/// ```
/// use venom_pubsub::{relocatable, StaticString, StaticVector};
///
/// relocatable! {
///     #[derive(Debug, Default)]
///     pub struct Telemetry {
///         pub counter: u64,
///         pub label: StaticString<16>,
///         pub readings: StaticVector<f32, 8>,
///     }
/// }
/// ```
///
/// ```compile_fail
/// use venom_pubsub::relocatable;
///
/// relocatable! {
///     struct Heap {
///         bytes: Vec<u8>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! relocatable {
    (@fields $($field_ty:ty),*) => {
        const _: fn() = || {
            fn assert_relocatable<T: $crate::Relocatable>() {}
            $(assert_relocatable::<$field_ty>();)*
        };
    };
    (
        type_name = $type_name:expr;
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident : $field_ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        $vis struct $name {
            $($(#[$field_meta])* $field_vis $field: $field_ty,)*
        }

        // SAFETY: every field is checked to be Relocatable below
        unsafe impl $crate::Relocatable for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        $crate::relocatable!(@fields $($field_ty),*);
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident : $field_ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        $vis struct $name {
            $($(#[$field_meta])* $field_vis $field: $field_ty,)*
        }

        // SAFETY: every field is checked to be Relocatable below
        unsafe impl $crate::Relocatable for $name {}

        $crate::relocatable!(@fields $($field_ty),*);
    };
}

macro_rules! impl_relocatable {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl Relocatable for $t {})*
    };
}

impl_relocatable!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
);

unsafe impl<T: Relocatable, const N: usize> Relocatable for [T; N] {}
unsafe impl<T: Relocatable> Relocatable for Option<T> {}

macro_rules! impl_relocatable_tuple {
    ($($name:ident),+) => {
        unsafe impl<$($name: Relocatable),+> Relocatable for ($($name,)+) {}
    };
}

impl_relocatable_tuple!(A);
impl_relocatable_tuple!(A, B);
impl_relocatable_tuple!(A, B, C);
impl_relocatable_tuple!(A, B, C, D);
impl_relocatable_tuple!(A, B, C, D, E);
impl_relocatable_tuple!(A, B, C, D, E, F);

/// Structural identity of a payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDetail {
    pub type_name: &'static str,
    pub size: usize,
    pub alignment: usize,
}

impl TypeDetail {
    /// Describe `T`
    pub fn of<T: Relocatable>() -> Self {
        Self {
            type_name: T::type_name(),
            size: size_of::<T>(),
            alignment: align_of::<T>(),
        }
    }

    /// 64-bit FNV-1a over name, size and alignment
    ///
    /// Two types are compatible iff their fingerprints are equal.
    pub fn fingerprint(&self) -> u64 {
        let mut hash = fnv1a(FNV_OFFSET, self.type_name.as_bytes());
        hash = fnv1a(hash, &(self.size as u64).to_le_bytes());
        fnv1a(hash, &(self.alignment as u64).to_le_bytes())
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Continue an FNV-1a hash over `bytes`
pub(crate) fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// 64-bit FNV-1a of `bytes`
pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    fnv1a(FNV_OFFSET, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Renamed(u64);

    unsafe impl Relocatable for Renamed {
        fn type_name() -> &'static str {
            "u64"
        }
    }

    crate::relocatable! {
        #[derive(Debug, Default, Clone, Copy, PartialEq)]
        struct Position {
            x: f64,
            y: f64,
            valid: bool,
        }
    }

    crate::relocatable! {
        type_name = "Position";
        #[allow(dead_code)]
        struct ForeignPosition {
            x: f64,
            y: f64,
            valid: bool,
        }
    }

    #[test]
    fn test_relocatable_macro() {
        let detail = TypeDetail::of::<Position>();
        assert_eq!(detail.size, std::mem::size_of::<Position>());
        assert_eq!(detail.alignment, 8);
        assert!(detail.type_name.ends_with("Position"));

        // Same layout declared elsewhere under the same name
        let foreign = TypeDetail::of::<ForeignPosition>();
        assert_eq!(foreign.type_name, "Position");
        assert_eq!(foreign.size, detail.size);
        assert_eq!(foreign.alignment, detail.alignment);

        let p = Position { x: 1.0, y: 2.0, valid: true };
        assert_eq!(p, Position { x: 1.0, y: 2.0, valid: true });
        assert!(p.valid && p.x < p.y);
        assert_ne!(p, Position::default());
    }

    #[test]
    fn test_fingerprint_distinguishes_types() {
        let a = TypeDetail::of::<u64>();
        let b = TypeDetail::of::<i64>();
        let c = TypeDetail::of::<u32>();

        assert_eq!(a.size, 8);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint(), TypeDetail::of::<u64>().fingerprint());
    }

    #[test]
    fn test_type_name_override() {
        assert_eq!(
            TypeDetail::of::<Renamed>().fingerprint(),
            TypeDetail::of::<u64>().fingerprint()
        );
    }

    #[test]
    fn test_fnv_reference_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
