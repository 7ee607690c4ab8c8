//! Loaned and received samples
//!
//! A [`SampleMut`] is a slot loaned from the pool. Its state parameter tracks
//! whether the payload has been written: only `SampleMut<T, Init>` can be sent.
//! A [`Sample`] is a read-only view of a delivered slot; dropping it gives the
//! slot reference back to the pool.

use crate::error::SendError;
use crate::publisher::{Publisher, PublisherId};
use crate::relocatable::Relocatable;
use crate::subscriber::Subscriber;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::{Deref, DerefMut};

/// Payload not yet written
#[derive(Debug)]
pub struct Uninit;

/// Payload written, ready to send
#[derive(Debug)]
pub struct Init;

/// Origin of a received sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleHeader {
    pub publisher_id: PublisherId,
    /// Per-publisher, starts at 0 and increments on every successful send
    pub sequence_number: u64,
}

/// A slot loaned from the service pool
pub struct SampleMut<'a, T: Relocatable, S = Init> {
    publisher: &'a Publisher<T>,
    slot: u32,
    _state: PhantomData<S>,
}

impl<'a, T: Relocatable, S> SampleMut<'a, T, S> {
    fn into_state<S2>(self) -> SampleMut<'a, T, S2> {
        let this = ManuallyDrop::new(self);
        SampleMut {
            publisher: this.publisher,
            slot: this.slot,
            _state: PhantomData,
        }
    }

    #[inline]
    fn payload_ptr(&self) -> *mut T {
        self.publisher.payload_ptr(self.slot)
    }
}

impl<'a, T: Relocatable> SampleMut<'a, T, Uninit> {
    pub(crate) fn new(publisher: &'a Publisher<T>, slot: u32) -> Self {
        Self {
            publisher,
            slot,
            _state: PhantomData,
        }
    }

    /// Zero-initialized payload memory
    pub fn payload_mut(&mut self) -> &mut MaybeUninit<T> {
        unsafe { &mut *(self.payload_ptr() as *mut MaybeUninit<T>) }
    }

    /// Write the whole payload and mark the sample initialized
    pub fn write_payload(mut self, value: T) -> SampleMut<'a, T, Init> {
        self.payload_mut().write(value);
        self.into_state()
    }

    /// Mark the payload initialized without writing it
    ///
    /// # Safety
    /// Every field of the payload must hold a valid value, either written
    /// through [`payload_mut`](Self::payload_mut) or valid as all-zero bytes.
    pub unsafe fn assume_init(self) -> SampleMut<'a, T, Init> {
        self.into_state()
    }
}

impl<'a, T: Relocatable> SampleMut<'a, T, Init> {
    pub fn payload(&self) -> &T {
        unsafe { &*self.payload_ptr() }
    }

    pub fn payload_mut(&mut self) -> &mut T {
        unsafe { &mut *self.payload_ptr() }
    }

    /// Deliver the sample to every attached subscriber
    ///
    /// Returns the number of subscribers that received it.
    pub fn send(self) -> Result<usize, SendError> {
        let this = ManuallyDrop::new(self);
        // Ownership of the slot moves to the delivery; on failure it is freed there
        this.publisher.deliver(this.slot)
    }
}

impl<T: Relocatable> Deref for SampleMut<'_, T, Init> {
    type Target = T;

    fn deref(&self) -> &T {
        self.payload()
    }
}

impl<T: Relocatable> DerefMut for SampleMut<'_, T, Init> {
    fn deref_mut(&mut self) -> &mut T {
        self.payload_mut()
    }
}

impl<T: Relocatable, S> Drop for SampleMut<'_, T, S> {
    fn drop(&mut self) {
        self.publisher.release_loan(self.slot);
    }
}

impl<T: Relocatable, S> fmt::Debug for SampleMut<'_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleMut")
            .field("slot", &self.slot)
            .field("state", &std::any::type_name::<S>())
            .finish()
    }
}

/// A received sample, borrowed from the service pool
pub struct Sample<'a, T: Relocatable> {
    subscriber: &'a Subscriber<T>,
    slot: u32,
    header: SampleHeader,
}

impl<'a, T: Relocatable> Sample<'a, T> {
    pub(crate) fn new(subscriber: &'a Subscriber<T>, slot: u32, header: SampleHeader) -> Self {
        Self {
            subscriber,
            slot,
            header,
        }
    }

    pub fn payload(&self) -> &T {
        unsafe { &*self.subscriber.payload_ptr(self.slot) }
    }

    pub fn header(&self) -> &SampleHeader {
        &self.header
    }
}

impl<T: Relocatable> Deref for Sample<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.payload()
    }
}

impl<T: Relocatable> Drop for Sample<'_, T> {
    fn drop(&mut self) {
        self.subscriber.release(self.slot);
    }
}

impl<T: Relocatable + fmt::Debug> fmt::Debug for Sample<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("header", &self.header)
            .field("payload", self.payload())
            .finish()
    }
}
