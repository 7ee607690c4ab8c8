//! Publisher - loans slots from the service pool and delivers them

use crate::error::{LoanError, PublishError, SendError};
use crate::relocatable::Relocatable;
use crate::sample::{Init, SampleMut, Uninit};
use crate::segment::Segment;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Identifies the publisher a sample came from
///
/// Upper 32 bits are the process id, lower 32 bits the publisher's
/// registration number within the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublisherId(u64);

impl PublisherId {
    fn new(registration: u32) -> Self {
        Self(((std::process::id() as u64) << 32) | registration as u64)
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Sending endpoint of a service
///
/// Created through [`Service::create_publisher`](crate::Service::create_publisher).
/// Not meant to be shared between threads; create one publisher per thread.
pub struct Publisher<T: Relocatable> {
    segment: Arc<Segment>,
    id: PublisherId,
    next_sequence: Cell<u64>,
    _payload: PhantomData<T>,
}

impl<T: Relocatable> Publisher<T> {
    pub(crate) fn new(segment: Arc<Segment>, registration: u32) -> Self {
        let id = PublisherId::new(registration);
        log::debug!("publisher {} attached to service '{}'", id, segment.name());
        Self {
            segment,
            id,
            next_sequence: Cell::new(0),
            _payload: PhantomData,
        }
    }

    pub fn id(&self) -> PublisherId {
        self.id
    }

    /// Reserve a zero-initialized slot
    ///
    /// Never blocks: fails with [`LoanError::PoolExhausted`] when every slot
    /// is loaned, queued or borrowed.
    pub fn loan_uninit(&self) -> Result<SampleMut<'_, T, Uninit>, LoanError> {
        if !self.segment.is_ready() {
            return Err(LoanError::ConnectionBroken);
        }
        let slot = self.segment.loan().ok_or(LoanError::PoolExhausted {
            pool_size: self.segment.pool_size(),
        })?;
        log::trace!("publisher {} loaned slot {}", self.id, slot);
        Ok(SampleMut::new(self, slot))
    }

    /// Reserve a slot holding `T::default()`
    pub fn loan(&self) -> Result<SampleMut<'_, T, Init>, LoanError>
    where
        T: Default,
    {
        Ok(self.loan_uninit()?.write_payload(T::default()))
    }

    /// Loan, write `value` and send in one step
    pub fn send_copy(&self, value: T) -> Result<usize, PublishError> {
        let sample = self.loan_uninit()?.write_payload(value);
        Ok(sample.send()?)
    }

    pub(crate) fn payload_ptr(&self, slot: u32) -> *mut T {
        self.segment.payload_ptr(slot) as *mut T
    }

    pub(crate) fn deliver(&self, slot: u32) -> Result<usize, SendError> {
        let sequence = self.next_sequence.get();
        let delivered = self.segment.deliver(slot, self.id.as_u64(), sequence)?;
        self.next_sequence.set(sequence + 1);
        log::trace!(
            "publisher {} sent sample {} to {} subscribers",
            self.id,
            sequence,
            delivered
        );
        Ok(delivered)
    }

    pub(crate) fn release_loan(&self, slot: u32) {
        self.segment.release_loan(slot);
    }
}

impl<T: Relocatable> Drop for Publisher<T> {
    fn drop(&mut self) {
        self.segment.remove_publisher();
        log::debug!(
            "publisher {} detached from service '{}'",
            self.id,
            self.segment.name()
        );
    }
}

impl<T: Relocatable> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("id", &self.id)
            .field("service", self.segment.name())
            .field("next_sequence", &self.next_sequence.get())
            .finish()
    }
}
