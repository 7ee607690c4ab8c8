//! Subscriber - receives samples from its own delivery queue

use crate::error::ReceiveError;
use crate::publisher::PublisherId;
use crate::relocatable::Relocatable;
use crate::sample::{Sample, SampleHeader};
use crate::segment::Segment;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Receiving endpoint of a service
///
/// Each subscriber owns a queue of `subscriber_max_buffer_size` entries in the
/// segment. When the queue is full the oldest sample is dropped to make room,
/// publishers never wait for slow subscribers.
pub struct Subscriber<T: Relocatable> {
    segment: Arc<Segment>,
    port: u32,
    borrowed: Cell<usize>,
    disconnect_reported: Cell<bool>,
    _payload: PhantomData<T>,
}

impl<T: Relocatable> Subscriber<T> {
    pub(crate) fn new(segment: Arc<Segment>, port: u32) -> Self {
        log::debug!(
            "subscriber on port {} attached to service '{}'",
            port,
            segment.name()
        );
        Self {
            segment,
            port,
            borrowed: Cell::new(0),
            disconnect_reported: Cell::new(false),
            _payload: PhantomData,
        }
    }

    /// Take the oldest undelivered sample, `Ok(None)` if there is none
    ///
    /// When the last publisher has left while samples are still queued, the
    /// first call reports [`ReceiveError::ConnectionBroken`]; later calls keep
    /// draining the queue.
    pub fn receive(&self) -> Result<Option<Sample<'_, T>>, ReceiveError> {
        let max = self.segment.config().subscriber_max_borrowed_samples;
        if self.borrowed.get() >= max {
            return Err(ReceiveError::ExceedsMaxBorrows { max });
        }

        if self.segment.publisher_count() > 0 {
            self.disconnect_reported.set(false);
        } else if !self.disconnect_reported.get() {
            let pending = self.segment.pending(self.port);
            if pending > 0 {
                self.disconnect_reported.set(true);
                log::debug!(
                    "service '{}' lost all publishers, {} samples pending",
                    self.segment.name(),
                    pending
                );
                return Err(ReceiveError::ConnectionBroken { pending });
            }
        }

        let Some(slot) = self.segment.receive(self.port) else {
            return Ok(None);
        };

        let (publisher_id, sequence_number) = self.segment.origin(slot);
        self.borrowed.set(self.borrowed.get() + 1);
        log::trace!("subscriber on port {} received slot {}", self.port, slot);

        Ok(Some(Sample::new(
            self,
            slot,
            SampleHeader {
                publisher_id: PublisherId::from_raw(publisher_id),
                sequence_number,
            },
        )))
    }

    /// Whether a `receive` would return a sample
    pub fn has_samples(&self) -> bool {
        self.segment.pending(self.port) > 0
    }

    /// Samples currently held by the caller
    pub fn borrowed_samples(&self) -> usize {
        self.borrowed.get()
    }

    pub(crate) fn payload_ptr(&self, slot: u32) -> *const T {
        self.segment.payload_ptr(slot) as *const T
    }

    pub(crate) fn release(&self, slot: u32) {
        self.borrowed.set(self.borrowed.get() - 1);
        self.segment.release(slot);
    }
}

impl<T: Relocatable> Drop for Subscriber<T> {
    fn drop(&mut self) {
        self.segment.remove_subscriber(self.port);
        log::debug!(
            "subscriber on port {} detached from service '{}'",
            self.port,
            self.segment.name()
        );
    }
}

impl<T: Relocatable> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("port", &self.port)
            .field("service", self.segment.name())
            .field("borrowed", &self.borrowed.get())
            .finish()
    }
}
