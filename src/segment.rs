//! Shared memory layout of a publish-subscribe service
//!
//! One segment per service. Everything in it is addressed by offset or slot
//! index, never by pointer, so every process can map it at any address.
//!
//! # Memory Layout
//!
//! ```text
//! +-------------------------------------------------------------+
//! | SegmentHeader (cache-aligned)                               |
//! |   magic, version, state, lock, ref_count, endpoint counts,  |
//! |   payload fingerprint, configuration, history ring, name    |
//! +-------------------------------------------------------------+
//! | SlotHeader[pool_size]        state + reference count        |
//! +-------------------------------------------------------------+
//! | PortHeader[max_subscribers]  one delivery queue per port    |
//! +-------------------------------------------------------------+
//! | u32[max_subscribers * subscriber_max_buffer_size]  queues   |
//! +-------------------------------------------------------------+
//! | u32[history_size]            history ring                   |
//! +-------------------------------------------------------------+
//! | payload[pool_size]           stride = aligned payload size  |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Slot Lifecycle
//!
//! ```text
//! FREE --loan--> LOANED --send--> DELIVERED(refs = n) --last release--> FREE
//!                  |
//!                  +--drop unsent--> FREE
//! ```
//! A delivered slot holds one reference per queue entry, borrowed sample and
//! history entry pointing at it.
//!
//! # Reference Counting
//!
//! `ref_count` counts attached service handles across all processes. Openers
//! only increment a non-zero count (compare-and-swap), so a segment whose count
//! dropped to zero can never be revived; the process performing the last
//! decrement marks it destroyed and unlinks the name.

use crate::config::ServiceConfig;
use crate::error::{
    EndpointError, EndpointKind, IncompatibilityReason, SendError, ServiceError, VenomError,
};
use crate::name::{ServiceName, MAX_SERVICE_NAME_LEN};
use crate::relocatable::TypeDetail;
use crate::shm::VenomShm;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Magic number for segment validation
const SEGMENT_MAGIC: u32 = 0x5650_5342; // "VPSB"
const SEGMENT_VERSION: u32 = 1;

/// Cache line size
const CACHE_LINE_SIZE: usize = 64;

/// Largest payload alignment a page-aligned mapping can honor
const MAX_PAYLOAD_ALIGNMENT: usize = 4096;

/// How long an opener waits for the creator to finish initialization
const INIT_TIMEOUT: Duration = Duration::from_secs(1);
const INIT_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// How long `acquire` keeps resolving create/open races with a segment being torn down
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Segment states
mod segment_state {
    pub const UNINITIALIZED: u32 = 0;
    pub const READY: u32 = 1;
    pub const DESTROYED: u32 = 2;
}

/// Slot states
mod slot_state {
    pub const FREE: u32 = 0;
    pub const LOANED: u32 = 1;
    pub const DELIVERED: u32 = 2;
}

/// Segment header stored at the beginning of shared memory
#[repr(C, align(64))]
struct SegmentHeader {
    magic: u32,
    version: u32,
    state: AtomicU32,
    lock: AtomicU32,
    ref_count: AtomicU32,
    publisher_count: AtomicU32,
    subscriber_count: AtomicU32,
    next_publisher_id: AtomicU32,
    history_head: AtomicU32,
    history_len: AtomicU32,
    type_fingerprint: u64,
    payload_size: u64,
    payload_alignment: u64,
    max_publishers: u64,
    max_subscribers: u64,
    history_size: u64,
    subscriber_max_buffer_size: u64,
    subscriber_max_borrowed_samples: u64,
    max_loaned_samples: u64,
    total_size: u64,
    name_len: u64,
    name: [u8; MAX_SERVICE_NAME_LEN + 1],
}

impl SegmentHeader {
    fn config(&self) -> ServiceConfig {
        ServiceConfig {
            max_publishers: self.max_publishers as usize,
            max_subscribers: self.max_subscribers as usize,
            history_size: self.history_size as usize,
            subscriber_max_buffer_size: self.subscriber_max_buffer_size as usize,
            subscriber_max_borrowed_samples: self.subscriber_max_borrowed_samples as usize,
            max_loaned_samples: self.max_loaned_samples as usize,
        }
    }

    fn name(&self) -> &[u8] {
        let len = (self.name_len as usize).min(MAX_SERVICE_NAME_LEN);
        &self.name[..len]
    }
}

/// Per-slot bookkeeping
#[repr(C)]
pub(crate) struct SlotHeader {
    state: AtomicU32,
    refs: AtomicU32,
    publisher_id: AtomicU64,
    sequence: AtomicU64,
}

/// Per-subscriber delivery queue state
#[repr(C)]
struct PortHeader {
    active: AtomicU32,
    head: AtomicU32,
    len: AtomicU32,
    _reserved: u32,
}

#[inline(always)]
const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Offsets of every region, derived from configuration and payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentLayout {
    pool_size: usize,
    max_subscribers: usize,
    buffer_size: usize,
    history_size: usize,
    slots_offset: usize,
    ports_offset: usize,
    queues_offset: usize,
    history_offset: usize,
    payload_offset: usize,
    payload_size: usize,
    payload_stride: usize,
    total_size: usize,
}

impl SegmentLayout {
    pub(crate) fn new(config: &ServiceConfig, payload: &TypeDetail) -> Result<Self, ServiceError> {
        if payload.alignment > MAX_PAYLOAD_ALIGNMENT {
            return Err(ServiceError::UnsupportedPayload(
                "alignment larger than a memory page",
            ));
        }

        let pool_size = config.pool_size();
        let max_subscribers = config.max_subscribers;
        let buffer_size = config.subscriber_max_buffer_size;
        let history_size = config.history_size;

        let slots_offset = align_up(size_of::<SegmentHeader>(), CACHE_LINE_SIZE);
        let ports_offset =
            align_up(slots_offset + pool_size * size_of::<SlotHeader>(), CACHE_LINE_SIZE);
        let queues_offset =
            align_up(ports_offset + max_subscribers * size_of::<PortHeader>(), CACHE_LINE_SIZE);
        let history_offset = align_up(
            queues_offset + max_subscribers * buffer_size * size_of::<u32>(),
            CACHE_LINE_SIZE,
        );
        let payload_offset = align_up(
            history_offset + history_size * size_of::<u32>(),
            payload.alignment.max(CACHE_LINE_SIZE),
        );
        let payload_stride = align_up(payload.size.max(1), payload.alignment);

        let total_size = pool_size
            .checked_mul(payload_stride)
            .and_then(|payloads| payloads.checked_add(payload_offset))
            .ok_or(ServiceError::UnsupportedPayload("payload pool exceeds address space"))?;

        Ok(Self {
            pool_size,
            max_subscribers,
            buffer_size,
            history_size,
            slots_offset,
            ports_offset,
            queues_offset,
            history_offset,
            payload_offset,
            payload_size: payload.size,
            payload_stride,
            total_size,
        })
    }
}

/// How `Segment::acquire` treats an existing or missing segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenMode {
    Create,
    Open,
    OpenOrCreate,
}

enum AttachError {
    /// Segment is being torn down, try again
    Retry,
    Fail(ServiceError),
}

/// Process-local handle to one service segment; holds one cross-process reference
pub(crate) struct Segment {
    shm: VenomShm,
    layout: SegmentLayout,
    name: ServiceName,
    config: ServiceConfig,
    payload: TypeDetail,
}

/// Cross-process spin lock guard over queue and history state
struct SegmentGuard<'a> {
    lock: &'a AtomicU32,
}

impl Drop for SegmentGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(0, Ordering::Release);
    }
}

impl Segment {
    /// Create, open or open-or-create the segment of `name`
    pub(crate) fn acquire(
        name: &ServiceName,
        requested: &ServiceConfig,
        payload: TypeDetail,
        mode: OpenMode,
    ) -> Result<Self, ServiceError> {
        requested.validate()?;
        let segment_name = name.segment_name();
        let deadline = Instant::now() + ACQUIRE_TIMEOUT;

        loop {
            if mode != OpenMode::Open {
                let layout = SegmentLayout::new(requested, &payload)?;
                match VenomShm::create(&segment_name, layout.total_size) {
                    Ok(shm) => {
                        let segment = Self::initialize(shm, name, requested, payload, layout);
                        log::debug!(
                            "created service '{}' ({} slots of {} bytes, {} bytes total)",
                            name,
                            layout.pool_size,
                            layout.payload_stride,
                            layout.total_size
                        );
                        return Ok(segment);
                    }
                    Err(VenomError::AlreadyExists(_)) if mode == OpenMode::Create => {
                        return Err(ServiceError::AlreadyExists(name.to_string()));
                    }
                    Err(VenomError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }

            match VenomShm::open(&segment_name) {
                Ok(shm) => match Self::attach(shm, name, requested, payload) {
                    Ok(segment) => {
                        log::debug!("opened service '{}'", name);
                        return Ok(segment);
                    }
                    Err(AttachError::Retry) => {
                        log::trace!("service '{}' is being destroyed, retrying", name);
                    }
                    Err(AttachError::Fail(e)) => return Err(e),
                },
                Err(VenomError::NotFound(_)) if mode == OpenMode::Open => {
                    return Err(ServiceError::DoesNotExist(name.to_string()));
                }
                Err(VenomError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }

            // A destroyed segment keeps its name until the last holder unlinks it
            if Instant::now() >= deadline {
                return Err(ServiceError::HangsInCreation(name.to_string()));
            }
            std::thread::sleep(INIT_POLL_INTERVAL);
        }
    }

    fn initialize(
        shm: VenomShm,
        name: &ServiceName,
        config: &ServiceConfig,
        payload: TypeDetail,
        layout: SegmentLayout,
    ) -> Self {
        let header = shm.as_ptr() as *mut SegmentHeader;

        // The segment is zeroed: all slots FREE, all ports inactive, lock open
        unsafe {
            debug_assert_eq!(
                (&(*header).state).load(Ordering::Relaxed),
                segment_state::UNINITIALIZED
            );
            (*header).magic = SEGMENT_MAGIC;
            (*header).version = SEGMENT_VERSION;
            (*header).type_fingerprint = payload.fingerprint();
            (*header).payload_size = payload.size as u64;
            (*header).payload_alignment = payload.alignment as u64;
            (*header).max_publishers = config.max_publishers as u64;
            (*header).max_subscribers = config.max_subscribers as u64;
            (*header).history_size = config.history_size as u64;
            (*header).subscriber_max_buffer_size = config.subscriber_max_buffer_size as u64;
            (*header).subscriber_max_borrowed_samples =
                config.subscriber_max_borrowed_samples as u64;
            (*header).max_loaned_samples = config.max_loaned_samples as u64;
            (*header).total_size = layout.total_size as u64;

            let bytes = name.as_str().as_bytes();
            (*header).name_len = bytes.len() as u64;
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                std::ptr::addr_of_mut!((*header).name).cast::<u8>(),
                bytes.len(),
            );

            let header = &*header;
            header.ref_count.store(1, Ordering::Relaxed);
            // Publish: everything above becomes visible to openers
            header.state.store(segment_state::READY, Ordering::Release);
        }

        Self {
            shm,
            layout,
            name: name.clone(),
            config: config.clone(),
            payload,
        }
    }

    fn attach(
        shm: VenomShm,
        name: &ServiceName,
        requested: &ServiceConfig,
        payload: TypeDetail,
    ) -> Result<Self, AttachError> {
        if shm.size() < size_of::<SegmentHeader>() {
            return Err(AttachError::Fail(ServiceError::Corrupted));
        }
        let header = unsafe { &*(shm.as_ptr() as *const SegmentHeader) };

        let deadline = Instant::now() + INIT_TIMEOUT;
        loop {
            match header.state.load(Ordering::Acquire) {
                segment_state::READY => break,
                segment_state::DESTROYED => return Err(AttachError::Retry),
                _ if Instant::now() >= deadline => {
                    return Err(AttachError::Fail(ServiceError::HangsInCreation(
                        name.to_string(),
                    )));
                }
                _ => std::thread::sleep(INIT_POLL_INTERVAL),
            }
        }

        let incompatible = |reason| AttachError::Fail(ServiceError::IncompatibleService(reason));

        if header.magic != SEGMENT_MAGIC {
            return Err(AttachError::Fail(ServiceError::Corrupted));
        }
        if header.version != SEGMENT_VERSION {
            return Err(incompatible(IncompatibilityReason::VersionMismatch {
                expected: SEGMENT_VERSION,
                got: header.version,
            }));
        }
        if header.name() != name.as_str().as_bytes() {
            return Err(incompatible(IncompatibilityReason::NameCollision));
        }
        if header.type_fingerprint != payload.fingerprint() {
            return Err(incompatible(IncompatibilityReason::PayloadType {
                expected: header.type_fingerprint,
                got: payload.fingerprint(),
            }));
        }

        let existing = header.config();
        requested.check_compatible(&existing).map_err(incompatible)?;

        let layout = SegmentLayout::new(&existing, &payload).map_err(AttachError::Fail)?;
        if layout.total_size as u64 != header.total_size || shm.size() < layout.total_size {
            return Err(AttachError::Fail(ServiceError::Corrupted));
        }

        // Join only while somebody else still keeps the segment alive
        let mut current = header.ref_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(AttachError::Retry);
            }
            match header.ref_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(Self {
            shm,
            layout,
            name: name.clone(),
            config: existing,
            payload,
        })
    }

    #[inline(always)]
    fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.shm.as_ptr() as *const SegmentHeader) }
    }

    #[inline]
    pub(crate) fn slot(&self, index: u32) -> &SlotHeader {
        debug_assert!((index as usize) < self.layout.pool_size);
        unsafe {
            &*(self
                .shm
                .as_ptr()
                .add(self.layout.slots_offset + index as usize * size_of::<SlotHeader>())
                as *const SlotHeader)
        }
    }

    #[inline]
    fn port(&self, port: u32) -> &PortHeader {
        debug_assert!((port as usize) < self.layout.max_subscribers);
        unsafe {
            &*(self
                .shm
                .as_ptr()
                .add(self.layout.ports_offset + port as usize * size_of::<PortHeader>())
                as *const PortHeader)
        }
    }

    #[inline]
    fn queue_entry(&self, port: u32, position: usize) -> &AtomicU32 {
        let index = port as usize * self.layout.buffer_size + position;
        unsafe {
            &*(self
                .shm
                .as_ptr()
                .add(self.layout.queues_offset + index * size_of::<u32>())
                as *const AtomicU32)
        }
    }

    #[inline]
    fn history_entry(&self, position: usize) -> &AtomicU32 {
        unsafe {
            &*(self
                .shm
                .as_ptr()
                .add(self.layout.history_offset + position * size_of::<u32>())
                as *const AtomicU32)
        }
    }

    /// Pointer to the payload bytes of `index`
    #[inline]
    pub(crate) fn payload_ptr(&self, index: u32) -> *mut u8 {
        debug_assert!((index as usize) < self.layout.pool_size);
        unsafe {
            self.shm
                .as_ptr()
                .add(self.layout.payload_offset + index as usize * self.layout.payload_stride)
        }
    }

    fn lock(&self) -> SegmentGuard<'_> {
        let lock = &self.header().lock;
        let mut spins = 0u32;
        while lock
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins += 1;
            if spins % 64 == 0 {
                std::thread::yield_now();
            } else {
                core::hint::spin_loop();
            }
        }
        SegmentGuard { lock }
    }

    pub(crate) fn name(&self) -> &ServiceName {
        &self.name
    }

    pub(crate) fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub(crate) fn payload(&self) -> &TypeDetail {
        &self.payload
    }

    pub(crate) fn pool_size(&self) -> usize {
        self.layout.pool_size
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.header().state.load(Ordering::Acquire) == segment_state::READY
    }

    pub(crate) fn publisher_count(&self) -> usize {
        self.header().publisher_count.load(Ordering::Acquire) as usize
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.header().subscriber_count.load(Ordering::Acquire) as usize
    }

    #[cfg(test)]
    fn ref_count(&self) -> usize {
        self.header().ref_count.load(Ordering::Acquire) as usize
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    /// Register a publisher; returns its service-unique sequence number
    pub(crate) fn add_publisher(&self) -> Result<u32, EndpointError> {
        if !self.is_ready() {
            return Err(EndpointError::ServiceDestroyed);
        }
        let header = self.header();
        let max = self.config.max_publishers as u32;

        let mut current = header.publisher_count.load(Ordering::Acquire);
        loop {
            if current >= max {
                return Err(EndpointError::LimitExceeded {
                    kind: EndpointKind::Publisher,
                    max: max as usize,
                });
            }
            match header.publisher_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(header.next_publisher_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn remove_publisher(&self) {
        self.header().publisher_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Claim a subscriber port and prefill its queue from the history
    pub(crate) fn add_subscriber(&self) -> Result<u32, EndpointError> {
        if !self.is_ready() {
            return Err(EndpointError::ServiceDestroyed);
        }
        let header = self.header();
        let _guard = self.lock();

        let max = self.config.max_subscribers;
        if header.subscriber_count.load(Ordering::Relaxed) as usize >= max {
            return Err(EndpointError::LimitExceeded {
                kind: EndpointKind::Subscriber,
                max,
            });
        }

        let port = (0..max as u32)
            .find(|&p| self.port(p).active.load(Ordering::Relaxed) == 0)
            .ok_or(EndpointError::LimitExceeded {
                kind: EndpointKind::Subscriber,
                max,
            })?;

        let state = self.port(port);
        state.head.store(0, Ordering::Relaxed);
        state.len.store(0, Ordering::Relaxed);
        state.active.store(1, Ordering::Relaxed);
        header.subscriber_count.fetch_add(1, Ordering::AcqRel);

        // Late joiner: replay the newest history entries that fit
        let history_len = header.history_len.load(Ordering::Relaxed) as usize;
        let history_head = header.history_head.load(Ordering::Relaxed) as usize;
        let skip = history_len.saturating_sub(self.layout.buffer_size);
        for i in skip..history_len {
            let index = self
                .history_entry((history_head + i) % self.layout.history_size)
                .load(Ordering::Relaxed);
            self.slot(index).refs.fetch_add(1, Ordering::AcqRel);
            self.push_entry(port, index);
        }

        Ok(port)
    }

    /// Release a subscriber port and every sample still queued for it
    pub(crate) fn remove_subscriber(&self, port: u32) {
        let _guard = self.lock();
        while let Some(index) = self.pop_entry(port) {
            self.release(index);
        }
        self.port(port).active.store(0, Ordering::Relaxed);
        self.header().subscriber_count.fetch_sub(1, Ordering::AcqRel);
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    /// Reserve a free slot and zero its payload
    pub(crate) fn loan(&self) -> Option<u32> {
        let index = (0..self.layout.pool_size as u32).find(|&i| {
            self.slot(i)
                .state
                .compare_exchange(
                    slot_state::FREE,
                    slot_state::LOANED,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
        })?;

        unsafe {
            std::ptr::write_bytes(self.payload_ptr(index), 0, self.layout.payload_size);
        }
        Some(index)
    }

    /// Return a loaned, never delivered slot
    pub(crate) fn release_loan(&self, index: u32) {
        self.slot(index).state.store(slot_state::FREE, Ordering::Release);
    }

    /// Drop one reference to a delivered slot
    pub(crate) fn release(&self, index: u32) {
        let slot = self.slot(index);
        if slot.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            slot.state.store(slot_state::FREE, Ordering::Release);
        }
    }

    /// Publisher id and sequence number stamped on a delivered slot
    pub(crate) fn origin(&self, index: u32) -> (u64, u64) {
        let slot = self.slot(index);
        (
            slot.publisher_id.load(Ordering::Acquire),
            slot.sequence.load(Ordering::Acquire),
        )
    }

    /// Hand a loaned slot to every attached subscriber and the history
    ///
    /// Returns the number of subscribers that received it.
    pub(crate) fn deliver(
        &self,
        index: u32,
        publisher_id: u64,
        sequence: u64,
    ) -> Result<usize, SendError> {
        let header = self.header();
        let slot = self.slot(index);
        slot.publisher_id.store(publisher_id, Ordering::Relaxed);
        slot.sequence.store(sequence, Ordering::Relaxed);

        let guard = self.lock();

        let keeps_history = self.layout.history_size > 0;
        let subscribers = header.subscriber_count.load(Ordering::Relaxed) as usize;
        let references = subscribers + keeps_history as usize;

        if !self.is_ready() || references == 0 {
            drop(guard);
            self.release_loan(index);
            return Err(SendError::ConnectionBroken);
        }

        slot.refs.store(references as u32, Ordering::Relaxed);
        slot.state.store(slot_state::DELIVERED, Ordering::Release);

        let mut delivered = 0;
        for port in 0..self.layout.max_subscribers as u32 {
            if self.port(port).active.load(Ordering::Relaxed) == 0 {
                continue;
            }
            if self.port(port).len.load(Ordering::Relaxed) as usize == self.layout.buffer_size {
                if let Some(oldest) = self.pop_entry(port) {
                    log::warn!("subscriber queue {} full, dropping oldest sample", port);
                    self.release(oldest);
                }
            }
            self.push_entry(port, index);
            delivered += 1;
        }

        if keeps_history {
            let len = header.history_len.load(Ordering::Relaxed) as usize;
            let head = header.history_head.load(Ordering::Relaxed) as usize;
            let size = self.layout.history_size;
            if len == size {
                let oldest = self.history_entry(head).load(Ordering::Relaxed);
                self.history_entry(head).store(index, Ordering::Relaxed);
                header.history_head.store(((head + 1) % size) as u32, Ordering::Relaxed);
                self.release(oldest);
            } else {
                self.history_entry((head + len) % size).store(index, Ordering::Relaxed);
                header.history_len.store((len + 1) as u32, Ordering::Relaxed);
            }
        }

        Ok(delivered)
    }

    /// Take the oldest queued slot of `port`
    pub(crate) fn receive(&self, port: u32) -> Option<u32> {
        let _guard = self.lock();
        self.pop_entry(port)
    }

    /// Number of samples queued for `port`
    pub(crate) fn pending(&self, port: u32) -> usize {
        self.port(port).len.load(Ordering::Acquire) as usize
    }

    // Queue helpers, caller holds the lock

    fn push_entry(&self, port: u32, index: u32) {
        let state = self.port(port);
        let head = state.head.load(Ordering::Relaxed) as usize;
        let len = state.len.load(Ordering::Relaxed) as usize;
        debug_assert!(len < self.layout.buffer_size);
        self.queue_entry(port, (head + len) % self.layout.buffer_size)
            .store(index, Ordering::Relaxed);
        state.len.store((len + 1) as u32, Ordering::Release);
    }

    fn pop_entry(&self, port: u32) -> Option<u32> {
        let state = self.port(port);
        let len = state.len.load(Ordering::Relaxed) as usize;
        if len == 0 {
            return None;
        }
        let head = state.head.load(Ordering::Relaxed) as usize;
        let index = self.queue_entry(port, head).load(Ordering::Relaxed);
        state
            .head
            .store(((head + 1) % self.layout.buffer_size) as u32, Ordering::Relaxed);
        state.len.store((len - 1) as u32, Ordering::Release);
        Some(index)
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        let header = self.header();
        if header.ref_count.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        header.state.store(segment_state::DESTROYED, Ordering::Release);
        match VenomShm::unlink(self.shm.name()) {
            Ok(()) => log::debug!("service '{}' reclaimed", self.name),
            Err(e) => log::warn!("failed to unlink segment of service '{}': {}", self.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(prefix: &str) -> ServiceName {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        ServiceName::new(&format!("{}/{}/{}", prefix, std::process::id(), n)).unwrap()
    }

    fn acquire(name: &ServiceName, config: &ServiceConfig) -> Segment {
        Segment::acquire(name, config, TypeDetail::of::<u64>(), OpenMode::OpenOrCreate).unwrap()
    }

    #[test]
    fn test_layout_regions_do_not_overlap() {
        let config = ServiceConfig::new(2, 3).with_history_size(2);
        let layout = SegmentLayout::new(&config, &TypeDetail::of::<[u8; 100]>()).unwrap();

        assert!(layout.slots_offset >= size_of::<SegmentHeader>());
        assert!(layout.ports_offset >= layout.slots_offset + layout.pool_size * size_of::<SlotHeader>());
        assert!(layout.queues_offset >= layout.ports_offset + 3 * size_of::<PortHeader>());
        assert!(layout.history_offset >= layout.queues_offset + 3 * 2 * 4);
        assert!(layout.payload_offset >= layout.history_offset + 2 * 4);
        assert_eq!(layout.payload_stride, 100);
        assert_eq!(
            layout.total_size,
            layout.payload_offset + layout.pool_size * layout.payload_stride
        );
    }

    #[test]
    fn test_layout_respects_payload_alignment() {
        #[repr(C, align(128))]
        struct Aligned([u8; 130]);
        unsafe impl crate::Relocatable for Aligned {}

        let layout =
            SegmentLayout::new(&ServiceConfig::new(1, 1), &TypeDetail::of::<Aligned>()).unwrap();
        assert_eq!(layout.payload_offset % 128, 0);
        assert_eq!(layout.payload_stride % 128, 0);
    }

    #[test]
    fn test_reference_count_reclaims_segment() {
        let name = unique_name("segment/refcount");
        let config = ServiceConfig::new(1, 1);

        let first = acquire(&name, &config);
        let second = acquire(&name, &config);
        assert_eq!(first.ref_count(), 2);

        drop(first);
        assert_eq!(second.ref_count(), 1);
        drop(second);

        assert!(matches!(
            Segment::acquire(&name, &config, TypeDetail::of::<u64>(), OpenMode::Open),
            Err(ServiceError::DoesNotExist(_))
        ));
    }

    #[test]
    fn test_acquire_outlasts_segment_teardown() {
        let name = unique_name("segment/teardown");
        let config = ServiceConfig::new(1, 1);

        // Marked destroyed but not yet unlinked, as between the last release and unlink
        let dying = acquire(&name, &config);
        dying.header().state.store(segment_state::DESTROYED, Ordering::Release);

        let segment_name = name.segment_name();
        let unlinker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            VenomShm::unlink(&segment_name).unwrap();
        });

        let fresh = acquire(&name, &config);
        unlinker.join().unwrap();
        assert!(fresh.is_ready());
        assert_eq!(fresh.ref_count(), 1);

        // Keep the stale handle from unlinking the new segment's name
        dying.header().ref_count.fetch_add(1, Ordering::AcqRel);
        drop(dying);
        assert_eq!(fresh.ref_count(), 1);
    }

    #[test]
    fn test_slot_lifecycle() {
        let name = unique_name("segment/slots");
        let config = ServiceConfig::new(1, 1);
        let segment = acquire(&name, &config);
        let pool = segment.pool_size();

        let loans: Vec<u32> = (0..pool).filter_map(|_| segment.loan()).collect();
        assert_eq!(loans.len(), pool);
        assert_eq!(segment.loan(), None);

        segment.release_loan(loans[3]);
        assert_eq!(segment.loan(), Some(loans[3]));
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let name = unique_name("segment/overflow");
        let config = ServiceConfig::new(1, 1).with_subscriber_max_buffer_size(2);
        let segment = acquire(&name, &config);
        let port = segment.add_subscriber().unwrap();

        let mut sent = Vec::new();
        for seq in 0..3 {
            let index = segment.loan().unwrap();
            assert_eq!(segment.deliver(index, 7, seq), Ok(1));
            sent.push(index);
        }

        // First sample was evicted and its slot is free again
        assert_eq!(segment.slot(sent[0]).state.load(Ordering::Relaxed), slot_state::FREE);
        assert_eq!(segment.pending(port), 2);
        assert_eq!(segment.receive(port), Some(sent[1]));
        assert_eq!(segment.origin(sent[2]), (7, 2));

        segment.remove_subscriber(port);
        assert_eq!(segment.subscriber_count(), 0);
    }

    #[test]
    fn test_history_replayed_to_late_subscriber() {
        let name = unique_name("segment/history");
        let config = ServiceConfig::new(1, 2)
            .with_history_size(2)
            .with_subscriber_max_buffer_size(2);
        let segment = acquire(&name, &config);

        let mut sent = Vec::new();
        for seq in 0..3 {
            let index = segment.loan().unwrap();
            assert_eq!(segment.deliver(index, 1, seq), Ok(0));
            sent.push(index);
        }

        let port = segment.add_subscriber().unwrap();
        assert_eq!(segment.receive(port), Some(sent[1]));
        assert_eq!(segment.receive(port), Some(sent[2]));
        assert_eq!(segment.receive(port), None);
    }

    #[test]
    fn test_deliver_without_receivers_is_broken() {
        let name = unique_name("segment/broken");
        let segment = acquire(&name, &ServiceConfig::new(1, 1));

        let index = segment.loan().unwrap();
        assert_eq!(segment.deliver(index, 1, 0), Err(SendError::ConnectionBroken));
        assert_eq!(segment.slot(index).state.load(Ordering::Relaxed), slot_state::FREE);
    }
}
