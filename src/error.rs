//! Error types for VenomPubSub
//!
//! Every fallible operation returns one of the enums below. Capacity errors are
//! expected at runtime and recoverable, compatibility errors are configuration
//! mistakes surfaced at creation time, connection errors report that the other
//! side of a service is gone.

use std::io;
use thiserror::Error;

/// Result type for shared memory segment operations
pub type Result<T> = std::result::Result<T, VenomError>;

/// Errors that can occur while handling raw shared memory segments
#[derive(Debug, Error)]
pub enum VenomError {
    /// Failed to create shared memory
    #[error("Failed to create shared memory '{name}': {source}")]
    ShmCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to open shared memory
    #[error("Failed to open shared memory '{name}': {source}")]
    ShmOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A segment with this name already exists
    #[error("Shared memory '{0}' already exists")]
    AlreadyExists(String),

    /// No segment with this name exists
    #[error("Shared memory '{0}' does not exist")]
    NotFound(String),

    /// Failed to map memory
    #[error("Failed to map memory: {0}")]
    Mmap(#[source] io::Error),

    /// Failed to truncate shared memory
    #[error("Failed to set shared memory size: {0}")]
    Truncate(#[source] io::Error),

    /// Failed to query the segment size
    #[error("Failed to query shared memory size: {0}")]
    Stat(#[source] io::Error),

    /// Namespace too long
    #[error("Namespace too long: max {max} chars, got {got}")]
    NamespaceTooLong { max: usize, got: usize },
}

/// Errors returned by the relocatable containers
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContainerError {
    /// The operation would grow the container beyond its fixed capacity
    #[error("Capacity exceeded: capacity {capacity}, required {required}")]
    CapacityExceeded { capacity: usize, required: usize },

    /// Input bytes are not valid UTF-8
    #[error("Invalid UTF-8 sequence after {valid_up_to} valid bytes")]
    InvalidUtf8 { valid_up_to: usize },

    /// Index outside of `[0, len)`
    #[error("Index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// Byte index does not lie on a UTF-8 character boundary
    #[error("Index {index} is not a character boundary")]
    NotCharBoundary { index: usize },
}

/// Errors returned when validating a service name
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceNameError {
    #[error("Service name is empty")]
    Empty,

    #[error("Service name too long: max {max} bytes, got {got}")]
    TooLong { max: usize, got: usize },

    #[error("Service name contains a NUL byte")]
    ContainsNul,
}

/// Why an existing service rejected an opener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompatibilityReason {
    /// Another service hashed to the same segment name
    NameCollision,
    /// The segment was created by an incompatible layout version
    VersionMismatch { expected: u32, got: u32 },
    /// Payload-type fingerprint, size or alignment differ
    PayloadType { expected: u64, got: u64 },
    MaxPublishers { requested: usize, available: usize },
    MaxSubscribers { requested: usize, available: usize },
    HistorySize { requested: usize, available: usize },
    SubscriberBufferSize { requested: usize, available: usize },
    SubscriberBorrowedSamples { requested: usize, available: usize },
    MaxLoanedSamples { requested: usize, available: usize },
}

impl std::fmt::Display for IncompatibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameCollision => write!(f, "segment belongs to a different service name"),
            Self::VersionMismatch { expected, got } => {
                write!(f, "layout version {got}, expected {expected}")
            }
            Self::PayloadType { expected, got } => write!(
                f,
                "payload type fingerprint 0x{got:016X} does not match 0x{expected:016X}"
            ),
            Self::MaxPublishers { requested, available } => {
                write!(f, "requested {requested} publishers, service supports {available}")
            }
            Self::MaxSubscribers { requested, available } => {
                write!(f, "requested {requested} subscribers, service supports {available}")
            }
            Self::HistorySize { requested, available } => {
                write!(f, "requested history of {requested}, service keeps {available}")
            }
            Self::SubscriberBufferSize { requested, available } => write!(
                f,
                "requested subscriber buffer of {requested}, service provides {available}"
            ),
            Self::SubscriberBorrowedSamples { requested, available } => write!(
                f,
                "requested {requested} borrowed samples, service allows {available}"
            ),
            Self::MaxLoanedSamples { requested, available } => write!(
                f,
                "requested {requested} loaned samples per publisher, service reserves {available}"
            ),
        }
    }
}

/// Errors returned by `Service::open_or_create` and friends
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid service name: {0}")]
    InvalidName(#[from] ServiceNameError),

    #[error("Invalid service configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("Payload type cannot be placed in shared memory: {0}")]
    UnsupportedPayload(&'static str),

    #[error(transparent)]
    Segment(#[from] VenomError),

    #[error("Service '{0}' already exists")]
    AlreadyExists(String),

    #[error("Service '{0}' does not exist")]
    DoesNotExist(String),

    #[error("Incompatible service: {0}")]
    IncompatibleService(IncompatibilityReason),

    #[error("Service segment is corrupted")]
    Corrupted,

    #[error("Service '{0}' never finished initialization")]
    HangsInCreation(String),
}

/// Kind of endpoint, used in limit errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Publisher,
    Subscriber,
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publisher => f.write_str("publisher"),
            Self::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// Errors returned when creating a publisher or subscriber
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Limit exceeded: service supports at most {max} {kind}s")]
    LimitExceeded { kind: EndpointKind, max: usize },

    #[error("Service has been destroyed")]
    ServiceDestroyed,
}

/// Errors returned by `Publisher::loan_uninit`
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoanError {
    #[error("Pool exhausted: all {pool_size} slots are in use")]
    PoolExhausted { pool_size: usize },

    #[error("Connection broken: service has been destroyed")]
    ConnectionBroken,
}

/// Errors returned when sending a sample
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("Connection broken: no subscriber or history can take the sample")]
    ConnectionBroken,
}

/// Errors returned by `Publisher::send_copy`
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    #[error(transparent)]
    Loan(#[from] LoanError),

    #[error(transparent)]
    Send(#[from] SendError),
}

/// Errors returned by `Subscriber::receive`
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveError {
    #[error("Subscriber already holds the maximum of {max} samples")]
    ExceedsMaxBorrows { max: usize },

    #[error("Connection broken: all publishers left with {pending} samples pending")]
    ConnectionBroken { pending: usize },
}

/// Errors returned by `Node::wait`
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NodeWaitError {
    #[error("Interrupted by a termination signal")]
    Interrupted,
}
