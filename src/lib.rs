//! VenomPubSub - zero-copy publish-subscribe over POSIX shared memory
//!
//! Processes exchange fixed-size payloads through a pool of slots in a named
//! shared memory segment. A publisher loans a slot, writes the payload in
//! place and sends the slot index; subscribers read the very same bytes. No
//! payload is ever copied or serialized.
//!
//! # Architecture
//!
//! - **Service**: named segment holding the slot pool, one queue per
//!   subscriber and an optional history, reference counted across processes
//! - **Publisher**: loans slots (`loan_uninit`, `loan`) and sends them
//! - **Subscriber**: receives slots in send order, releases them on drop
//! - **Relocatable containers**: `StaticVector` and `StaticString` store their
//!   elements inline so payloads stay valid at any mapping address
//!
//! # Example
//!
//! ```no_run
//! use venom_pubsub::{relocatable, Service, ServiceConfig, StaticString};
//!
//! relocatable! {
//!     #[derive(Debug, Default)]
//!     struct Status {
//!         counter: u64,
//!         label: StaticString<32>,
//!     }
//! }
//!
//! let service = Service::<Status>::open_or_create("status", &ServiceConfig::new(1, 4))?;
//! let publisher = service.create_publisher()?;
//!
//! let mut sample = publisher.loan()?;
//! sample.counter = 1;
//! sample.label.push_str("booting")?;
//! sample.send()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bounded_buffer;
pub mod config;
pub mod error;
pub mod name;
pub mod node;
pub mod publisher;
pub mod relocatable;
pub mod sample;
mod segment;
pub mod service;
pub mod shm;
pub mod static_string;
pub mod static_vector;
pub mod subscriber;

pub use bounded_buffer::BoundedBuffer;
pub use config::ServiceConfig;
pub use error::{
    ContainerError, EndpointError, EndpointKind, IncompatibilityReason, LoanError,
    NodeWaitError, PublishError, ReceiveError, Result, SendError, ServiceError,
    ServiceNameError, VenomError,
};
pub use name::ServiceName;
pub use node::{Node, NodeEvent, ShutdownHandle};
pub use publisher::{Publisher, PublisherId};
pub use relocatable::{Relocatable, TypeDetail};
pub use sample::{Init, Sample, SampleHeader, SampleMut, Uninit};
pub use service::Service;
pub use static_string::StaticString;
pub use static_vector::StaticVector;
pub use subscriber::Subscriber;
