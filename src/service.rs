//! Service - a named, typed publish-subscribe channel in shared memory
//!
//! Every process that opens the same service name with the same payload type
//! shares one segment. The first opener creates and initializes it, everyone
//! else attaches after checking the payload fingerprint and the requested
//! limits. The segment is removed when the last handle in any process is
//! dropped.

use crate::config::ServiceConfig;
use crate::error::{EndpointError, ServiceError};
use crate::name::ServiceName;
use crate::publisher::Publisher;
use crate::relocatable::{Relocatable, TypeDetail};
use crate::segment::{OpenMode, Segment};
use crate::subscriber::Subscriber;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Handle to a publish-subscribe service carrying payloads of type `T`
///
/// ```no_run
/// use venom_pubsub::{Service, ServiceConfig};
///
/// let service = Service::<u64>::open_or_create("My/Funk/ServiceName", &ServiceConfig::new(1, 1))?;
/// let publisher = service.create_publisher()?;
/// let subscriber = service.create_subscriber()?;
///
/// publisher.send_copy(42)?;
/// let sample = subscriber.receive()?.expect("sample was sent");
/// assert_eq!(*sample, 42);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Service<T: Relocatable> {
    segment: Arc<Segment>,
    _payload: PhantomData<T>,
}

impl<T: Relocatable> Service<T> {
    /// Open the service `name`, creating it with `config` if it does not exist
    ///
    /// An existing service must carry the same payload type and at least the
    /// limits requested in `config`.
    pub fn open_or_create(name: &str, config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::acquire(name, config, OpenMode::OpenOrCreate)
    }

    /// Create the service `name`; fails with `AlreadyExists` if it exists
    pub fn create(name: &str, config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::acquire(name, config, OpenMode::Create)
    }

    /// Open the existing service `name`; fails with `DoesNotExist` if it is absent
    pub fn open(name: &str, config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::acquire(name, config, OpenMode::Open)
    }

    fn acquire(name: &str, config: &ServiceConfig, mode: OpenMode) -> Result<Self, ServiceError> {
        let name = ServiceName::new(name)?;
        let segment = Segment::acquire(&name, config, TypeDetail::of::<T>(), mode)?;
        Ok(Self {
            segment: Arc::new(segment),
            _payload: PhantomData,
        })
    }

    pub fn create_publisher(&self) -> Result<Publisher<T>, EndpointError> {
        let registration = self.segment.add_publisher()?;
        Ok(Publisher::new(Arc::clone(&self.segment), registration))
    }

    pub fn create_subscriber(&self) -> Result<Subscriber<T>, EndpointError> {
        let port = self.segment.add_subscriber()?;
        Ok(Subscriber::new(Arc::clone(&self.segment), port))
    }

    pub fn name(&self) -> &ServiceName {
        self.segment.name()
    }

    /// Configuration the service was created with
    pub fn config(&self) -> &ServiceConfig {
        self.segment.config()
    }

    pub fn pool_size(&self) -> usize {
        self.segment.pool_size()
    }

    pub fn type_detail(&self) -> &TypeDetail {
        self.segment.payload()
    }

    /// Publishers attached across all processes
    pub fn number_of_publishers(&self) -> usize {
        self.segment.publisher_count()
    }

    /// Subscribers attached across all processes
    pub fn number_of_subscribers(&self) -> usize {
        self.segment.subscriber_count()
    }
}

impl<T: Relocatable> fmt::Debug for Service<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", self.segment.name())
            .field("payload", &self.segment.payload().type_name)
            .field("config", self.segment.config())
            .finish()
    }
}
