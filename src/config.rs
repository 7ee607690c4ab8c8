//! Service configuration
//!
//! All limits are fixed when the service is created. Later openers may ask for
//! less than the creator configured, never for more.

use crate::error::{IncompatibilityReason, ServiceError};

const DEFAULT_SUBSCRIBER_BUFFER_SIZE: usize = 2;
const DEFAULT_SUBSCRIBER_BORROWED_SAMPLES: usize = 2;
const DEFAULT_LOANED_SAMPLES: usize = 2;

/// Upper bound for every individual limit, keeps slot indices in a `u32`
pub const MAX_LIMIT: usize = 1 << 16;

/// Publish-subscribe service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Maximum number of concurrently attached publishers
    pub max_publishers: usize,
    /// Maximum number of concurrently attached subscribers
    pub max_subscribers: usize,
    /// Number of most recent samples delivered to late subscribers
    pub history_size: usize,
    /// Depth of each subscriber's delivery queue
    pub subscriber_max_buffer_size: usize,
    /// Samples a subscriber may hold at the same time
    pub subscriber_max_borrowed_samples: usize,
    /// Slots reserved per publisher for in-progress loans
    pub max_loaned_samples: usize,
}

impl ServiceConfig {
    pub fn new(max_publishers: usize, max_subscribers: usize) -> Self {
        Self {
            max_publishers,
            max_subscribers,
            history_size: 0,
            subscriber_max_buffer_size: DEFAULT_SUBSCRIBER_BUFFER_SIZE,
            subscriber_max_borrowed_samples: DEFAULT_SUBSCRIBER_BORROWED_SAMPLES,
            max_loaned_samples: DEFAULT_LOANED_SAMPLES,
        }
    }

    pub fn with_history_size(mut self, value: usize) -> Self {
        self.history_size = value;
        self
    }

    pub fn with_subscriber_max_buffer_size(mut self, value: usize) -> Self {
        self.subscriber_max_buffer_size = value;
        self
    }

    pub fn with_subscriber_max_borrowed_samples(mut self, value: usize) -> Self {
        self.subscriber_max_borrowed_samples = value;
        self
    }

    pub fn with_max_loaned_samples(mut self, value: usize) -> Self {
        self.max_loaned_samples = value;
        self
    }

    /// Number of payload slots in the shared pool
    ///
    /// Enough for every subscriber to have a full queue and all borrows
    /// outstanding, the history to be full, and every publisher to hold its
    /// loans at the same time.
    pub fn pool_size(&self) -> usize {
        self.max_subscribers * (self.subscriber_max_buffer_size + self.subscriber_max_borrowed_samples)
            + self.history_size
            + self.max_publishers * self.max_loaned_samples
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.max_publishers == 0 {
            return Err(ServiceError::InvalidConfig("max_publishers must be at least 1"));
        }
        if self.max_subscribers == 0 {
            return Err(ServiceError::InvalidConfig("max_subscribers must be at least 1"));
        }
        if self.subscriber_max_buffer_size == 0 {
            return Err(ServiceError::InvalidConfig(
                "subscriber_max_buffer_size must be at least 1",
            ));
        }
        if self.subscriber_max_borrowed_samples == 0 {
            return Err(ServiceError::InvalidConfig(
                "subscriber_max_borrowed_samples must be at least 1",
            ));
        }
        if self.max_loaned_samples == 0 {
            return Err(ServiceError::InvalidConfig("max_loaned_samples must be at least 1"));
        }
        if self.history_size > self.subscriber_max_buffer_size {
            return Err(ServiceError::InvalidConfig(
                "history_size must not exceed subscriber_max_buffer_size",
            ));
        }
        let limits = [
            self.max_publishers,
            self.max_subscribers,
            self.history_size,
            self.subscriber_max_buffer_size,
            self.subscriber_max_borrowed_samples,
            self.max_loaned_samples,
        ];
        if limits.iter().any(|&l| l > MAX_LIMIT) {
            return Err(ServiceError::InvalidConfig("limit larger than 65536"));
        }
        if self.pool_size() > u32::MAX as usize {
            return Err(ServiceError::InvalidConfig("payload pool too large"));
        }
        Ok(())
    }

    /// Check whether an opener requesting `self` can use a service created with `existing`
    pub(crate) fn check_compatible(&self, existing: &ServiceConfig) -> Result<(), IncompatibilityReason> {
        if self.max_publishers > existing.max_publishers {
            return Err(IncompatibilityReason::MaxPublishers {
                requested: self.max_publishers,
                available: existing.max_publishers,
            });
        }
        if self.max_subscribers > existing.max_subscribers {
            return Err(IncompatibilityReason::MaxSubscribers {
                requested: self.max_subscribers,
                available: existing.max_subscribers,
            });
        }
        if self.history_size > existing.history_size {
            return Err(IncompatibilityReason::HistorySize {
                requested: self.history_size,
                available: existing.history_size,
            });
        }
        if self.subscriber_max_buffer_size > existing.subscriber_max_buffer_size {
            return Err(IncompatibilityReason::SubscriberBufferSize {
                requested: self.subscriber_max_buffer_size,
                available: existing.subscriber_max_buffer_size,
            });
        }
        if self.subscriber_max_borrowed_samples > existing.subscriber_max_borrowed_samples {
            return Err(IncompatibilityReason::SubscriberBorrowedSamples {
                requested: self.subscriber_max_borrowed_samples,
                available: existing.subscriber_max_borrowed_samples,
            });
        }
        if self.max_loaned_samples > existing.max_loaned_samples {
            return Err(IncompatibilityReason::MaxLoanedSamples {
                requested: self.max_loaned_samples,
                available: existing.max_loaned_samples,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size() {
        let config = ServiceConfig::new(1, 1)
            .with_subscriber_max_buffer_size(8)
            .with_subscriber_max_borrowed_samples(4)
            .with_max_loaned_samples(4);
        assert_eq!(config.pool_size(), 16);

        let config = ServiceConfig::new(2, 3).with_history_size(1);
        assert_eq!(config.pool_size(), 3 * (2 + 2) + 1 + 2 * 2);
    }

    #[test]
    fn test_validate() {
        assert!(ServiceConfig::new(1, 1).validate().is_ok());
        assert!(ServiceConfig::new(0, 1).validate().is_err());
        assert!(ServiceConfig::new(1, 0).validate().is_err());
        assert!(ServiceConfig::new(1, 1).with_history_size(3).validate().is_err());
        assert!(ServiceConfig::new(1, MAX_LIMIT + 1).validate().is_err());
    }

    #[test]
    fn test_opener_may_request_less() {
        let existing = ServiceConfig::new(4, 4).with_history_size(2);

        assert!(ServiceConfig::new(2, 4).check_compatible(&existing).is_ok());
        assert_eq!(
            ServiceConfig::new(5, 4).check_compatible(&existing),
            Err(IncompatibilityReason::MaxPublishers {
                requested: 5,
                available: 4
            })
        );
        assert_eq!(
            ServiceConfig::new(1, 1)
                .with_history_size(2)
                .with_subscriber_max_buffer_size(3)
                .check_compatible(&existing),
            Err(IncompatibilityReason::SubscriberBufferSize {
                requested: 3,
                available: 2
            })
        );
        assert_eq!(
            ServiceConfig::new(1, 1)
                .with_max_loaned_samples(3)
                .check_compatible(&existing),
            Err(IncompatibilityReason::MaxLoanedSamples {
                requested: 3,
                available: 2
            })
        );
    }
}
