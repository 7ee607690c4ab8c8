//! Service names
//!
//! Service names are free-form UTF-8 (`"My/Funk/ServiceName"` is fine). POSIX
//! shared memory names may not contain `/`, so a segment is keyed by a hash of
//! the service name; the full name is stored inside the segment to detect
//! hash collisions.

use crate::error::ServiceNameError;
use crate::relocatable::fnv1a_64;
use std::fmt;

/// Maximum service name length in bytes
pub const MAX_SERVICE_NAME_LEN: usize = 255;

/// A validated service name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: &str) -> Result<Self, ServiceNameError> {
        if name.is_empty() {
            return Err(ServiceNameError::Empty);
        }
        if name.len() > MAX_SERVICE_NAME_LEN {
            return Err(ServiceNameError::TooLong {
                max: MAX_SERVICE_NAME_LEN,
                got: name.len(),
            });
        }
        if name.as_bytes().contains(&0) {
            return Err(ServiceNameError::ContainsNul);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the shared memory segment backing this service
    pub(crate) fn segment_name(&self) -> String {
        format!("ps_{:016x}", fnv1a_64(self.0.as_bytes()))
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ServiceName {
    type Error = ServiceNameError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(ServiceName::new("My/Funk/ServiceName").is_ok());
        assert_eq!(ServiceName::new(""), Err(ServiceNameError::Empty));
        assert_eq!(ServiceName::new("a\0b"), Err(ServiceNameError::ContainsNul));
        assert_eq!(
            ServiceName::new(&"n".repeat(256)),
            Err(ServiceNameError::TooLong { max: 255, got: 256 })
        );
    }

    #[test]
    fn test_segment_name_is_shm_safe() {
        let name = ServiceName::new("svc/test").unwrap();
        let segment = name.segment_name();
        assert!(!segment.contains('/'));
        assert_eq!(segment.len(), 3 + 16);
        assert_eq!(segment, ServiceName::new("svc/test").unwrap().segment_name());
        assert_ne!(segment, ServiceName::new("svc/test2").unwrap().segment_name());
    }
}
