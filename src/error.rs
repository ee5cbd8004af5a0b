//! Error types for bucketgate.

use thiserror::Error;

use crate::store::StoreError;

/// A malformed argument, configuration value or snapshot.
///
/// These are raised immediately and are never coerced into defaults.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("limiter name must not be empty")]
    EmptyName,

    #[error("max must be a positive number, got {0}")]
    InvalidMax(f64),

    #[error("store is required")]
    MissingStore,

    #[error("window configuration is required")]
    MissingWindow,

    #[error("window size must be a positive integer")]
    InvalidSize,

    #[error("window width must be a positive integer")]
    InvalidWidth,

    #[error("unit must be one of 'second', 'minute', 'hour', 'day', 'week', 'month', 'year', got '{0}'")]
    InvalidUnit(String),

    #[error("value must be a number")]
    NotANumber,

    #[error("value must be a positive number, got {0}")]
    NegativeValue(f64),

    #[error("cost must be greater than zero, got {0}")]
    NonPositiveCost(f64),

    #[error("timestamp must be valid DateTime, SystemTime or ISO string, got '{0}'")]
    InvalidTimestamp(String),

    #[error("updated must be an ISO-8601 timestamp, got '{0}'")]
    InvalidUpdated(String),

    #[error("bucket {index} must be a non-negative number, got {value}")]
    InvalidBucket { index: usize, value: f64 },

    #[error("snapshot must contain at least one bucket")]
    EmptyBuckets,
}

/// Main error type for bucketgate operations.
#[derive(Error, Debug)]
pub enum BucketgateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load rate-limit window {name}")]
    Load {
        name: String,
        #[source]
        source: Box<BucketgateError>,
    },

    #[error("failed to update rate-limit window {name}")]
    Update {
        name: String,
        #[source]
        source: Box<BucketgateError>,
    },
}

impl BucketgateError {
    pub(crate) fn load(name: &str, source: impl Into<BucketgateError>) -> Self {
        BucketgateError::Load {
            name: name.to_string(),
            source: Box::new(source.into()),
        }
    }

    pub(crate) fn update(name: &str, source: impl Into<BucketgateError>) -> Self {
        BucketgateError::Update {
            name: name.to_string(),
            source: Box::new(source.into()),
        }
    }

    /// The innermost cause, unwrapping `Load` and `Update` context.
    pub fn root(&self) -> &BucketgateError {
        match self {
            BucketgateError::Load { source, .. } | BucketgateError::Update { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// The validation failure at the root of this error, if there is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self.root() {
            BucketgateError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for bucketgate operations.
pub type Result<T> = std::result::Result<T, BucketgateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_context_keeps_cause() {
        let err = BucketgateError::update(
            "login",
            StoreError::Unavailable("connection refused".to_string()),
        );

        assert_eq!(err.to_string(), "failed to update rate-limit window login");
        let source = err.source().expect("cause should be preserved");
        assert!(source.to_string().contains("connection refused"));
        assert!(matches!(err.root(), BucketgateError::Store(_)));
    }

    #[test]
    fn test_as_validation_through_context() {
        let err = BucketgateError::load("", ValidationError::EmptyName);
        assert_eq!(err.as_validation(), Some(&ValidationError::EmptyName));

        let err = BucketgateError::load("x", StoreError::Unavailable("down".to_string()));
        assert_eq!(err.as_validation(), None);
    }
}
