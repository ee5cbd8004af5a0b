//! Bucketgate - Persistable Sliding-Window Rate Limiting
//!
//! This crate implements a named rate limiter that tracks recent activity in
//! fixed-width tumbling time buckets and admits a cost only while the window
//! aggregate stays within a configured ceiling. Window state is synchronized
//! through a pluggable [`store::Store`].

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use config::{LimiterConfig, LimitersFile, WindowConfig};
pub use error::{BucketgateError, Result, ValidationError};
pub use ratelimit::{RateLimiter, Snapshot, TimeUnit, Window};
pub use store::{MemoryStore, NullStore, Store, StoreError};
