//! Sliding-window rate limiting and window state management.

mod limiter;
mod timestamp;
mod window;

pub use limiter::{RateLimiter, WindowState};
pub use timestamp::{normalize, TimestampInput};
pub use window::{Snapshot, TimeUnit, Window};
