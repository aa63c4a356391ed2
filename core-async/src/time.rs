//! Time-related abstractions.
//!
//! Re-exports `tokio::time` for timers integrated with the runtime's timer
//! wheel and `std::time` for durations and monotonic instants.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(2)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(2));
//! }
//! ```

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Error returned by [`timeout`] when the deadline elapses first.
pub use tokio::time::error::Elapsed;
