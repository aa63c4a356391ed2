//! Runtime abstraction layer for the relay pipeline.
//!
//! All core-* crates depend on this crate instead of naming tokio directly
//! for spawning, timers, channels, byte streams and child processes. Keeping
//! the executor behind one facade means a runtime swap touches a single crate.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Sleep, timeout and instants
//! - `sync`: Channels, locks and cancellation
//! - `io`: Async byte stream traits
//! - `process`: Child process spawning
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(5)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod io;
pub mod process;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};

/// Waits on several futures and runs the branch of the first to complete.
pub use tokio::select;
