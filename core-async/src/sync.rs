//! Synchronization primitives.
//!
//! All primitives are async-aware `tokio::sync` types plus the
//! `CancellationToken` from `tokio-util`. They are `Send + Sync` and can be
//! shared between the encoder task, the dispatcher task and controllers.
//!
//! # Channels used by the pipeline
//!
//! - `mpsc`: bounded frame hand-off and command queues
//! - `oneshot`: encoder completion and per-query replies
//! - `broadcast`: session event fan-out
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{mpsc, CancellationToken};
//!
//! async fn example() {
//!     let (tx, mut rx) = mpsc::channel::<u32>(8);
//!     let stop = CancellationToken::new();
//!
//!     tx.send(1).await.unwrap();
//!     assert_eq!(rx.recv().await, Some(1));
//!
//!     stop.cancel();
//!     assert!(stop.is_cancelled());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
