//! Async I/O traits and utilities.
//!
//! Re-exports tokio's byte stream traits so decoder pipes, in-memory test
//! streams and file writers share one vocabulary.
//!
//! # Examples
//!
//! ```rust
//! use core_async::io::{AsyncRead, AsyncReadExt};
//!
//! async fn read_window<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
//!     let mut window = vec![0u8; 3840];
//!     reader.read_exact(&mut window).await?;
//!     Ok(window)
//! }
//! ```

pub use tokio::io::{
    duplex, empty, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite,
    AsyncWriteExt, BufReader, BufWriter, DuplexStream, ReadBuf,
};
