//! Timeout utilities for I/O operations
//!
//! Wraps compio's ownership-passing read/write calls with an optional limit
//! enforced by [`crate::timer`].
//! A limit of `None` blocks indefinitely, `Some(Duration::ZERO)` refuses to
//! wait at all.

use compio::buf::{BufResult, IoBuf, IoBufMut};
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use std::future::Future;
use std::io;
use std::time::Duration;

use crate::timer::timeout;

/// Run `fut` under an optional time limit.
///
/// # Errors
///
/// * `io::ErrorKind::TimedOut` if the limit elapsed
/// * `io::ErrorKind::WouldBlock` if the limit is zero
pub async fn with_timeout<F, T>(duration: Option<Duration>, what: &str, fut: F) -> io::Result<T>
where
    F: Future<Output = T>,
{
    match duration {
        None => Ok(fut.await),
        Some(d) if d.is_zero() => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("{what} would block"),
        )),
        Some(d) => timeout(d, fut).await.map_err(|_elapsed| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{what} timed out after {d:?}"),
            )
        }),
    }
}

/// Read once into `buf` under an optional time limit.
pub async fn read_with_timeout<S, B>(
    stream: &mut S,
    buf: B,
    duration: Option<Duration>,
) -> io::Result<BufResult<usize, B>>
where
    S: AsyncRead + Unpin,
    B: IoBufMut,
{
    with_timeout(duration, "read", stream.read(buf)).await
}

/// Write the entire buffer under an optional time limit.
pub async fn write_all_with_timeout<S, B>(
    stream: &mut S,
    buf: B,
    duration: Option<Duration>,
) -> io::Result<BufResult<(), B>>
where
    S: AsyncWrite + Unpin,
    B: IoBuf,
{
    with_timeout(duration, "write", stream.write_all(buf)).await
}
