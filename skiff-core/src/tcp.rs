//! TCP socket tuning.
//!
//! # Safety
//!
//! compio's `TcpStream` does not expose socket options, so the raw
//! descriptor is borrowed through `socket2` and released again without
//! closing it.

#![allow(unsafe_code)]

use std::io;
use tracing::trace;

use crate::options::ConnectOptions;

/// Apply the socket-level options from `options` to a freshly connected stream.
///
/// Currently this sets `TCP_NODELAY` (small control lines like `PING` and
/// `SUB` should not wait for Nagle's algorithm) and enables keepalive.
///
/// # Errors
///
/// Returns an error if a socket option cannot be set.
pub fn tune_stream(stream: &compio::net::TcpStream, options: &ConnectOptions) -> io::Result<()> {
    with_socket(stream, |sock| {
        sock.set_nodelay(options.tcp_nodelay)?;
        sock.set_keepalive(true)
    })?;
    trace!("[TCP] nodelay={} keepalive=on", options.tcp_nodelay);
    Ok(())
}

fn with_socket<F>(stream: &compio::net::TcpStream, f: F) -> io::Result<()>
where
    F: FnOnce(&socket2::Socket) -> io::Result<()>,
{
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let sock = unsafe { socket2::Socket::from_raw_fd(stream.as_raw_fd()) };
        let result = f(&sock);
        std::mem::forget(sock); // the stream still owns the fd
        result
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let sock = unsafe { socket2::Socket::from_raw_socket(stream.as_raw_socket()) };
        let result = f(&sock);
        std::mem::forget(sock); // the stream still owns the socket
        result
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (stream, f);
        Ok(())
    }
}
