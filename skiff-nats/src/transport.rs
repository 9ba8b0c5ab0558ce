//! Framed transport shared by the handshake and the connection.
//!
//! `Transport<S>` owns the stream, the read buffer and frame decoder, and the
//! reusable write buffer. It knows nothing about subscriptions: it reads one
//! [`ServerOp`] at a time and writes batches of [`ClientOp`]s.

use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::TcpStream;
use skiff_core::buffer::ReadBuffer;
use skiff_core::error::Result;
use skiff_core::options::ConnectOptions;
use skiff_core::poison::PoisonGuard;
use skiff_core::timeout::{read_with_timeout, write_all_with_timeout};
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::trace;

use crate::codec::{ClientOp, Decoder, Operation, ServerOp};

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Connection not established")
}

pub struct Transport<S = TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Underlying stream - None when disconnected
    stream: Option<S>,

    /// Bytes received but not yet decoded
    recv: ReadBuffer,

    /// Broker frame decoder
    decoder: Decoder<ServerOp>,

    /// Reusable encode buffer, handed to compio and returned after each write
    write_buf: Vec<u8>,

    read_buffer_size: usize,
    /// Payload limit restored on every new stream, until INFO overrides it
    default_max_payload: usize,
    recv_timeout: Option<Duration>,
    send_timeout: Option<Duration>,

    /// Set while a write is in flight; stays set if that write was abandoned
    is_poisoned: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a disconnected transport sized from `options`.
    pub fn new(options: &ConnectOptions) -> Self {
        Self {
            stream: None,
            recv: ReadBuffer::new(),
            decoder: Decoder::new(options.max_control_line)
                .with_max_payload(options.max_payload),
            write_buf: Vec::with_capacity(options.write_buffer_size),
            // A zero-length read would look like EOF.
            read_buffer_size: options.read_buffer_size.max(1),
            default_max_payload: options.max_payload,
            recv_timeout: options.recv_timeout,
            send_timeout: options.send_timeout,
            is_poisoned: false,
        }
    }

    /// Install a freshly opened stream, discarding any state from the old one.
    pub fn attach(&mut self, stream: S) {
        self.reset();
        self.stream = Some(stream);
    }

    /// Drop the stream. Safe to call when already closed.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            trace!("[Transport] Stream closed");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.recv.clear();
        self.decoder.reset();
        self.decoder.set_max_payload(self.default_max_payload);
        self.write_buf.clear();
        self.is_poisoned = false;
    }

    #[inline]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    #[inline]
    pub const fn is_poisoned(&self) -> bool {
        self.is_poisoned
    }

    /// Apply the broker's advertised payload limit to inbound frames.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        trace!("[Transport] Inbound payload limit {} bytes", max_payload);
        self.decoder.set_max_payload(max_payload);
    }

    /// Read raw bytes from the stream into the receive buffer.
    ///
    /// EOF is reported as `UnexpectedEof` and marks the transport
    /// disconnected, as does any read failure other than a timeout.
    async fn read_raw(&mut self) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        let buf = Vec::with_capacity(self.read_buffer_size);
        let BufResult(result, buf) = read_with_timeout(stream, buf, self.recv_timeout).await?;

        let n = match result {
            Ok(0) => {
                trace!("[Transport] Connection closed (EOF)");
                self.stream = None;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Connection closed by broker",
                ));
            }
            Ok(n) => n,
            Err(e) => {
                self.stream = None;
                return Err(e);
            }
        };

        self.recv.push(buf.into());
        Ok(n)
    }

    /// Read the next complete broker frame.
    pub async fn read_op(&mut self) -> Result<ServerOp> {
        loop {
            if let Some(op) = self.decoder.decode(&mut self.recv)? {
                trace!("[Transport] Received {:?}", op);
                return Ok(op);
            }
            self.read_raw().await?;
        }
    }

    /// Encode and write one frame.
    pub async fn send(&mut self, op: &ClientOp) -> Result<()> {
        self.send_batch(std::slice::from_ref(op)).await
    }

    /// Encode `ops` back to back and write them with a single call.
    ///
    /// A write abandoned half-way (future dropped) leaves the transport
    /// poisoned; every later write fails with `BrokenPipe` until a new
    /// stream is attached. A write that completes with an error drops the
    /// stream instead.
    pub async fn send_batch(&mut self, ops: &[ClientOp]) -> Result<()> {
        if self.is_poisoned {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "Connection poisoned by cancelled write - reconnect required",
            )
            .into());
        }

        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        let mut buf = std::mem::take(&mut self.write_buf);
        buf.clear();
        for op in ops {
            trace!("[Transport] Sending {:?}", op);
            op.encode(&mut buf);
        }

        let guard = PoisonGuard::new(&mut self.is_poisoned);
        let BufResult(result, mut buf) = write_all_with_timeout(stream, buf, self.send_timeout).await?;

        guard.disarm();
        buf.clear();
        self.write_buf = buf;

        if let Err(e) = result {
            self.stream = None;
            return Err(e.into());
        }
        Ok(())
    }
}

impl<S> fmt::Debug for Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("connected", &self.is_connected())
            .field("poisoned", &self.is_poisoned)
            .field("buffered_bytes", &self.recv.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compio::buf::{IoBuf, IoBufMut};
    use compio::io::AsyncWriteExt;
    use compio::net::TcpListener;
    use skiff_core::error::SkiffError;

    /// Stream whose writes always fail and whose reads see EOF.
    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        async fn read<B: IoBufMut>(&mut self, buf: B) -> BufResult<usize, B> {
            BufResult(Ok(0), buf)
        }
    }

    impl AsyncWrite for BrokenPipe {
        async fn write<T: IoBuf>(&mut self, buf: T) -> BufResult<usize, T> {
            BufResult(Err(io::ErrorKind::BrokenPipe.into()), buf)
        }

        async fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        async fn shutdown(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[compio::test]
    async fn test_failed_write_disconnects_without_poisoning() {
        let mut transport = Transport::new(&ConnectOptions::default());
        transport.attach(BrokenPipe);

        let err = transport.send(&ClientOp::Ping).await.unwrap_err();
        assert!(matches!(err, SkiffError::Transport(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert!(!transport.is_poisoned());
        assert!(!transport.is_connected());

        let err = transport.send(&ClientOp::Ping).await.unwrap_err();
        assert!(matches!(err, SkiffError::Transport(ref e) if e.kind() == io::ErrorKind::NotConnected));
    }

    #[compio::test]
    async fn test_zero_read_buffer_still_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = futures::join!(TcpStream::connect(addr), listener.accept());
        let (mut server, _) = accepted.unwrap();

        let mut options = ConnectOptions::default();
        options.read_buffer_size = 0;
        let mut transport = Transport::new(&options);
        transport.attach(client.unwrap());

        let BufResult(result, _) = server.write_all(b"PING\r\n".to_vec()).await;
        result.unwrap();
        assert_eq!(transport.read_op().await.unwrap(), ServerOp::Ping);
        assert!(transport.is_connected());
    }

    #[test]
    fn test_reset_restores_configured_payload_limit() {
        let options = ConnectOptions::default().with_max_payload(64);
        let mut transport: Transport<BrokenPipe> = Transport::new(&options);
        assert_eq!(transport.decoder.max_payload(), 64);

        transport.set_max_payload(1 << 20);
        assert_eq!(transport.decoder.max_payload(), 1 << 20);

        transport.attach(BrokenPipe);
        assert_eq!(transport.decoder.max_payload(), 64);
    }
}
