//! NATS connection: the protocol session.
//!
//! A `Connection` owns the transport and the subscription registry. All
//! operations take `&mut self`, so one task drives a connection at a time:
//! `subscribe`, `publish` and `unsubscribe` cannot run while `wait` is
//! reading. To share a connection across tasks, confine it to one task and
//! send it work over a channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use skiff_core::options::ConnectOptions;
//! use skiff_core::subscription::Flow;
//! use skiff_nats::{Connection, WaitOptions};
//!
//! # async fn example() -> skiff_core::error::Result<()> {
//! let mut conn = Connection::new(ConnectOptions::default());
//! conn.connect().await?;
//!
//! conn.subscribe("greetings.*", |msg: &skiff_core::message::Message| {
//!     println!("{}: {:?}", msg.subject, msg.payload);
//!     Flow::Continue
//! })
//! .await?;
//! conn.publish("greetings.world", "hello").await?;
//!
//! let outcome = conn.wait(WaitOptions::new().with_count(1)).await?;
//! assert_eq!(outcome.delivered, 1);
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::TcpStream;
use skiff_core::error::{ProtocolError, Result, SkiffError};
use skiff_core::message::Message;
use skiff_core::options::ConnectOptions;
use skiff_core::subscription::{Flow, MessageHandler, Subscription, SubscriptionRegistry};
use skiff_core::tcp::tune_stream;
use skiff_core::timeout::with_timeout;
use skiff_core::timer;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::codec::{ClientOp, ServerOp};
use crate::handshake::perform_handshake;
use crate::info::ServerInfo;
use crate::transport::Transport;

/// Stop conditions for [`Connection::wait`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Stop after this many delivered messages (0 = no limit)
    pub count: usize,
    /// Stop once this much time has passed since `wait` started
    pub duration: Option<Duration>,
}

impl WaitOptions {
    /// Wait until a handler stops the loop or an error occurs.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Why [`Connection::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A handler returned `Flow::Stop`
    Handler,
    /// The message count budget was used up
    Count,
    /// The duration budget elapsed
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Messages handed to a handler
    pub delivered: usize,
    pub reason: StopReason,
}

/// A client connection to one NATS broker.
pub struct Connection<S = TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport: Transport<S>,
    options: ConnectOptions,
    subscriptions: SubscriptionRegistry,
    server_info: Option<ServerInfo>,
    /// Messages that arrived while `ping` was waiting for its PONG
    pending: VecDeque<Message>,
}

impl Connection<TcpStream> {
    /// Create a disconnected connection. Call [`connect`](Self::connect) next.
    pub fn new(options: ConnectOptions) -> Self {
        Self::disconnected(options)
    }

    /// Open the TCP connection and complete the handshake.
    ///
    /// An already open transport is closed first. Registered subscriptions
    /// are re-issued afterwards when `options.resubscribe` is set.
    ///
    /// # Errors
    ///
    /// `Transport` if the socket cannot connect; `Protocol`, `Broker` or
    /// `HandshakeTimeout` if the handshake fails. Nothing is retried.
    pub async fn connect(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            self.close();
        }

        let addr = self.options.url.authority();
        debug!("[Connection] Connecting to {}", self.options.url);

        let stream = with_timeout(
            self.options.connect_timeout,
            "connect",
            TcpStream::connect(addr.as_str()),
        )
        .await??;
        tune_stream(&stream, &self.options)?;

        self.transport.attach(stream);
        self.establish().await
    }

    /// Close the current transport and connect again.
    pub async fn reconnect(&mut self) -> Result<()> {
        debug!("[Connection] Reconnecting to {}", self.options.url);
        self.close();
        self.connect().await
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn disconnected(options: ConnectOptions) -> Self {
        Self {
            transport: Transport::new(&options),
            options,
            subscriptions: SubscriptionRegistry::new(),
            server_info: None,
            pending: VecDeque::new(),
        }
    }

    /// Run the handshake over an already open stream.
    pub async fn from_stream(stream: S, options: ConnectOptions) -> Result<Self> {
        let mut conn = Self::disconnected(options);
        conn.transport.attach(stream);
        conn.establish().await?;
        Ok(conn)
    }

    async fn establish(&mut self) -> Result<()> {
        let info = match perform_handshake(&mut self.transport, &self.options).await {
            Ok(info) => info,
            Err(e) => {
                self.transport.close();
                return Err(e);
            }
        };
        if let Some(max) = info.max_payload {
            self.transport.set_max_payload(max);
        }
        self.server_info = Some(info);

        if self.options.resubscribe && !self.subscriptions.is_empty() {
            let ops: Vec<_> = self
                .subscriptions
                .subscriptions()
                .iter()
                .map(sub_op)
                .collect();
            debug!("[Connection] Restoring {} subscriptions", ops.len());
            self.transport.send_batch(&ops).await?;
        }
        Ok(())
    }

    #[inline]
    pub const fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// True after a write was abandoned mid-frame; reconnect to recover.
    #[inline]
    pub const fn is_poisoned(&self) -> bool {
        self.transport.is_poisoned()
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Broker description from the last handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Express interest in `subject`; matching messages go to `handler`.
    ///
    /// The subject may contain broker wildcards (`*`, `>`); it is not
    /// validated locally.
    pub async fn subscribe<H>(&mut self, subject: &str, handler: H) -> Result<Subscription>
    where
        H: MessageHandler + 'static,
    {
        self.register(subject, None, Box::new(handler)).await
    }

    /// Subscribe as a member of queue group `queue`; the broker delivers
    /// each message to one member of the group.
    pub async fn queue_subscribe<H>(
        &mut self,
        subject: &str,
        queue: &str,
        handler: H,
    ) -> Result<Subscription>
    where
        H: MessageHandler + 'static,
    {
        self.register(subject, Some(queue.to_string()), Box::new(handler))
            .await
    }

    async fn register(
        &mut self,
        subject: &str,
        queue: Option<String>,
        handler: Box<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let sub = self.subscriptions.register(subject, queue, handler);
        if let Err(e) = self.transport.send(&sub_op(&sub)).await {
            self.subscriptions.remove(sub.sid()).ok();
            return Err(e);
        }
        debug!("[Connection] Subscribed sid={} subject={}", sub.sid(), sub.subject());
        Ok(sub)
    }

    /// Remove interest in a subscription.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if the sid is not registered; nothing is sent.
    pub async fn unsubscribe(&mut self, sub: &Subscription) -> Result<()> {
        let sid = sub.sid();
        if !self.subscriptions.contains(sid) {
            return Err(SkiffError::NotSubscribed(sid));
        }
        self.transport
            .send(&ClientOp::Unsub {
                sid,
                max_msgs: None,
            })
            .await?;
        self.subscriptions.remove(sid)?;
        debug!("[Connection] Unsubscribed sid={}", sid);
        Ok(())
    }

    /// Publish `payload` to `subject`. Fire-and-forget.
    pub async fn publish(&mut self, subject: &str, payload: impl Into<Bytes>) -> Result<()> {
        self.publish_op(subject, None, payload.into()).await
    }

    /// Publish with a reply subject for responders to answer on.
    pub async fn publish_with_reply(
        &mut self,
        subject: &str,
        reply: &str,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.publish_op(subject, Some(reply.to_string()), payload.into())
            .await
    }

    async fn publish_op(
        &mut self,
        subject: &str,
        reply: Option<String>,
        payload: Bytes,
    ) -> Result<()> {
        if let Some(max) = self.server_info.as_ref().and_then(|i| i.max_payload) {
            if payload.len() > max {
                return Err(SkiffError::PayloadTooLarge {
                    size: payload.len(),
                    max,
                });
            }
        }
        self.transport
            .send(&ClientOp::Pub {
                subject: subject.to_string(),
                reply,
                payload,
            })
            .await
    }

    /// Send `PING` and wait for the broker's `PONG`.
    ///
    /// Broker PINGs received meanwhile are answered and messages are queued
    /// for the next [`next_message`](Self::next_message) or
    /// [`wait`](Self::wait).
    pub async fn ping(&mut self) -> Result<()> {
        self.transport.send(&ClientOp::Ping).await?;
        loop {
            match self.transport.read_op().await? {
                ServerOp::Pong => return Ok(()),
                ServerOp::Ping => self.transport.send(&ClientOp::Pong).await?,
                ServerOp::Ok => {}
                ServerOp::Msg(msg) => self.pending.push_back(msg),
                ServerOp::Err(reason) => return Err(SkiffError::Broker(reason)),
                other => return Err(ProtocolError::unexpected(other.verb().name()).into()),
            }
        }
    }

    /// Read until the next delivered message, answering broker PINGs and
    /// skipping `+OK` acks on the way.
    pub async fn next_message(&mut self) -> Result<Message> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(msg);
        }
        loop {
            match self.transport.read_op().await? {
                ServerOp::Msg(msg) => return Ok(msg),
                ServerOp::Ping => {
                    trace!("[Connection] Answering broker PING");
                    self.transport.send(&ClientOp::Pong).await?;
                }
                ServerOp::Ok => {}
                ServerOp::Err(reason) => return Err(SkiffError::Broker(reason)),
                other => return Err(ProtocolError::unexpected(other.verb().name()).into()),
            }
        }
    }

    /// Receive loop: deliver messages to their subscription handlers until
    /// a handler stops, `count` messages were delivered, or `duration` has
    /// elapsed since the loop started.
    ///
    /// Messages for sids that are no longer registered are dropped and do
    /// not count toward `count`.
    pub async fn wait(&mut self, opts: WaitOptions) -> Result<WaitOutcome> {
        let deadline = opts.duration.map(|d| Instant::now() + d);
        let mut delivered = 0;

        let reason = loop {
            let msg = match deadline {
                None => self.next_message().await?,
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        break StopReason::Duration;
                    }
                    match timer::timeout_at(deadline, self.next_message()).await {
                        Ok(msg) => msg?,
                        Err(_) => break StopReason::Duration,
                    }
                }
            };

            let Some(flow) = self.subscriptions.dispatch(&msg) else {
                debug!("[Connection] Dropping message for unknown sid={}", msg.sid);
                continue;
            };
            delivered += 1;

            if flow == Flow::Stop {
                break StopReason::Handler;
            }
            if opts.count > 0 && delivered >= opts.count {
                break StopReason::Count;
            }
        };

        trace!("[Connection] wait finished: {:?} after {} messages", reason, delivered);
        Ok(WaitOutcome { delivered, reason })
    }

    /// Release the transport. Safe to call when already closed.
    ///
    /// The subscription registry is kept so a later `connect` can restore it.
    pub fn close(&mut self) {
        if self.transport.is_connected() {
            debug!("[Connection] Closing connection to {}", self.options.url);
        }
        self.transport.close();
        self.pending.clear();
        self.server_info = None;
    }
}

fn sub_op(sub: &Subscription) -> ClientOp {
    ClientOp::Sub {
        subject: sub.subject().to_string(),
        queue: sub.queue().map(str::to_string),
        sid: sub.sid(),
    }
}

impl<S> fmt::Debug for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.options.url)
            .field("transport", &self.transport)
            .field("subscriptions", &self.subscriptions.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
