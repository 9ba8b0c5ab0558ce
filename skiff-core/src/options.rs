//! Connection configuration options
//!
//! This module provides the options a client presents to the broker in its
//! CONNECT handshake, plus the local transport tuning knobs (timeouts,
//! buffer sizes, reconnect behaviour).

use std::time::Duration;

use crate::endpoint::ServerUrl;
use crate::error::SkiffError;

/// Default read buffer size (8KB)
pub const DEFAULT_READ_BUF_SIZE: usize = 8192;

/// Default write buffer size (8KB)
pub const DEFAULT_WRITE_BUF_SIZE: usize = 8192;

/// Default limit for a single control line (4KB, same as the broker's default)
pub const DEFAULT_MAX_CONTROL_LINE: usize = 4096;

/// Default payload limit (1MB, the broker's default) until INFO says otherwise
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Connection options.
///
/// # Examples
///
/// ```
/// use skiff_core::options::ConnectOptions;
/// use std::time::Duration;
///
/// let opts = ConnectOptions::new()
///     .with_url("nats://127.0.0.1:4222")
///     .unwrap()
///     .with_name("billing-worker")
///     .with_verbose(true)
///     .with_connect_timeout(Duration::from_secs(2));
///
/// assert_eq!(opts.name.as_deref(), Some("billing-worker"));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Broker address, with optional `user:pass@` credentials
    pub url: ServerUrl,

    /// Client name reported to the broker
    pub name: Option<String>,

    /// Ask the broker for TLS (negotiation itself is not performed)
    pub ssl_required: bool,

    /// Broker acknowledges each command with `+OK`
    pub verbose: bool,

    /// Broker performs strict subject and protocol checks
    pub pedantic: bool,

    /// Maximum time to wait for the TCP connection.
    /// - `None`: use the OS default (default)
    pub connect_timeout: Option<Duration>,

    /// Maximum time to complete the CONNECT/INFO exchange.
    /// - Default: 10 seconds
    /// - `Duration::ZERO` disables the limit
    pub handshake_timeout: Duration,

    /// Receive timeout applied to each transport read.
    /// - `None`: block until data arrives (default)
    pub recv_timeout: Option<Duration>,

    /// Send timeout applied to each transport write.
    /// - `None`: block until written (default)
    pub send_timeout: Option<Duration>,

    /// Size of each read from the transport (at least 1)
    pub read_buffer_size: usize,

    /// Initial capacity of the frame encoding buffer
    pub write_buffer_size: usize,

    /// Longest control line accepted before the stream is declared malformed
    pub max_control_line: usize,

    /// Largest inbound payload accepted when the broker's INFO does not
    /// advertise `max_payload`
    pub max_payload: usize,

    /// Disable Nagle's algorithm on the TCP socket (default: true)
    pub tcp_nodelay: bool,

    /// Re-issue SUB for registered subscriptions after `reconnect` (default: true)
    pub resubscribe: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: ServerUrl::default(),
            name: None,
            ssl_required: false,
            verbose: false,
            pedantic: false,
            connect_timeout: None,
            handshake_timeout: Duration::from_secs(10),
            recv_timeout: None,
            send_timeout: None,
            read_buffer_size: DEFAULT_READ_BUF_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUF_SIZE,
            max_control_line: DEFAULT_MAX_CONTROL_LINE,
            max_payload: DEFAULT_MAX_PAYLOAD,
            tcp_nodelay: true,
            resubscribe: true,
        }
    }
}

impl ConnectOptions {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the URL cannot be parsed.
    pub fn with_url(mut self, url: &str) -> Result<Self, SkiffError> {
        self.url = ServerUrl::parse(url)?;
        Ok(self)
    }

    /// Set the client name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the `ssl_required` handshake flag.
    pub fn with_ssl_required(mut self, required: bool) -> Self {
        self.ssl_required = required;
        self
    }

    /// Enable or disable verbose (`+OK`) mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Enable or disable pedantic mode.
    pub fn with_pedantic(mut self, pedantic: bool) -> Self {
        self.pedantic = pedantic;
        self
    }

    /// Set TCP connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set receive timeout.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set read buffer size. Zero is raised to one byte.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set write buffer size.
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set the control line limit.
    pub fn with_max_control_line(mut self, len: usize) -> Self {
        self.max_control_line = len;
        self
    }

    /// Set the inbound payload limit used until the broker advertises one.
    pub fn with_max_payload(mut self, len: usize) -> Self {
        self.max_payload = len;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Choose whether `reconnect` restores subscriptions.
    pub fn with_resubscribe(mut self, resubscribe: bool) -> Self {
        self.resubscribe = resubscribe;
        self
    }

    /// Handshake limit, or `None` when disabled.
    #[must_use]
    pub fn handshake_limit(&self) -> Option<Duration> {
        Some(self.handshake_timeout).filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.url.to_string(), "nats://localhost:4222");
        assert_eq!(opts.name, None);
        assert!(!opts.verbose);
        assert!(!opts.pedantic);
        assert!(!opts.ssl_required);
        assert_eq!(opts.recv_timeout, None);
        assert!(opts.resubscribe);
        assert_eq!(opts.max_payload, DEFAULT_MAX_PAYLOAD);
        assert_eq!(opts.handshake_limit(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_read_buffer_is_raised() {
        let opts = ConnectOptions::new().with_read_buffer_size(0);
        assert_eq!(opts.read_buffer_size, 1);
    }

    #[test]
    fn test_builder_chain() {
        let opts = ConnectOptions::new()
            .with_url("nats://me:pw@10.0.0.5:5000")
            .unwrap()
            .with_pedantic(true)
            .with_ssl_required(true)
            .with_read_buffer_size(4096)
            .with_max_payload(512)
            .with_handshake_timeout(Duration::ZERO);

        assert_eq!(opts.url.credentials(), Some(("me", "pw")));
        assert!(opts.pedantic);
        assert!(opts.ssl_required);
        assert_eq!(opts.read_buffer_size, 4096);
        assert_eq!(opts.max_payload, 512);
        assert_eq!(opts.handshake_limit(), None);
    }

    #[test]
    fn test_bad_url_is_rejected() {
        assert!(ConnectOptions::new().with_url("ftp://x").is_err());
    }
}
