//! In-process broker used by the integration tests.
//!
//! Speaks the broker side of the protocol with the crate's own codec so each
//! test can script exactly which frames go over the wire.

#![allow(dead_code)]

use bytes::Bytes;
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWriteExt};
use compio::net::{TcpListener, TcpStream};
use skiff_core::buffer::ReadBuffer;
use skiff_core::options::ConnectOptions;
use skiff_nats::codec::{Decoder, Operation};
use skiff_nats::{ClientOp, ConnectInfo, ServerInfo, ServerOp};

/// Print the client's logs when `RUST_LOG` is set.
pub fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

pub async fn listen() -> (TcpListener, ConnectOptions) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let options = ConnectOptions::new()
        .with_url(&format!("nats://{addr}"))
        .unwrap();
    (listener, options)
}

pub fn server_info() -> ServerInfo {
    ServerInfo {
        server_id: "TEST".to_string(),
        version: "2.10.0".to_string(),
        max_payload: Some(1024 * 1024),
        ..ServerInfo::default()
    }
}

pub struct MockBroker {
    stream: TcpStream,
    recv: ReadBuffer,
    decoder: Decoder<ClientOp>,
}

impl MockBroker {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Self {
            stream,
            recv: ReadBuffer::new(),
            decoder: Decoder::new(4096),
        }
    }

    /// Accept a client, send `INFO` and return its `CONNECT` document.
    pub async fn accept_client(listener: &TcpListener, info: ServerInfo) -> (Self, ConnectInfo) {
        let mut broker = Self::accept(listener).await;
        broker.send(ServerOp::Info(Box::new(info))).await;
        match broker.recv().await {
            Some(ClientOp::Connect(connect)) => (broker, *connect),
            other => panic!("expected CONNECT, got {other:?}"),
        }
    }

    pub async fn send(&mut self, op: ServerOp) {
        let mut buf = Vec::new();
        op.encode(&mut buf);
        self.send_raw(buf).await;
    }

    pub async fn send_raw(&mut self, bytes: impl Into<Vec<u8>>) {
        let BufResult(result, _) = self.stream.write_all(bytes.into()).await;
        result.unwrap();
    }

    /// Next client frame, or `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<ClientOp> {
        loop {
            if let Some(op) = self.decoder.decode(&mut self.recv).unwrap() {
                return Some(op);
            }
            let BufResult(result, buf) = self.stream.read(Vec::with_capacity(4096)).await;
            match result {
                Ok(0) | Err(_) => return None,
                Ok(_) => self.recv.push(Bytes::from(buf)),
            }
        }
    }

    pub async fn expect(&mut self, expected: ClientOp) {
        assert_eq!(self.recv().await, Some(expected));
    }
}

pub fn sub(subject: &str, queue: Option<&str>, sid: u64) -> ClientOp {
    ClientOp::Sub {
        subject: subject.to_string(),
        queue: queue.map(str::to_string),
        sid,
    }
}

pub fn msg(sid: u64, subject: &str, payload: &'static str) -> ServerOp {
    ServerOp::Msg(skiff_nats::Message::new(
        sid,
        subject,
        None,
        Bytes::from_static(payload.as_bytes()),
    ))
}
