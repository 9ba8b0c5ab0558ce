//! Connect / handshake tests against an in-process broker.

mod common;

use common::{listen, server_info, MockBroker};
use skiff_nats::{ClientOp, Connection, ProtocolError, ServerOp, SkiffError};
use std::time::Duration;

#[compio::test]
async fn test_connect_sends_options_and_stores_info() {
    let (listener, options) = listen().await;
    let options = options.with_name("inventory").with_verbose(true);

    let broker = async {
        let (mut broker, connect) = MockBroker::accept_client(&listener, server_info()).await;
        assert_eq!(connect.name.as_deref(), Some("inventory"));
        assert!(connect.verbose);
        assert!(!connect.pedantic);
        assert!(connect.user.is_none());
        assert_eq!(connect.lang, "rust");

        broker.expect(ClientOp::Ping).await;
        broker.send(ServerOp::Pong).await;
    };

    let client = async {
        let mut conn = Connection::new(options);
        conn.connect().await.unwrap();
        assert!(conn.is_connected());

        let info = conn.server_info().unwrap();
        assert_eq!(info.server_id, "TEST");
        assert_eq!(info.max_payload, Some(1024 * 1024));

        conn.ping().await.unwrap();
    };

    futures::join!(broker, client);
}

#[compio::test]
async fn test_credentials_come_from_url() {
    let (listener, _) = listen().await;
    let addr = listener.local_addr().unwrap();
    let options = skiff_nats::ConnectOptions::new()
        .with_url(&format!("nats://deploy:s3cret@{addr}"))
        .unwrap();

    let broker = async {
        let (_broker, connect) = MockBroker::accept_client(&listener, server_info()).await;
        assert_eq!(connect.user.as_deref(), Some("deploy"));
        assert_eq!(connect.pass.as_deref(), Some("s3cret"));
    };

    let client = async {
        let mut conn = Connection::new(options);
        conn.connect().await.unwrap();
    };

    futures::join!(broker, client);
}

#[compio::test]
async fn test_unexpected_frame_during_handshake() {
    let (listener, options) = listen().await;

    let broker = async {
        let mut broker = MockBroker::accept(&listener).await;
        broker.send(ServerOp::Pong).await;
        // Keep the socket open until the client gives up.
        broker.recv().await;
        broker.recv().await;
    };

    let client = async {
        let mut conn = Connection::new(options);
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SkiffError::Protocol(ProtocolError::UnexpectedFrame(ref verb)) if verb == "PONG"
        ));
        assert!(!conn.is_connected());
        assert!(conn.server_info().is_none());
    };

    futures::join!(broker, client);
}

#[compio::test]
async fn test_broker_rejects_connect() {
    let (listener, options) = listen().await;

    let broker = async {
        let mut broker = MockBroker::accept(&listener).await;
        assert!(matches!(broker.recv().await, Some(ClientOp::Connect(_))));
        broker
            .send(ServerOp::Err("Authorization Violation".to_string()))
            .await;
        broker.recv().await;
    };

    let client = async {
        let mut conn = Connection::new(options);
        match conn.connect().await {
            Err(SkiffError::Broker(reason)) => assert_eq!(reason, "Authorization Violation"),
            other => panic!("expected broker error, got {other:?}"),
        }
        assert!(!conn.is_connected());
    };

    futures::join!(broker, client);
}

#[compio::test]
async fn test_handshake_timeout() {
    let (listener, options) = listen().await;
    let options = options.with_handshake_timeout(Duration::from_millis(100));

    let broker = async {
        // Accept and read CONNECT, but never answer.
        let mut broker = MockBroker::accept(&listener).await;
        broker.recv().await;
        broker.recv().await;
    };

    let client = async {
        let mut conn = Connection::new(options);
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, SkiffError::HandshakeTimeout(d) if d == Duration::from_millis(100)));
        assert!(err.is_connection_error());
        assert!(!conn.is_connected());
    };

    futures::join!(broker, client);
}

#[compio::test]
async fn test_connect_refused() {
    // Reserve a port, then release it so nothing is listening there.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let options = skiff_nats::ConnectOptions::new()
        .with_url(&format!("nats://{addr}"))
        .unwrap();

    let mut conn = Connection::new(options);
    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, SkiffError::Transport(_)));
    assert!(!conn.is_connected());
}

#[compio::test]
async fn test_close_is_idempotent() {
    let (listener, options) = listen().await;

    let broker = async {
        let (mut broker, _) = MockBroker::accept_client(&listener, server_info()).await;
        assert_eq!(broker.recv().await, None);
    };

    let client = async {
        let mut conn = Connection::new(options);
        conn.connect().await.unwrap();
        conn.close();
        conn.close();
        assert!(!conn.is_connected());
        assert!(conn.server_info().is_none());

        let err = conn.publish("after.close", "x").await.unwrap_err();
        assert!(matches!(err, SkiffError::Transport(ref e) if e.kind() == std::io::ErrorKind::NotConnected));
    };

    futures::join!(broker, client);
}

#[compio::test]
async fn test_recv_timeout_after_default_handshake() {
    let (listener, options) = listen().await;
    let options = options.with_recv_timeout(Duration::from_millis(100));

    let broker = async {
        let (mut broker, _) = MockBroker::accept_client(&listener, server_info()).await;
        broker.recv().await;
    };

    let client = async {
        let mut conn = Connection::new(options);
        conn.connect().await.unwrap();

        let started = std::time::Instant::now();
        let err = conn.next_message().await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, SkiffError::Transport(ref e) if e.kind() == std::io::ErrorKind::TimedOut));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1100), "read took {elapsed:?}");
        conn.close();
    };

    futures::join!(broker, client);
}
