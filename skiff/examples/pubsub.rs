/// PubSub Example
///
/// Needs a NATS broker on localhost:4222 (`nats-server` with defaults).
///
/// - Subscribes to `demo.>` and a queue group on `demo.jobs`
/// - Publishes a handful of messages, then runs the receive loop
/// - Stops after every message came back or two seconds, whichever is first
use skiff::nats::prelude::*;
use std::time::Duration;
use tracing::info;

const TOTAL: usize = 5;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== PubSub Example ===\n");

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "nats://127.0.0.1:4222".to_string());
    let options = ConnectOptions::new()
        .with_url(&url)?
        .with_name("skiff-pubsub-example");

    let mut conn = Connection::new(options);
    conn.connect().await?;
    if let Some(server) = conn.server_info() {
        info!("[Main] Connected to {} ({})", server.server_id, server.version);
    }

    let all = conn
        .subscribe("demo.>", |msg: &Message| {
            info!("[demo.>] {} {:?}", msg.subject, msg.payload_str());
            Flow::Continue
        })
        .await?;
    conn.queue_subscribe("demo.jobs", "workers", |msg: &Message| {
        info!("[workers] job {:?}", msg.payload_str());
        Flow::Continue
    })
    .await?;

    for i in 0..TOTAL {
        conn.publish("demo.jobs", Bytes::from(format!("job-{i}")))
            .await?;
    }
    conn.ping().await?;

    // Each job is delivered once per subscription.
    let outcome = conn
        .wait(
            WaitOptions::new()
                .with_count(TOTAL * 2)
                .with_duration(Duration::from_secs(2)),
        )
        .await?;
    info!(
        "[Main] Delivered {} messages, stopped by {:?}",
        outcome.delivered, outcome.reason
    );

    conn.unsubscribe(&all).await?;
    conn.close();
    Ok(())
}
