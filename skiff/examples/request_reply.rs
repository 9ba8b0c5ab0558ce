/// Request / Reply Example
///
/// Needs a NATS broker on localhost:4222.
///
/// A responder connection answers on `time.now`; a requester publishes with
/// a reply subject and waits for the answer with `next_message`.
use skiff::nats::prelude::*;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

const URL: &str = "nats://127.0.0.1:4222";

async fn run_responder() -> skiff::Result<()> {
    let mut conn = skiff::nats::connect(URL).await?;
    let sub = conn
        .subscribe("time.now", |_: &Message| Flow::Continue)
        .await?;
    conn.ping().await?;
    info!("[Responder] Listening on {}", sub.subject());

    let request = conn.next_message().await?;
    let Some(reply) = request.reply else {
        error!("[Responder] Request without reply subject");
        return Ok(());
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    conn.publish(&reply, Bytes::from(now.to_string())).await?;
    conn.ping().await?;
    info!("[Responder] Answered on {}", reply);
    Ok(())
}

async fn run_requester() -> skiff::Result<()> {
    let mut conn = skiff::nats::connect(URL).await?;
    conn.subscribe("inbox.requester", |msg: &Message| {
        info!("[Requester] Broker time: {:?}", msg.payload_str());
        Flow::Stop
    })
    .await?;

    conn.publish_with_reply("time.now", "inbox.requester", "")
        .await?;

    let outcome = conn
        .wait(WaitOptions::new().with_duration(Duration::from_secs(2)))
        .await?;
    if outcome.reason == StopReason::Duration {
        error!("[Requester] No reply within two seconds");
    }
    Ok(())
}

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    skiff::dev_tracing::init_tracing();

    info!("=== Request / Reply Example ===\n");

    let responder = compio::runtime::spawn(async {
        if let Err(e) = run_responder().await {
            error!("[Main] Responder error: {e}");
        }
    });

    // Give the responder time to subscribe
    compio::time::sleep(Duration::from_millis(200)).await;

    run_requester().await?;
    let _ = responder.await;
    Ok(())
}
