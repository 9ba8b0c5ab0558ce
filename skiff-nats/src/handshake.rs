//! CONNECT / INFO exchange.
//!
//! Runs to completion before the connection is handed back to the caller,
//! so no subscription or publish can interleave with it.

use compio::io::{AsyncRead, AsyncWrite};
use skiff_core::error::{ProtocolError, Result, SkiffError};
use skiff_core::options::ConnectOptions;
use skiff_core::timer;
use tracing::{debug, trace};

use crate::codec::{ClientOp, ServerOp};
use crate::info::{ConnectInfo, ServerInfo};
use crate::transport::Transport;

/// Send `CONNECT` and wait for the broker's `INFO`, bounded by the
/// configured handshake timeout.
pub async fn perform_handshake<S>(
    transport: &mut Transport<S>,
    options: &ConnectOptions,
) -> Result<ServerInfo>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match options.handshake_limit() {
        None => exchange(transport, options).await,
        Some(limit) => timer::timeout(limit, exchange(transport, options))
            .await
            .map_err(|_| SkiffError::HandshakeTimeout(limit))?,
    }
}

async fn exchange<S>(transport: &mut Transport<S>, options: &ConnectOptions) -> Result<ServerInfo>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connect = ConnectInfo::from_options(options);
    debug!(
        "[HANDSHAKE] Sending CONNECT (name={:?}, verbose={}, pedantic={}, auth={})",
        connect.name,
        connect.verbose,
        connect.pedantic,
        connect.user.is_some()
    );
    transport.send(&ClientOp::Connect(Box::new(connect))).await?;

    loop {
        match transport.read_op().await? {
            ServerOp::Info(info) => {
                debug!(
                    "[HANDSHAKE] Handshake complete! Broker {} version {}",
                    info.server_id, info.version
                );
                return Ok(*info);
            }
            ServerOp::Ok => trace!("[HANDSHAKE] +OK before INFO"),
            ServerOp::Err(reason) => {
                debug!("[HANDSHAKE] ERROR: broker rejected CONNECT: {}", reason);
                return Err(SkiffError::Broker(reason));
            }
            other => {
                debug!("[HANDSHAKE] ERROR: Expected INFO, got {:?}", other);
                return Err(ProtocolError::unexpected(other.verb().name()).into());
            }
        }
    }
}
