//! Per-connection liveness: pings, read deadline, and teardown.

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HubConfig;

use super::connection::{Connection, SendError};
use super::registry::ConnectionRegistry;

/// Why a connection left the `Active` state.
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    ReadError(axum::Error),
    PingFailed(SendError),
    WriteFailed(SendError),
    PongTimeout,
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::ReadError(e) => write!(f, "read error: {e}"),
            CloseReason::PingFailed(e) => write!(f, "ping failed: {e}"),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {e}"),
            CloseReason::PongTimeout => f.write_str("no traffic within pong wait"),
            CloseReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Move a connection to `Closed`: cancel it, unregister it and close the
/// transport. Run by the supervisor when its loop ends; returns whether this
/// call did the unregistering.
pub async fn teardown(
    registry: &ConnectionRegistry,
    conn: &Connection,
    reason: &CloseReason,
    config: &HubConfig,
) -> bool {
    let removed = conn
        .shut_down(|| registry.unregister(conn.recipient(), conn.id()), config.write_timeout)
        .await;

    if removed {
        tracing::info!(
            conn_id = %conn.id(),
            recipient = conn.recipient(),
            %reason,
            "hub connection closed"
        );
    }
    removed
}

/// Take a connection out of service from outside its supervisor without
/// touching the transport. The supervisor wakes on the cancellation and sends
/// the close frame in its own task.
pub fn evict(registry: &ConnectionRegistry, conn: &Connection, reason: &CloseReason) -> bool {
    let removed = conn.detach(|| registry.unregister(conn.recipient(), conn.id()));

    if removed {
        tracing::info!(
            conn_id = %conn.id(),
            recipient = conn.recipient(),
            %reason,
            "hub connection evicted"
        );
    }
    removed
}

/// Run the connection until it fails, then tear it down.
///
/// Inbound frames of any kind (including pongs) extend the read deadline;
/// their content is otherwise discarded.
pub async fn supervise<S>(
    conn: Arc<Connection>,
    mut inbound: S,
    registry: Arc<ConnectionRegistry>,
    config: HubConfig,
) -> CloseReason
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut ping = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = time::sleep(config.pong_wait);
    tokio::pin!(deadline);

    let cancel = conn.cancel_token().clone();

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break CloseReason::Cancelled,

            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break CloseReason::PeerClosed,
                Some(Ok(_)) => deadline.as_mut().reset(Instant::now() + config.pong_wait),
                Some(Err(e)) => break CloseReason::ReadError(e),
            },

            _ = ping.tick() => {
                if let Err(e) = conn.send(Message::Ping(Bytes::new()), config.write_timeout).await {
                    break CloseReason::PingFailed(e);
                }
            }

            _ = &mut deadline => break CloseReason::PongTimeout,
        }
    };

    teardown(&registry, &conn, &reason, &config).await;
    reason
}
