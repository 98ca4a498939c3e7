//! Fan-out of hub events to every live connection of one recipient.
//!
//! Writes to different connections run concurrently and each is bounded by
//! the configured write deadline, so one slow peer cannot hold up the rest.
//! A connection whose write fails is evicted on the spot; its supervisor
//! closes the transport. A call never waits longer than one write deadline.

use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::future::join_all;

use crate::config::HubConfig;
use crate::models::user::UserId;

use super::events::HubEvent;
use super::registry::ConnectionRegistry;
use super::supervisor::{evict, CloseReason};

/// Per-call delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Cloneable handle over the shared registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    config: HubConfig,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, config: HubConfig) -> Self {
        Self { registry, config }
    }

    /// Deliver `event` to the recipient's connections as they stand right now.
    ///
    /// Connections registered after the snapshot miss this event. Having no
    /// connections at all is not an error.
    pub async fn broadcast_to_recipient(&self, recipient: UserId, event: &HubEvent) -> BroadcastReport {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, event = event.name(), "failed to encode hub event");
                return BroadcastReport::default();
            }
        };

        let targets = self.registry.snapshot(recipient);
        if targets.is_empty() {
            tracing::debug!(recipient, event = event.name(), "no live connections for recipient");
            return BroadcastReport::default();
        }

        let writes = targets.iter().map(|conn| {
            let frame = frame.clone();
            async move {
                match conn.send(Message::Text(frame), self.config.write_timeout).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(conn_id = %conn.id(), recipient, error = %e, "hub write failed");
                        evict(&self.registry, conn, &CloseReason::WriteFailed(e));
                        false
                    }
                }
            }
        });

        let results = join_all(writes).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        let report = BroadcastReport {
            delivered,
            dropped: results.len() - delivered,
        };

        tracing::debug!(
            recipient,
            event = event.name(),
            delivered = report.delivered,
            dropped = report.dropped,
            "hub event broadcast"
        );
        report
    }
}
