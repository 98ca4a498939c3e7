//! Recipient -> live connections map.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::user::UserId;

use super::connection::Connection;

/// Shared registry of open connections, keyed by recipient.
///
/// Uses `DashMap` for shard-level locking. Every operation completes under the
/// shard lock without awaiting, so no I/O ever happens while it is held.
#[derive(Default)]
pub struct ConnectionRegistry {
    recipients: DashMap<UserId, HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under its recipient. Re-registering the same handle is
    /// a no-op.
    pub fn register(&self, conn: Arc<Connection>) {
        self.recipients
            .entry(conn.recipient())
            .or_default()
            .insert(conn.id().to_string(), conn);
    }

    /// Remove a connection. Drops the recipient entry once it is empty.
    ///
    /// Returns true only for the call that actually removed it.
    pub fn unregister(&self, recipient: UserId, conn_id: &str) -> bool {
        match self.recipients.entry(recipient) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(conn_id).is_some();
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Point-in-time copy of a recipient's connections.
    pub fn snapshot(&self, recipient: UserId) -> Vec<Arc<Connection>> {
        self.recipients
            .get(&recipient)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self, recipient: UserId) -> usize {
        self.recipients.get(&recipient).map(|c| c.len()).unwrap_or(0)
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    pub fn total_connections(&self) -> usize {
        self.recipients.iter().map(|e| e.value().len()).sum()
    }
}
