//! Live creator connections: registry, heartbeat supervision and fan-out.
//!
//! Each connection is owned by one supervisor task, which closes the transport
//! through [`supervisor::teardown`]. A failed broadcast write instead calls
//! [`supervisor::evict`], which cancels and unregisters without waiting on the
//! socket. Either way the connection is unregistered exactly once.

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod registry;
pub mod server;
pub mod supervisor;
