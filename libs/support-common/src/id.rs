use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = support_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// Live hub connection.
    pub const CONNECTION: &str = "conn";
    /// Inbound payment callback, used to correlate log lines of one delivery.
    pub const CALLBACK: &str = "cb";
}
