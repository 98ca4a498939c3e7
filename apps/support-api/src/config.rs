use std::time::Duration;

/// Default payment provider origin (Duitku sandbox).
const DEFAULT_DUITKU_BASE_URL: &str = "https://api-sandbox.duitku.com";

/// Support API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Maximum number of pooled database connections.
    pub database_pool_size: usize,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Public origin of this service, used to build the provider callback URL.
    pub app_url: String,
    /// Payment provider credentials and endpoint.
    pub duitku: DuitkuConfig,
    /// Live connection tuning.
    pub hub: HubConfig,
}

#[derive(Debug, Clone)]
pub struct DuitkuConfig {
    pub merchant_code: String,
    pub merchant_key: String,
    pub base_url: String,
}

/// Heartbeat and write-deadline settings for hub connections.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// How often the server pings an idle connection.
    pub ping_interval: Duration,
    /// How long a connection may stay silent before it is considered dead.
    /// Always greater than `ping_interval`.
    pub pong_wait: Duration,
    /// Deadline for any single outbound frame (ping or event).
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_wait: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubConfigError {
    #[error("ping interval ({ping_interval:?}) must be shorter than pong wait ({pong_wait:?})")]
    PingNotShorterThanPongWait {
        ping_interval: Duration,
        pong_wait: Duration,
    },
    #[error("write timeout must be non-zero")]
    ZeroWriteTimeout,
}

impl HubConfig {
    /// Build from explicit values, rejecting a ping interval that would let a
    /// single missed ping kill the connection.
    pub fn new(ping_interval: Duration, pong_wait: Duration, write_timeout: Duration) -> Result<Self, HubConfigError> {
        if ping_interval >= pong_wait {
            return Err(HubConfigError::PingNotShorterThanPongWait {
                ping_interval,
                pong_wait,
            });
        }
        if write_timeout.is_zero() {
            return Err(HubConfigError::ZeroWriteTimeout);
        }
        Ok(Self {
            ping_interval,
            pong_wait,
            write_timeout,
        })
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing or
    /// the heartbeat settings are inconsistent.
    pub fn from_env() -> Self {
        let defaults = HubConfig::default();
        let hub = HubConfig::new(
            secs_var("WS_PING_INTERVAL_SECS", defaults.ping_interval),
            secs_var("WS_PONG_WAIT_SECS", defaults.pong_wait),
            secs_var("WS_WRITE_TIMEOUT_SECS", defaults.write_timeout),
        )
        .unwrap_or_else(|e| panic!("invalid hub configuration: {e}"));

        Self {
            database_url: required_var("DATABASE_URL"),
            database_pool_size: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(20),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
            app_url: required_var("APP_URL").trim_end_matches('/').to_string(),
            duitku: DuitkuConfig {
                merchant_code: required_var("DUITKU_MERCHANT_CODE"),
                merchant_key: required_var("DUITKU_MERCHANT_KEY"),
                base_url: std::env::var("DUITKU_BASE_URL")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_DUITKU_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            hub,
        }
    }

    /// URL the payment provider posts callbacks to.
    pub fn callback_url(&self) -> String {
        format!("{}/api/v1/payment/callback", self.app_url)
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn secs_var(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_config_rejects_ping_not_shorter_than_pong() {
        let err = HubConfig::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(10),
        )
        .unwrap_err();
        assert!(matches!(err, HubConfigError::PingNotShorterThanPongWait { .. }));
        assert!(err.to_string().contains("must be shorter"));
    }

    #[test]
    fn hub_config_rejects_zero_write_timeout() {
        assert_eq!(
            HubConfig::new(Duration::from_secs(1), Duration::from_secs(2), Duration::ZERO).unwrap_err(),
            HubConfigError::ZeroWriteTimeout
        );
    }

    #[test]
    fn hub_config_defaults_are_consistent() {
        let d = HubConfig::default();
        assert!(HubConfig::new(d.ping_interval, d.pong_wait, d.write_timeout).is_ok());
    }
}
