//! Broker configuration.

use std::time::Duration;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Stream name for queued tasks
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Sorted set holding not-yet-eligible retries
    pub delayed_set: String,
    /// Key prefix for result-store records
    pub result_prefix: String,
    /// TTL for result-store records
    pub result_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            stream_name: "vidtask:jobs".to_string(),
            consumer_group: "vidtask:workers".to_string(),
            delayed_set: "vidtask:delayed".to_string(),
            result_prefix: "vidtask:result:".to_string(),
            result_ttl: Duration::from_secs(86400),
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables.
    ///
    /// The URL is assembled from REDIS_HOST/PORT/DB/PASSWORD rather
    /// than taken whole, matching how deployments configure the broker.
    pub fn from_env() -> Self {
        let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port: u16 = std::env::var("REDIS_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6379);
        let db: u32 = std::env::var("REDIS_DB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let redis_url = match std::env::var("REDIS_PASSWORD") {
            Ok(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}/{}", password, host, port, db)
            }
            _ => format!("redis://{}:{}/{}", host, port, db),
        };

        Self {
            redis_url,
            ..Default::default()
        }
    }

    /// Result-store key for a task ID.
    pub fn result_key(&self, task_id: &str) -> String {
        format!("{}{}", self.result_prefix, task_id)
    }
}
