//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry configuration shared by every coordinator operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial wait time before the first retry.
    #[serde(with = "duration_secs")]
    pub init_wait: Duration,

    /// Maximum wait time between retries (exponential back-off cap).
    #[serde(with = "duration_secs")]
    pub max_wait: Duration,

    /// Total time budget for retries before giving up.
    #[serde(with = "duration_secs")]
    pub total_budget: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            init_wait: Duration::from_millis(20),
            max_wait: Duration::from_secs(2),
            total_budget: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Address of a frontend, for clients constructed from configuration.
    pub frontend_addr: String,

    /// Replicas per chunk at allocation.
    pub replica_count: u32,

    /// Retry behavior for transient failures.
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frontend_addr: "127.0.0.1:9500".into(),
            replica_count: 3,
            retry: RetryConfig::default(),
        }
    }
}

mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
