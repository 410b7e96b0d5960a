//! Chunkserver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkserverConfig {
    /// Logical name published to the coordination service.
    pub name: String,

    /// Address to listen on (`host:port`; port 0 picks a free port).
    pub listen_addr: String,

    /// Coordination service endpoints.
    pub coordinator_endpoints: Vec<String>,

    /// How often the background sweeper runs.
    #[serde(with = "duration_secs")]
    pub gc_interval: Duration,

    /// Staged writes older than this are dropped by the sweeper.
    #[serde(with = "duration_secs")]
    pub prepared_write_ttl: Duration,
}

impl Default for ChunkserverConfig {
    fn default() -> Self {
        Self {
            name: "cs0".into(),
            listen_addr: "0.0.0.0:9600".into(),
            coordinator_endpoints: vec!["127.0.0.1:2379".into()],
            gc_interval: Duration::from_secs(30),
            prepared_write_ttl: Duration::from_secs(300),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ChunkserverConfig::default();
        assert_eq!(cfg.gc_interval, Duration::from_secs(30));
        assert_eq!(cfg.prepared_write_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let cfg = ChunkserverConfig {
            name: "cs7".into(),
            listen_addr: "0.0.0.0:0".into(),
            coordinator_endpoints: vec!["coord:2379".into()],
            gc_interval: Duration::from_millis(1500),
            prepared_write_ttl: Duration::from_secs(60),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ChunkserverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "cs7");
        assert_eq!(back.gc_interval, Duration::from_millis(1500));
    }
}
