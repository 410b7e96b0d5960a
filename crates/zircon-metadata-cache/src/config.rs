//! Metadata cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Logical name published to the coordination service; also the holder
    /// identity on ownership leases.
    pub name: String,

    /// Address to listen on (`host:port`; port 0 picks a free port).
    pub listen_addr: String,

    /// Coordination service endpoints.
    pub coordinator_endpoints: Vec<String>,

    /// How long ownership leases live between renewals.
    #[serde(with = "duration_secs")]
    pub lease_ttl: Duration,

    /// How often held leases are renewed.
    #[serde(with = "duration_secs")]
    pub renew_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "mdc0".into(),
            listen_addr: "0.0.0.0:9700".into(),
            coordinator_endpoints: vec!["127.0.0.1:2379".into()],
            lease_ttl: Duration::from_secs(30),
            renew_interval: Duration::from_secs(10),
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
        let cfg = CacheConfig::default();
        assert_eq!(cfg.name, "mdc0");
        assert!(cfg.renew_interval < cfg.lease_ttl);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let cfg = CacheConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lease_ttl, cfg.lease_ttl);
    }
}
