use std::fmt;

use crate::address::ServerName;
use crate::ids::Version;
use crate::status_code::{self, status_code_t, StatusCode};

/// A status value carrying a code, an optional message, and optional
/// domain-specific hints.
///
/// Stale-version failures carry the version the server actually holds so the
/// caller can re-merge; ownership redirections carry the name of the
/// metadata cache that does own the entry. The `#[must_use]` attribute
/// ensures callers do not silently ignore error statuses.
#[derive(Debug, Clone)]
#[must_use]
pub struct Status {
    code: status_code_t,
    message: Option<String>,
    version: Option<Version>,
    owner: Option<ServerName>,
}

impl Status {
    /// Create a status with just a code.
    pub fn new(code: status_code_t) -> Self {
        Self {
            code,
            message: None,
            version: None,
            owner: None,
        }
    }

    /// Create a status with a code and a descriptive message.
    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(msg.into()),
            version: None,
            owner: None,
        }
    }

    /// Attach the version observed by the failing server.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach the name of the server the caller should redirect to.
    pub fn with_owner(mut self, owner: ServerName) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Return the numeric status code.
    pub fn code(&self) -> status_code_t {
        self.code
    }

    /// Return the optional message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Return the version hint, if any.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Return the owner hint, if any.
    pub fn owner(&self) -> Option<&ServerName> {
        self.owner.as_ref()
    }

    /// Whether this status represents success (code == OK).
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// Produce a human-readable description like
    /// `"Chunk::StaleVersion(4003) have 7"`.
    pub fn describe(&self) -> String {
        let name = status_code::to_string(self.code);
        let mut out = match &self.message {
            Some(msg) => format!("{}({}) {}", name, self.code, msg),
            None => format!("{}({})", name, self.code),
        };
        if let Some(v) = self.version {
            out.push_str(&format!(" [version={}]", v));
        }
        if let Some(o) = &self.owner {
            out.push_str(&format!(" [owner={}]", o));
        }
        out
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_code::{CacheCode, ChunkCode, RPCCode};

    #[test]
    fn test_status_ok() {
        let s = Status::new(StatusCode::OK);
        assert!(s.is_ok());
        assert_eq!(s.code(), 0);
        assert!(s.message().is_none());
        assert_eq!(s.describe(), "OK(0)");
    }

    #[test]
    fn test_status_with_message() {
        let s = Status::with_message(ChunkCode::CHUNK_NOT_FOUND, "chunk 9 not held here");
        assert!(!s.is_ok());
        assert_eq!(s.code(), 4000);
        assert_eq!(s.message(), Some("chunk 9 not held here"));
        assert_eq!(s.describe(), "Chunk::NotFound(4000) chunk 9 not held here");
    }

    #[test]
    fn test_status_version_hint() {
        let s = Status::new(ChunkCode::STALE_VERSION).with_version(Version(7));
        assert_eq!(s.version(), Some(Version(7)));
        assert!(s.describe().contains("[version=7]"));
    }

    #[test]
    fn test_status_owner_hint() {
        let s = Status::with_message(CacheCode::NOT_OWNER, "entry owned elsewhere")
            .with_owner(ServerName::from("mdc1"));
        assert_eq!(s.owner().map(|o| o.as_str()), Some("mdc1"));
        assert!(s.describe().contains("[owner=mdc1]"));
    }

    #[test]
    fn test_status_display() {
        let s = Status::new(RPCCode::TIMEOUT);
        assert_eq!(format!("{}", s), "RPC::Timeout(2005)");
    }

    #[test]
    fn test_status_is_error() {
        let s = Status::new(StatusCode::UNKNOWN);
        let e: &dyn std::error::Error = &s;
        assert!(e.to_string().contains("Unknown"));
    }
}
