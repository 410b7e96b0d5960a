//! Error payload shared by every service.

use serde::{Deserialize, Serialize};
use zircon_types::{status_code_t, ServerName, Status, Version};
use zircon_wire::{WireDeserialize, WireSerialize};

/// Body of a non-OK response.
///
/// The status code itself travels in the response envelope; this message
/// carries the error text plus the optional hints: `version` is the version
/// the failing server observed (0 when absent), `owner` is the redirection
/// target for not-owner failures (empty when absent, per the serialized
/// empty-string-means-no-redirect convention).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub version: u64,
    pub owner: String,
}

impl ErrorInfo {
    /// Build the wire payload for a status.
    pub fn from_status(status: &Status) -> Self {
        Self {
            message: status.message().unwrap_or_default().to_string(),
            version: status.version().map(|v| v.0).unwrap_or(0),
            owner: status
                .owner()
                .map(|o| o.as_str().to_string())
                .unwrap_or_default(),
        }
    }

    /// Rebuild a status from the envelope code plus this payload.
    pub fn into_status(self, code: status_code_t) -> Status {
        let mut status = if self.message.is_empty() {
            Status::new(code)
        } else {
            Status::with_message(code, self.message)
        };
        if self.version != 0 {
            status = status.with_version(Version(self.version));
        }
        if !self.owner.is_empty() {
            status = status.with_owner(ServerName(self.owner));
        }
        status
    }
}
