//! Client write coordinator for zircon.
//!
//! The client stitches the planes together: it asks the frontend where a
//! chunk's metadata lives, drives the prepare/commit/advance write protocol
//! across the chunk's replicas, and moves the metadata entry forward with
//! compare-and-swap, following ownership redirects and absorbing transient
//! failures along the way.

pub mod config;
pub mod control;
pub mod error;
pub mod retry;

pub use config::{ClientConfig, RetryConfig};
pub use control::Client;
pub use error::{ClientError, ClientResult};
pub use retry::ExponentialBackoff;
