//! Wire message definitions for every zircon RPC operation.
//!
//! Each operation is one request struct and one response struct. Field order
//! is the wire order. Messages use primitive field types (`u64` chunk
//! numbers, `String` names); conversions to the strong types in
//! `zircon-types` happen at the proxy/adapter boundary.

pub mod chunkserver;
pub mod common;
pub mod frontend;
pub mod metacache;

pub use common::ErrorInfo;
