//! Client surface of the coordination service, plus the in-process
//! implementation used by tests and single-node deployments.
//!
//! The coordination service itself is external: a strongly-consistent
//! key-value store with atomic put-if-match, leased keys, and prefix reads.
//! Everything in zircon that needs cluster-wide agreement (server addresses,
//! metadata-cache ownership, chunk-number allocation) goes through the
//! [`Coordinator`] trait so the backing store can be swapped out.

pub mod kv;
pub mod mem;
pub mod roles;
pub mod sequence;

pub use kv::{Coordinator, KeyValue};
pub use mem::MemCoordinator;
pub use roles::{RoleRegistry, ServerRecord, ServerRole};
pub use sequence::Sequence;
