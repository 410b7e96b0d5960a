//! Monotonic counter over the coordination service.
//!
//! Chunk numbers are allocated from one of these: a CAS loop on a single
//! counter key gives every metadata cache a consistent view without a
//! dedicated allocator process. Unused numbers may be lost when a caller
//! crashes after allocating; that is tolerated (they are never reissued).

use std::sync::Arc;

use zircon_types::{make_error_msg, CoordCode, Result};

use crate::kv::Coordinator;

/// How many CAS rounds to attempt before reporting contention.
const MAX_CAS_ROUNDS: usize = 64;

pub struct Sequence {
    coord: Arc<dyn Coordinator>,
    key: String,
}

impl Sequence {
    pub fn new(coord: Arc<dyn Coordinator>, key: impl Into<String>) -> Self {
        Self {
            coord,
            key: key.into(),
        }
    }

    /// Atomically take the next value. The first value issued is 1.
    pub async fn next(&self) -> Result<u64> {
        for _ in 0..MAX_CAS_ROUNDS {
            let current = self.coord.get(&self.key).await?;
            let value = match &current {
                Some(bytes) => decode(bytes)?,
                None => 0,
            };
            let next = value + 1;
            let swapped = self
                .coord
                .put_if_match(&self.key, current.as_deref(), &next.to_le_bytes())
                .await?;
            if swapped {
                return Ok(next);
            }
        }
        make_error_msg(
            CoordCode::CAS_FAILED,
            format!("sequence {} contended for {} rounds", self.key, MAX_CAS_ROUNDS),
        )
    }

    /// Read the most recently issued value without taking one.
    pub async fn current(&self) -> Result<u64> {
        match self.coord.get(&self.key).await? {
            Some(bytes) => decode(&bytes),
            None => Ok(0),
        }
    }
}

fn decode(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| {
        zircon_types::Status::with_message(
            CoordCode::SEQUENCE_EXHAUSTED,
            format!("sequence value has {} bytes, want 8", bytes.len()),
        )
    })?;
    Ok(u64::from_le_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemCoordinator;

    #[tokio::test]
    async fn test_sequence_starts_at_one() {
        let seq = Sequence::new(Arc::new(MemCoordinator::new()), "chunk/next");
        assert_eq!(seq.current().await.unwrap(), 0);
        assert_eq!(seq.next().await.unwrap(), 1);
        assert_eq!(seq.next().await.unwrap(), 2);
        assert_eq!(seq.current().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sequence_shared_view() {
        let coord: Arc<dyn Coordinator> = Arc::new(MemCoordinator::new());
        let a = Sequence::new(Arc::clone(&coord), "chunk/next");
        let b = Sequence::new(Arc::clone(&coord), "chunk/next");

        assert_eq!(a.next().await.unwrap(), 1);
        assert_eq!(b.next().await.unwrap(), 2);
        assert_eq!(a.next().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_sequence_concurrent_no_duplicates() {
        let coord: Arc<dyn Coordinator> = Arc::new(MemCoordinator::new());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let coord = Arc::clone(&coord);
            tasks.spawn(async move {
                let seq = Sequence::new(coord, "chunk/next");
                let mut got = Vec::new();
                for _ in 0..10 {
                    got.push(seq.next().await.unwrap());
                }
                got
            });
        }

        let mut all = Vec::new();
        while let Some(result) = tasks.join_next().await {
            all.extend(result.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<u64> = (1..=80).collect();
        assert_eq!(all, expected);
    }
}
