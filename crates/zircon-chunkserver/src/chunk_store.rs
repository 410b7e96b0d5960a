//! In-memory multi-version chunk store.
//!
//! [`ChunkStore`] holds, per chunk: the committed payloads by version, the
//! version currently visible to readers, and the staged-but-uncommitted
//! writes by commit hash. A `DashMap` keyed by chunk number gives each chunk
//! its own short critical section; chunks are independent, so the coarse
//! per-entry granularity is enough to make version transitions atomic.
//!
//! Every committed payload is exactly the chunk ceiling long (zero-padded on
//! `add`), so storage accounting is a straight sum over held payloads and
//! staged spans.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use zircon_types::{
    make_error_msg, ChunkCode, ChunkNum, ChunkVersion, CommitHash, Result, Status, Version,
    MAX_CHUNK_SIZE,
};

/// A write staged by `start_write`, waiting for a commit or expiry.
#[derive(Debug, Clone)]
struct StagedWrite {
    offset: u32,
    data: Bytes,
    staged_at: Instant,
}

/// A committed payload, remembering which staged write produced it.
///
/// The hash makes commits first-writer-wins per version: a retried commit of
/// the same staged write is a benign no-op, while a competing writer aiming
/// at the same version is refused instead of silently replacing the content.
#[derive(Debug, Clone)]
struct CommittedPayload {
    hash: CommitHash,
    data: Bytes,
}

#[derive(Debug)]
struct ChunkState {
    /// Committed payloads by version, every one `max_chunk_size` long.
    committed: BTreeMap<Version, CommittedPayload>,
    /// The version returned to readers asking for any version.
    latest_visible: Version,
    /// Staged writes by commit hash.
    prepared: HashMap<CommitHash, StagedWrite>,
}

impl ChunkState {
    fn bytes_used(&self) -> u64 {
        let committed: u64 = self.committed.values().map(|p| p.data.len() as u64).sum();
        let prepared: u64 = self.prepared.values().map(|w| w.data.len() as u64).sum();
        committed + prepared
    }
}

#[derive(Debug)]
pub struct ChunkStore {
    chunks: DashMap<ChunkNum, ChunkState>,
    max_chunk_size: u32,
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore {
    /// Create a new, empty chunk store with the standard chunk ceiling.
    pub fn new() -> Self {
        Self {
            chunks: DashMap::new(),
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// Create a chunk store with a custom chunk ceiling (tests only need a
    /// few kilobytes).
    pub fn with_max_chunk_size(max_chunk_size: u32) -> Self {
        Self {
            chunks: DashMap::new(),
            max_chunk_size,
        }
    }

    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    fn check_bounds(&self, chunk: ChunkNum, offset: u32, len: usize) -> Result<()> {
        let end = offset as u64 + len as u64;
        if end > self.max_chunk_size as u64 {
            return make_error_msg(
                ChunkCode::OUT_OF_BOUNDS,
                format!(
                    "chunk {}: range [{}, {}) exceeds chunk size {}",
                    chunk, offset, end, self.max_chunk_size
                ),
            );
        }
        Ok(())
    }

    fn not_found(chunk: ChunkNum) -> Status {
        Status::with_message(
            ChunkCode::CHUNK_NOT_FOUND,
            format!("chunk {} is not held by this server", chunk),
        )
    }

    /// Read `length` bytes at `offset` from the visible version.
    ///
    /// Fails with the current visible version attached when the chunk is
    /// behind `minimum`, so callers can retry elsewhere or wait.
    pub fn read(
        &self,
        chunk: ChunkNum,
        offset: u32,
        length: u32,
        minimum: Version,
    ) -> Result<(Bytes, Version)> {
        self.check_bounds(chunk, offset, length as usize)?;

        let state = self.chunks.get(&chunk).ok_or_else(|| Self::not_found(chunk))?;
        let latest = state.latest_visible;

        if !minimum.is_any() && latest < minimum {
            return Err(Status::with_message(
                ChunkCode::STALE_VERSION,
                format!("chunk {}: have {}, want at least {}", chunk, latest, minimum),
            )
            .with_version(latest));
        }

        let payload = state.committed.get(&latest).ok_or_else(|| {
            Status::with_message(
                ChunkCode::VERSION_NOT_FOUND,
                format!("chunk {}: visible version {} has no payload", chunk, latest),
            )
        })?;

        let start = offset as usize;
        let end = start + length as usize;
        Ok((payload.data.slice(start..end), latest))
    }

    /// Stage a write under its deterministic hash. Re-staging the same
    /// `(offset, data)` refreshes the existing entry instead of growing the
    /// staging map.
    pub fn start_write(&self, chunk: ChunkNum, offset: u32, data: Bytes) -> Result<CommitHash> {
        self.check_bounds(chunk, offset, data.len())?;

        let mut state = self
            .chunks
            .get_mut(&chunk)
            .ok_or_else(|| Self::not_found(chunk))?;

        let hash = CommitHash::digest(offset, &data);
        state.prepared.insert(
            hash,
            StagedWrite {
                offset,
                data,
                staged_at: Instant::now(),
            },
        );
        Ok(hash)
    }

    /// Commit the staged write `hash` on top of `old_version`, storing the
    /// result as `new_version`. Re-committing an already committed version
    /// whose staged entry is gone is a benign success.
    pub fn commit_write(
        &self,
        chunk: ChunkNum,
        hash: CommitHash,
        old_version: Version,
        new_version: Version,
    ) -> Result<()> {
        if new_version <= old_version {
            return make_error_msg(
                ChunkCode::INVALID_VERSION,
                format!(
                    "chunk {}: commit must advance the version ({} -> {})",
                    chunk, old_version, new_version
                ),
            );
        }

        let mut state = self
            .chunks
            .get_mut(&chunk)
            .ok_or_else(|| Self::not_found(chunk))?;

        // A version, once committed, keeps its content: the same staged
        // write may land again (retry), anything else is a competing writer
        // and must pick a different version.
        if let Some(existing) = state.committed.get(&new_version) {
            if existing.hash == hash {
                return Ok(());
            }
            return make_error_msg(
                ChunkCode::COMMIT_CONFLICT,
                format!(
                    "chunk {}: version {} was committed by a different write",
                    chunk, new_version
                ),
            );
        }

        let staged = match state.prepared.get(&hash) {
            Some(staged) => staged.clone(),
            None => {
                return make_error_msg(
                    ChunkCode::WRITE_NOT_STAGED,
                    format!("chunk {}: no staged write for hash {}", chunk, hash),
                );
            }
        };

        let base = state.committed.get(&old_version).ok_or_else(|| {
            Status::with_message(
                ChunkCode::VERSION_NOT_FOUND,
                format!("chunk {}: version {} is not committed here", chunk, old_version),
            )
        })?;

        let mut payload = base.data.to_vec();
        let start = staged.offset as usize;
        payload[start..start + staged.data.len()].copy_from_slice(&staged.data);

        state.committed.insert(
            new_version,
            CommittedPayload {
                hash,
                data: Bytes::from(payload),
            },
        );
        state.prepared.remove(&hash);
        Ok(())
    }

    /// Advance the reader-visible version and prune everything below it.
    ///
    /// Idempotent: when the visible version is already at or past
    /// `new_version` (a retried or superseded call) this succeeds without
    /// mutating. Otherwise the visible version must equal `old_version`.
    pub fn update_latest_version(
        &self,
        chunk: ChunkNum,
        old_version: Version,
        new_version: Version,
    ) -> Result<()> {
        if new_version < old_version {
            return make_error_msg(
                ChunkCode::INVALID_VERSION,
                format!(
                    "chunk {}: latest version may not move backwards ({} -> {})",
                    chunk, old_version, new_version
                ),
            );
        }

        let mut state = self
            .chunks
            .get_mut(&chunk)
            .ok_or_else(|| Self::not_found(chunk))?;

        if state.latest_visible >= new_version {
            return Ok(());
        }

        if state.latest_visible != old_version {
            return Err(Status::with_message(
                ChunkCode::STALE_VERSION,
                format!(
                    "chunk {}: visible version is {}, not {}",
                    chunk, state.latest_visible, old_version
                ),
            )
            .with_version(state.latest_visible));
        }

        if !state.committed.contains_key(&new_version) {
            return make_error_msg(
                ChunkCode::VERSION_NOT_FOUND,
                format!(
                    "chunk {}: cannot expose uncommitted version {}",
                    chunk, new_version
                ),
            );
        }

        state.latest_visible = new_version;
        let kept = state.committed.split_off(&new_version);
        state.committed = kept;
        Ok(())
    }

    /// Allocate a chunk, zero-padding `initial_data` to the chunk ceiling.
    pub fn add(&self, chunk: ChunkNum, initial_data: Bytes, initial_version: Version) -> Result<()> {
        if initial_version.is_any() {
            return make_error_msg(
                ChunkCode::INVALID_VERSION,
                format!("chunk {}: initial version must be positive", chunk),
            );
        }
        self.check_bounds(chunk, 0, initial_data.len())?;

        match self.chunks.entry(chunk) {
            dashmap::mapref::entry::Entry::Occupied(_) => make_error_msg(
                ChunkCode::CHUNK_EXISTS,
                format!("chunk {} already exists", chunk),
            ),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let hash = CommitHash::digest(0, &initial_data);
                let mut payload = vec![0u8; self.max_chunk_size as usize];
                payload[..initial_data.len()].copy_from_slice(&initial_data);

                let mut committed = BTreeMap::new();
                committed.insert(
                    initial_version,
                    CommittedPayload {
                        hash,
                        data: Bytes::from(payload),
                    },
                );
                slot.insert(ChunkState {
                    committed,
                    latest_visible: initial_version,
                    prepared: HashMap::new(),
                });
                Ok(())
            }
        }
    }

    /// Remove the chunk iff `version` is the visible version and no newer
    /// version has been committed.
    pub fn delete(&self, chunk: ChunkNum, version: Version) -> Result<()> {
        let mut conflict = None;
        let removed = self.chunks.remove_if(&chunk, |_, state| {
            let newest = state.committed.keys().next_back().copied();
            if state.latest_visible == version && newest.map_or(true, |n| n <= version) {
                true
            } else {
                conflict = Some(state.latest_visible);
                false
            }
        });

        match (removed, conflict) {
            (Some(_), _) => Ok(()),
            (None, Some(visible)) => Err(Status::with_message(
                ChunkCode::DELETE_CONFLICT,
                format!(
                    "chunk {}: delete at {} conflicts with visible {}",
                    chunk, version, visible
                ),
            )
            .with_version(visible)),
            (None, None) => Err(Self::not_found(chunk)),
        }
    }

    /// Fetch the full committed payload for a specific version (healing).
    pub fn read_version(&self, chunk: ChunkNum, version: Version) -> Result<Bytes> {
        let state = self.chunks.get(&chunk).ok_or_else(|| Self::not_found(chunk))?;
        state
            .committed
            .get(&version)
            .map(|p| p.data.clone())
            .ok_or_else(|| {
                Status::with_message(
                    ChunkCode::VERSION_NOT_FOUND,
                    format!("chunk {}: version {} is not committed here", chunk, version),
                )
            })
    }

    /// Enumerate `(chunk, visible version)` in unspecified order.
    pub fn list_all_chunks(&self) -> Vec<ChunkVersion> {
        self.chunks
            .iter()
            .map(|entry| ChunkVersion {
                chunk: *entry.key(),
                version: entry.value().latest_visible,
            })
            .collect()
    }

    /// Drop staged writes older than `ttl`. Returns how many were dropped.
    pub fn sweep_expired_prepared(&self, ttl: Duration) -> usize {
        let cutoff = Instant::now() - ttl;
        let mut dropped = 0;
        for mut entry in self.chunks.iter_mut() {
            let before = entry.prepared.len();
            entry.prepared.retain(|_, w| w.staged_at > cutoff);
            dropped += before - entry.prepared.len();
        }
        dropped
    }

    /// Approximate bytes of storage in use (committed plus staged).
    pub fn storage_used(&self) -> u64 {
        self.chunks.iter().map(|entry| entry.bytes_used()).sum()
    }

    /// Number of chunks currently held.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
