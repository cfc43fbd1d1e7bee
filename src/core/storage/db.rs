// src/core/storage/db.rs

//! The sharded, in-memory key space.
//!
//! Keys are distributed across a fixed number of shards, each behind its own
//! `tokio::sync::Mutex`, so unrelated keys never contend on the same lock.
//! Command handlers that only ever touch one key (the overwhelming majority
//! of this server's command set) take exactly one shard lock for the
//! duration of the command.

use super::value::StoredValue;
use bytes::Bytes;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

pub const NUM_SHARDS: usize = 16;

#[derive(Debug, Default)]
pub struct Shard {
    entries: Mutex<HashMap<Bytes, StoredValue>>,
}

impl Shard {
    pub async fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, StoredValue>> {
        self.entries.lock().await
    }
}

/// The full key space. Cheap to clone: every field is `Arc`-backed so a
/// clone shares the same shards rather than copying data.
#[derive(Debug, Clone)]
pub struct Db {
    shards: Vec<Arc<Shard>>,
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl Db {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Arc::new(Shard::default())).collect();
        Self { shards }
    }

    pub fn shard_index(key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    pub fn shard_for(&self, key: &[u8]) -> &Arc<Shard> {
        &self.shards[Self::shard_index(key)]
    }

    /// Locks and returns the shard holding `key`. The guard is scoped to the
    /// caller, matching the "one shard lock per single-key command" pattern
    /// used throughout the command implementations.
    pub async fn lock_shard(&self, key: &[u8]) -> MutexGuard<'_, HashMap<Bytes, StoredValue>> {
        self.shard_for(key).lock().await
    }

    /// Removes a key if present and not already expired, returning whether
    /// anything was removed.
    pub async fn del(&self, key: &[u8]) -> bool {
        let mut shard = self.lock_shard(key).await;
        match shard.remove(key) {
            Some(v) => !v.is_expired(Instant::now()),
            None => false,
        }
    }

    /// Removes `key` from `shard` if its expiry has passed, and reports
    /// whether the key is now absent (either because it expired here or was
    /// never present). Passive expiry: entries are only purged when looked
    /// up, not proactively swept.
    pub fn expire_if_needed(shard: &mut HashMap<Bytes, StoredValue>, key: &[u8]) -> bool {
        let expired = shard.get(key).is_some_and(|v| v.is_expired(Instant::now()));
        if expired {
            shard.remove(key);
        }
        !shard.contains_key(key)
    }
}
