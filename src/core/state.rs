// src/core/state.rs

//! `ServerState`: the single shared handle passed to every connection task.

use crate::config::Config;
use crate::core::blocking::BlockerManager;
use crate::core::protocol::RespFrame;
use crate::core::storage::Db;
use crate::core::stream_blocking::StreamBlockerManager;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc;

/// Replication bookkeeping shared between the command dispatcher and the
/// replication subsystem. As a primary, `master_repl_offset` counts bytes
/// propagated to replicas; as a replica, it is updated by the replica
/// worker as it consumes the primary's command stream.
pub struct ReplicationState {
    pub run_id: String,
    pub master_repl_offset: AtomicU64,
    /// Set when started with `--replicaof`; `None` for a standalone/primary
    /// instance.
    pub replica_of: Option<(String, u16)>,
    /// One outbound channel per connected replica link, used to fan out
    /// propagated write commands in arrival order. Keyed by the session ID
    /// of the connection that issued `PSYNC`.
    pub replica_links: DashMap<u64, mpsc::UnboundedSender<Bytes>>,
}

impl ReplicationState {
    pub fn new(run_id: String, replica_of: Option<(String, u16)>) -> Self {
        Self {
            run_id,
            master_repl_offset: AtomicU64::new(0),
            replica_of,
            replica_links: DashMap::new(),
        }
    }

    /// True once this instance has been told to follow another via
    /// `--replicaof`; a replica never propagates its own clients' writes
    /// downstream.
    pub fn is_replica(&self) -> bool {
        self.replica_of.is_some()
    }

    /// Forwards `frame` to every connected replica link and advances the
    /// primary's replication offset by its encoded length.
    pub fn propagate(&self, frame: &RespFrame) {
        if self.is_replica() || self.replica_links.is_empty() {
            return;
        }
        let bytes = Bytes::from(frame.encode_to_vec());
        self.master_repl_offset
            .fetch_add(bytes.len() as u64, std::sync::atomic::Ordering::SeqCst);
        self.replica_links.retain(|_, tx| tx.send(bytes.clone()).is_ok());
    }
}

pub struct ServerState {
    pub db: Db,
    pub blocker_manager: BlockerManager,
    pub stream_blocker_manager: StreamBlockerManager,
    pub replication: ReplicationState,
    pub config: Config,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let run_id = config.run_id.clone();
        let replica_of = config.replica_of.clone();
        Self {
            db: Db::new(),
            blocker_manager: BlockerManager::new(),
            stream_blocker_manager: StreamBlockerManager::new(),
            replication: ReplicationState::new(run_id, replica_of),
            config,
        }
    }
}
