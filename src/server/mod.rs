// src/server/mod.rs

//! The TCP accept loop and per-connection task spawning.

use crate::connection::ConnectionHandler;
use crate::core::replication::run_replica_worker;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Session ID 0 is reserved for a replica worker's own in-process command
/// application (`core::replication::replica`); real client connections
/// start counting from 1.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Binds the listening socket, optionally starts the replica worker when
/// `--replicaof` was given, and serves connections until the process exits.
/// A bind failure is returned to the caller rather than handled here; the
/// `#[tokio::main]` entry point exits non-zero on any `Err`.
pub async fn run(state: Arc<ServerState>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    if let Some((host, port)) = state.config.replica_of.clone() {
        let replica_state = state.clone();
        tokio::spawn(async move {
            run_replica_worker(replica_state, host, port).await;
        });
    }

    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };
        let state = state.clone();
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let mut handler = ConnectionHandler::new(socket, addr, state, session_id);
            if let Err(e) = handler.run().await {
                warn!("connection {addr} ended with error: {e}");
            }
        });
    }
}
