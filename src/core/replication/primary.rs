// src/core/replication/primary.rs

//! The primary side of a replica link: respond to `PSYNC` with a full
//! resync, then fan out every subsequently propagated write command.

use super::snapshot::EMPTY_SNAPSHOT;
use crate::core::error::ServerError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::state::ServerState;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Takes ownership of a connection that just issued `PSYNC ? -1`, performs
/// the full-resync handshake, and then streams propagated writes to it
/// until the link breaks. Runs for the lifetime of the replica connection.
pub async fn handle_psync_handoff(
    state: Arc<ServerState>,
    session_id: u64,
    framed: Framed<TcpStream, RespFrameCodec>,
) -> Result<(), ServerError> {
    let socket = framed.into_inner();
    let (mut read_half, mut write_half) = socket.into_split();

    let offset = state
        .replication
        .master_repl_offset
        .load(std::sync::atomic::Ordering::SeqCst);
    let fullresync = format!("+FULLRESYNC {} {}\r\n", state.replication.run_id, offset);
    write_half.write_all(fullresync.as_bytes()).await?;

    // The snapshot bulk string header carries a length but the payload is
    // sent with no trailing CRLF, unlike every other bulk string on the
    // wire.
    write_half
        .write_all(format!("${}\r\n", EMPTY_SNAPSHOT.len()).as_bytes())
        .await?;
    write_half.write_all(&EMPTY_SNAPSHOT).await?;
    info!("replica {session_id} completed full resync");

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    state.replication.replica_links.insert(session_id, tx);

    // The replica may send REPLCONF ACK <offset> back upstream; this task
    // just drains and logs them; the primary does not require the acks to
    // make any forward-progress decisions in this server's feature set.
    let ack_reader = tokio::spawn(async move {
        let mut buf = bytes::BytesMut::with_capacity(4096);
        loop {
            let mut tmp = [0u8; 4096];
            let n = match read_half.read(&mut tmp).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&tmp[..n]);
            while let Ok(Some((frame, consumed))) = RespFrame::parse(&buf) {
                debug!("replica ack frame: {frame:?}");
                let _ = buf.split_to(consumed);
            }
        }
    });

    while let Some(bytes) = rx.recv().await {
        if write_half.write_all(&bytes).await.is_err() {
            break;
        }
    }

    ack_reader.abort();
    state.replication.replica_links.remove(&session_id);
    warn!("replica link {session_id} closed");
    Ok(())
}
