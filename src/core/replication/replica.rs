// src/core/replication/replica.rs

//! The replica side: dial a primary, perform the handshake, then apply its
//! command stream while tracking the exact wire-byte replication offset.

use crate::core::commands::Command;
use crate::core::error::ServerError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::state::ServerState;
use bytes::{Buf, BytesMut};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{error, info, warn};

/// Runs forever: connects to `host:port`, replicates until the link drops,
/// then reconnects after a short backoff. Exits the process if the very
/// first handshake attempt fails.
pub async fn run_replica_worker(state: Arc<ServerState>, host: String, port: u16) {
    let mut first_attempt = true;
    loop {
        match connect_and_replicate(&state, &host, &port).await {
            Ok(()) => info!("replication link to {host}:{port} closed, reconnecting"),
            Err(e) => {
                error!("replication with {host}:{port} failed: {e}");
                if first_attempt {
                    std::process::exit(1);
                }
            }
        }
        first_attempt = false;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn connect_and_replicate(
    state: &Arc<ServerState>,
    host: &str,
    port: &u16,
) -> Result<(), ServerError> {
    let stream = TcpStream::connect((host, *port)).await?;
    let mut framed = Framed::new(stream, RespFrameCodec);

    send(&mut framed, &["PING"]).await?;
    expect_simple(&mut framed).await?;

    send(
        &mut framed,
        &["REPLCONF", "listening-port", &state.config.port.to_string()],
    )
    .await?;
    expect_simple(&mut framed).await?;

    send(&mut framed, &["REPLCONF", "capa", "psync2"]).await?;
    expect_simple(&mut framed).await?;

    send(&mut framed, &["PSYNC", "?", "-1"]).await?;
    let fullresync = expect_simple(&mut framed).await?;
    if !fullresync.starts_with("FULLRESYNC") {
        return Err(ServerError::Protocol(format!(
            "expected FULLRESYNC, got '{fullresync}'"
        )));
    }
    info!("received {fullresync}");

    // The snapshot's bulk string has no trailing CRLF, which the frame
    // codec cannot express, so the rest of the handshake and the entire
    // streaming phase read the raw socket directly. Any bytes the codec
    // had already buffered past the FULLRESYNC line must be recovered
    // first so nothing already off the wire is lost.
    let mut carry = BytesMut::from(&framed.read_buffer()[..]);
    let socket = framed.into_inner();
    let (mut read_half, mut write_half) = socket.into_split();

    read_snapshot(&mut read_half, &mut carry).await?;

    state.replication.master_repl_offset.store(0, Ordering::SeqCst);
    info!("full resync complete, entering streaming mode");

    stream_and_apply(state, &mut read_half, &mut write_half, carry).await
}

async fn send(
    framed: &mut Framed<TcpStream, RespFrameCodec>,
    parts: &[&str],
) -> Result<(), ServerError> {
    let frame = RespFrame::Array(
        parts
            .iter()
            .map(|p| RespFrame::BulkString(bytes::Bytes::copy_from_slice(p.as_bytes())))
            .collect(),
    );
    framed.send(frame).await
}

async fn expect_simple(framed: &mut Framed<TcpStream, RespFrameCodec>) -> Result<String, ServerError> {
    match framed.next().await {
        Some(Ok(RespFrame::SimpleString(s))) => Ok(s),
        Some(Ok(RespFrame::Error(e))) => Err(ServerError::Protocol(e)),
        Some(Ok(other)) => Err(ServerError::Protocol(format!("unexpected reply {other:?}"))),
        Some(Err(e)) => Err(e),
        None => Err(ServerError::Protocol("connection closed during handshake".into())),
    }
}

/// Reads the `$<len>\r\n<len bytes, no trailing CRLF>` snapshot payload and
/// discards it; reconstructing a dataset from it is out of scope.
async fn read_snapshot(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    carry: &mut BytesMut,
) -> Result<(), ServerError> {
    let header_end = loop {
        if let Some(pos) = carry.windows(2).position(|w| w == b"\r\n") {
            break pos;
        }
        fill_more(read_half, carry).await?;
    };
    let header = std::str::from_utf8(&carry[..header_end])
        .map_err(|_| ServerError::Protocol("invalid snapshot header".into()))?;
    let len: usize = header
        .strip_prefix('$')
        .ok_or_else(|| ServerError::Protocol("snapshot header missing '$'".into()))?
        .parse()
        .map_err(|_| ServerError::Protocol("invalid snapshot length".into()))?;
    carry.advance(header_end + 2);

    while carry.len() < len {
        fill_more(read_half, carry).await?;
    }
    carry.advance(len);
    Ok(())
}

async fn fill_more(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    carry: &mut BytesMut,
) -> Result<(), ServerError> {
    let mut tmp = [0u8; 8192];
    let n = read_half.read(&mut tmp).await?;
    if n == 0 {
        return Err(ServerError::Protocol(
            "connection closed while reading snapshot".into(),
        ));
    }
    carry.extend_from_slice(&tmp[..n]);
    Ok(())
}

/// Streaming-apply loop. Each inbound frame's wire byte length (as measured
/// from the buffer, not re-derived by re-encoding) is added to
/// `master_repl_offset` immediately after it is parsed. `REPLCONF GETACK *`
/// replies with the offset *including* its own bytes.
async fn stream_and_apply(
    state: &Arc<ServerState>,
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    mut buf: BytesMut,
) -> Result<(), ServerError> {
    loop {
        loop {
            let Some((frame, consumed)) = RespFrame::parse(&buf)? else {
                break;
            };
            buf.advance(consumed);
            state
                .replication
                .master_repl_offset
                .fetch_add(consumed as u64, Ordering::SeqCst);

            apply_inbound_frame(state, frame, write_half).await?;
        }

        let mut tmp = [0u8; 8192];
        let n = read_half.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&tmp[..n]);
    }
}

async fn apply_inbound_frame(
    state: &Arc<ServerState>,
    frame: RespFrame,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
) -> Result<(), ServerError> {
    let RespFrame::Array(items) = frame else {
        return Err(ServerError::Protocol(
            "replication stream frame must be an array".into(),
        ));
    };
    let Some((name_frame, args)) = items.split_first() else {
        return Err(ServerError::Protocol("empty command array".into()));
    };
    let name = crate::core::commands::arg_str(name_frame)?.to_ascii_lowercase();
    let command = Command::parse(&name, args)?;

    if matches!(command, Command::ReplconfGetAck) {
        let offset = state.replication.master_repl_offset.load(Ordering::SeqCst);
        let reply = RespFrame::Array(vec![
            RespFrame::bulk(&b"REPLCONF"[..]),
            RespFrame::bulk(&b"ACK"[..]),
            RespFrame::bulk(offset.to_string().into_bytes()),
        ]);
        write_half.write_all(&reply.encode_to_vec()).await?;
        return Ok(());
    }

    // Applying the primary's commands must not re-propagate them downstream:
    // a follower does not propagate its own client writes, and it does not
    // re-propagate the primary's either, since cascading replication is out
    // of scope. Using session ID 0, reserved for the
    // replication link itself, keeps any blocking-wakeup bookkeeping
    // distinct from real client sessions.
    let _ = command.execute(state, 0).await?;
    Ok(())
}
