// tests/replication_test.rs
//
// End-to-end replication tests driven over real TCP sockets: a primary
// `ServerState` served by the ordinary connection-handler accept loop, and
// either a raw handshake client or the actual replica worker dialing in.

use bytes::{Bytes, BytesMut};
use keylin::config::Config;
use keylin::connection::ConnectionHandler;
use keylin::core::protocol::RespFrame;
use keylin::core::replication::{run_replica_worker, EMPTY_SNAPSHOT};
use keylin::core::state::ServerState;
use keylin::core::storage::{DataValue, StoredValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_primary() -> (Arc<ServerState>, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = Config {
        port,
        replica_of: None,
        run_id: "f".repeat(40),
    };
    let state = Arc::new(ServerState::new(config));
    let accept_state = state.clone();
    tokio::spawn(async move {
        let next_id = AtomicU64::new(1);
        loop {
            let Ok((socket, addr)) = listener.accept().await else {
                return;
            };
            let state = accept_state.clone();
            let session_id = next_id.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let _ = ConnectionHandler::new(socket, addr, state, session_id).run().await;
            });
        }
    });
    (state, port)
}

async fn read_exact_frame(stream: &mut TcpStream) -> RespFrame {
    let mut buf = BytesMut::with_capacity(256);
    loop {
        if let Some((frame, consumed)) = RespFrame::parse(&buf).unwrap() {
            let _ = consumed;
            return frame;
        }
        let mut tmp = [0u8; 256];
        let n = stream.read(&mut tmp).await.unwrap();
        buf.extend_from_slice(&tmp[..n]);
    }
}

async fn send_command(stream: &mut TcpStream, parts: &[&str]) {
    let frame = RespFrame::Array(
        parts
            .iter()
            .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p.as_bytes())))
            .collect(),
    );
    stream.write_all(&frame.encode_to_vec()).await.unwrap();
}

/// Drives the full-resync handshake by hand and checks the exact wire shape
/// of the snapshot transfer: a `+FULLRESYNC <id> <offset>` line followed by
/// a `$88\r\n`-prefixed payload with no trailing CRLF.
#[tokio::test]
async fn psync_full_resync_sends_the_fixed_empty_snapshot() {
    let (_state, port) = spawn_primary().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    send_command(&mut stream, &["PING"]).await;
    assert_eq!(read_exact_frame(&mut stream).await, RespFrame::SimpleString("PONG".into()));

    send_command(&mut stream, &["REPLCONF", "listening-port", "1"]).await;
    assert_eq!(read_exact_frame(&mut stream).await, RespFrame::ok());

    send_command(&mut stream, &["REPLCONF", "capa", "psync2"]).await;
    assert_eq!(read_exact_frame(&mut stream).await, RespFrame::ok());

    send_command(&mut stream, &["PSYNC", "?", "-1"]).await;
    let RespFrame::SimpleString(fullresync) = read_exact_frame(&mut stream).await else {
        panic!("expected +FULLRESYNC simple string");
    };
    assert!(fullresync.starts_with("FULLRESYNC "));

    // The snapshot header and payload have no trailing CRLF, so they must be
    // read off the raw socket rather than through the frame parser.
    let header = format!("${}\r\n", EMPTY_SNAPSHOT.len());
    let mut expected = header.into_bytes();
    expected.extend_from_slice(&EMPTY_SNAPSHOT);

    let mut got = vec![0u8; expected.len()];
    stream.read_exact(&mut got).await.unwrap();
    assert_eq!(got, expected);
}

/// A real replica worker dials in, completes the handshake, and then applies
/// a `SET` propagated after a plain client writes it to the primary.
#[tokio::test]
async fn replica_worker_applies_propagated_writes() {
    let (primary_state, port) = spawn_primary().await;

    let replica_config = Config {
        port: 0,
        replica_of: Some(("127.0.0.1".to_string(), port)),
        run_id: "a".repeat(40),
    };
    let replica_state = Arc::new(ServerState::new(replica_config));
    let worker_state = replica_state.clone();
    tokio::spawn(async move {
        run_replica_worker(worker_state, "127.0.0.1".to_string(), port).await;
    });

    // Give the handshake time to complete before writing anything.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    send_command(&mut client, &["SET", "k", "v"]).await;
    assert_eq!(read_exact_frame(&mut client).await, RespFrame::ok());

    let key = Bytes::from_static(b"k");
    let mut applied = false;
    for _ in 0..50 {
        {
            let shard = replica_state.db.shard_for(&key).lock().await;
            if let Some(StoredValue { data: DataValue::Str(v), .. }) = shard.get(key.as_ref()) {
                assert_eq!(v, &Bytes::from_static(b"v"));
                applied = true;
            }
        }
        if applied {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(applied, "replica never applied the propagated SET");

    assert_eq!(
        primary_state.replication.master_repl_offset.load(Ordering::SeqCst),
        replica_state.replication.master_repl_offset.load(Ordering::SeqCst),
    );
}

/// A write sent directly to a replica is rejected rather than applied.
#[tokio::test]
async fn a_replica_rejects_direct_client_writes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = Config {
        port,
        replica_of: Some(("127.0.0.1".to_string(), 1)),
        run_id: "b".repeat(40),
    };
    let state = Arc::new(ServerState::new(config));
    tokio::spawn(async move {
        let Ok((socket, addr)) = listener.accept().await else {
            return;
        };
        let _ = ConnectionHandler::new(socket, addr, state, 1).run().await;
    });

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    send_command(&mut client, &["SET", "k", "v"]).await;
    let RespFrame::Error(msg) = read_exact_frame(&mut client).await else {
        panic!("expected an error reply");
    };
    assert!(msg.starts_with("READONLY"));
}
