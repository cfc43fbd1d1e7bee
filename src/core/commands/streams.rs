// src/core/commands/streams.rs

//! `XADD`, `XRANGE`, and `XREAD`.

use super::{arg_bytes, arg_str, arity_at_least, arity_exact, Command, WriteOutcome};
use crate::core::error::ServerError;
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::storage::{DataValue, Stream, StreamEntry, StreamId, StreamIdSpec, StoredValue, XReadFromId};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn parse_xadd(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_at_least(args, 4, "xadd")?;
    if (args.len() - 2) % 2 != 0 {
        return Err(ServerError::WrongArity("xadd"));
    }
    let key = arg_bytes(&args[0])?;
    let id_spec = StreamIdSpec::parse(&arg_str(&args[1])?)
        .map_err(|e| ServerError::Protocol(e.to_string()))?;
    let mut fields = Vec::with_capacity((args.len() - 2) / 2);
    let mut i = 2;
    while i < args.len() {
        fields.push((arg_bytes(&args[i])?, arg_bytes(&args[i + 1])?));
        i += 2;
    }
    Ok(Command::XAdd { key, id_spec, fields })
}

pub fn parse_xrange(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_exact(args, 3, "xrange")?;
    let key = arg_bytes(&args[0])?;
    let lo = parse_range_bound(&arg_str(&args[1])?, false)?;
    let hi = parse_range_bound(&arg_str(&args[2])?, true)?;
    Ok(Command::XRange { key, lo, hi })
}

/// Parses one end of an `XRANGE` bound. `-`/`+` mean the smallest/largest
/// possible ID; a bare millisecond timestamp without a sequence is widened
/// to `ms-0` for a lower bound or `ms-u64::MAX` for an upper bound, so e.g.
/// `XRANGE k 5 5` matches every entry timestamped at `5`.
fn parse_range_bound(raw: &str, is_upper: bool) -> Result<StreamId, ServerError> {
    if raw == "-" {
        return Ok(StreamId::MIN);
    }
    if raw == "+" {
        return Ok(StreamId::MAX);
    }
    if let Ok(ms) = raw.parse::<u64>() {
        return Ok(StreamId::new(ms, if is_upper { u64::MAX } else { 0 }));
    }
    raw.parse()
        .map_err(|e: &'static str| ServerError::Protocol(e.to_string()))
}

pub fn parse_xread(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_at_least(args, 3, "xread")?;
    let mut idx = 0;
    let mut block_ms = None;
    if arg_str(&args[idx])?.eq_ignore_ascii_case("block") {
        let ms: u64 = arg_str(&args[idx + 1])?
            .parse()
            .map_err(|_| ServerError::NotInteger)?;
        block_ms = Some(ms);
        idx += 2;
    }
    if !arg_str(&args[idx])?.eq_ignore_ascii_case("streams") {
        return Err(ServerError::Protocol("XREAD expects STREAMS keyword".into()));
    }
    idx += 1;
    let remaining = &args[idx..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return Err(ServerError::WrongArity("xread"));
    }
    let n = remaining.len() / 2;
    let keys = remaining[..n].iter().map(arg_bytes).collect::<Result<Vec<_>, _>>()?;
    let ids = remaining[n..]
        .iter()
        .map(|f| XReadFromId::parse(&arg_str(f)?).map_err(|e| ServerError::Protocol(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Command::XRead { block_ms, keys, ids })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub async fn exec_xadd(
    state: &Arc<ServerState>,
    key: &Bytes,
    id_spec: StreamIdSpec,
    fields: &[(Bytes, Bytes)],
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let assigned_id = {
        let mut shard = state.db.lock_shard(key).await;
        crate::core::storage::Db::expire_if_needed(&mut shard, key);
        let entry = shard
            .entry(key.clone())
            .or_insert_with(|| StoredValue::new(DataValue::Stream(Stream::new())));
        let stream = match &mut entry.data {
            DataValue::Stream(stream) => stream,
            _ => return Err(ServerError::WrongType),
        };
        stream
            .add_entry(id_spec, fields.to_vec(), now_ms())
            .map_err(ServerError::XaddIdOrder)?
    };

    state.stream_blocker_manager.notify(key).await;

    let mut propagate = vec![
        RespFrame::bulk(&b"XADD"[..]),
        RespFrame::BulkString(key.clone()),
        RespFrame::bulk(assigned_id.to_string().into_bytes()),
    ];
    for (f, v) in fields {
        propagate.push(RespFrame::BulkString(f.clone()));
        propagate.push(RespFrame::BulkString(v.clone()));
    }
    Ok((
        RespFrame::bulk(assigned_id.to_string().into_bytes()),
        WriteOutcome::single(RespFrame::Array(propagate)),
    ))
}

fn entries_to_frame(entries: Vec<StreamEntry>) -> RespFrame {
    RespFrame::Array(
        entries
            .into_iter()
            .map(|e| {
                let mut fields = Vec::with_capacity(e.fields.len() * 2);
                for (f, v) in e.fields {
                    fields.push(RespFrame::BulkString(f));
                    fields.push(RespFrame::BulkString(v));
                }
                RespFrame::Array(vec![
                    RespFrame::bulk(e.id.to_string().into_bytes()),
                    RespFrame::Array(fields),
                ])
            })
            .collect(),
    )
}

pub async fn exec_xrange(
    state: &Arc<ServerState>,
    key: &Bytes,
    lo: StreamId,
    hi: StreamId,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let shard = state.db.lock_shard(key).await;
    let entries = match shard.get(key.as_ref()) {
        Some(StoredValue { data: DataValue::Stream(stream), .. }) => stream.range(lo, hi),
        Some(_) => return Err(ServerError::WrongType),
        None => Vec::new(),
    };
    Ok((entries_to_frame(entries), WriteOutcome::DidNotWrite))
}

/// Resolves each key's `XReadFromId` to a concrete `StreamId` once, at
/// request time: `$` becomes the key's current `last_id` (or `StreamId::MIN`
/// for a key that doesn't exist yet), and an explicit ID passes through
/// unchanged. This runs once before the scan loop below, never per
/// iteration, so a blocked `$` read keeps watching from the ID that was
/// current when the request arrived rather than drifting forward on every
/// wakeup.
async fn resolve_since_ids(
    state: &Arc<ServerState>,
    keys: &[Bytes],
    ids: &[XReadFromId],
) -> Result<Vec<StreamId>, ServerError> {
    let mut resolved = Vec::with_capacity(ids.len());
    for (key, id) in keys.iter().zip(ids.iter()) {
        let since = match id {
            XReadFromId::Explicit(id) => *id,
            XReadFromId::Last => {
                let shard = state.db.lock_shard(key).await;
                match shard.get(key.as_ref()) {
                    Some(StoredValue { data: DataValue::Stream(stream), .. }) => stream.last_id(),
                    Some(_) => return Err(ServerError::WrongType),
                    None => StreamId::MIN,
                }
            }
        };
        resolved.push(since);
    }
    Ok(resolved)
}

/// One non-blocking scan of every watched key for entries newer than its
/// resolved `since` ID.
async fn scan_streams(
    state: &Arc<ServerState>,
    keys: &[Bytes],
    since: &[StreamId],
) -> Result<Vec<(Bytes, Vec<StreamEntry>)>, ServerError> {
    let mut per_key = Vec::with_capacity(keys.len());
    for (key, since) in keys.iter().zip(since.iter()) {
        let shard = state.db.lock_shard(key).await;
        let entries = match shard.get(key.as_ref()) {
            Some(StoredValue { data: DataValue::Stream(stream), .. }) => stream.read_after(*since),
            Some(_) => return Err(ServerError::WrongType),
            None => Vec::new(),
        };
        if !entries.is_empty() {
            per_key.push((key.clone(), entries));
        }
    }
    Ok(per_key)
}

fn xread_reply(per_key: Vec<(Bytes, Vec<StreamEntry>)>) -> RespFrame {
    RespFrame::Array(
        per_key
            .into_iter()
            .map(|(key, entries)| RespFrame::Array(vec![RespFrame::BulkString(key), entries_to_frame(entries)]))
            .collect(),
    )
}

/// Reads entries newer than each key's given ID; if none are found and
/// `block_ms` was given, parks the caller on every watched key until a new
/// entry arrives on any of them (or the timeout elapses), then re-scans.
pub async fn exec_xread(
    state: &Arc<ServerState>,
    session_id: u64,
    block_ms: Option<u64>,
    keys: &[Bytes],
    ids: &[XReadFromId],
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let since = resolve_since_ids(state, keys, ids).await?;

    loop {
        let per_key = scan_streams(state, keys, &since).await?;
        if !per_key.is_empty() {
            return Ok((xread_reply(per_key), WriteOutcome::DidNotWrite));
        }

        let Some(block_ms) = block_ms else {
            return Ok((RespFrame::NullArray, WriteOutcome::DidNotWrite));
        };

        // Register before re-scanning, not after: the scan above may have
        // released its last shard lock before an XADD landed and notified
        // waiters already registered at that time, which would otherwise be
        // missed entirely. Re-scanning once more right after registering
        // catches any entry that arrived in that gap, because notify() only
        // ever runs after the entry that triggers it has already been
        // committed and its shard lock released.
        let receiver = state.stream_blocker_manager.register(keys, session_id);
        let per_key = scan_streams(state, keys, &since).await?;
        if !per_key.is_empty() {
            state.stream_blocker_manager.remove_waiter(keys, session_id);
            return Ok((xread_reply(per_key), WriteOutcome::DidNotWrite));
        }

        let woke = if block_ms == 0 {
            receiver.await.is_ok()
        } else {
            matches!(
                tokio::time::timeout(Duration::from_millis(block_ms), receiver).await,
                Ok(Ok(()))
            )
        };
        if !woke {
            state.stream_blocker_manager.remove_waiter(keys, session_id);
            return Ok((RespFrame::NullArray, WriteOutcome::DidNotWrite));
        }
        // Woken (or spuriously notified); loop around and re-scan every
        // watched key rather than assume which one changed.
    }
}
