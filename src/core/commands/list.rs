// src/core/commands/list.rs

//! `LPUSH`, `RPUSH`, `LRANGE`, `LLEN`, `LPOP`, and `BLPOP`.

use super::{arg_bytes, arg_str, arity_at_least, arity_exact, arity_range, Command, WriteOutcome};
use crate::core::error::ServerError;
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::storage::{DataValue, StoredValue};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub fn parse_push(args: &[RespFrame], left: bool) -> Result<Command, ServerError> {
    let name = if left { "lpush" } else { "rpush" };
    arity_at_least(args, 2, name)?;
    let key = arg_bytes(&args[0])?;
    let values = args[1..].iter().map(arg_bytes).collect::<Result<Vec<_>, _>>()?;
    Ok(if left {
        Command::LPush { key, values }
    } else {
        Command::RPush { key, values }
    })
}

pub fn parse_lrange(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_exact(args, 3, "lrange")?;
    let key = arg_bytes(&args[0])?;
    let start: i64 = arg_str(&args[1])?.parse().map_err(|_| ServerError::NotInteger)?;
    let stop: i64 = arg_str(&args[2])?.parse().map_err(|_| ServerError::NotInteger)?;
    Ok(Command::LRange { key, start, stop })
}

pub fn parse_llen(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_exact(args, 1, "llen")?;
    Ok(Command::LLen(arg_bytes(&args[0])?))
}

pub fn parse_lpop(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_range(args, 1, 2, "lpop")?;
    let key = arg_bytes(&args[0])?;
    let count = args
        .get(1)
        .map(|f| arg_str(f)?.parse::<i64>().map_err(|_| ServerError::NotInteger))
        .transpose()?;
    Ok(Command::LPop { key, count })
}

pub fn parse_blpop(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_exact(args, 2, "blpop")?;
    let key = arg_bytes(&args[0])?;
    let timeout_secs: f64 = arg_str(&args[1])?
        .parse()
        .map_err(|_| ServerError::Protocol("invalid BLPOP timeout".into()))?;
    Ok(Command::BLPop { key, timeout_secs })
}

fn list_propagate_name(left: bool) -> &'static [u8] {
    if left { b"LPUSH" } else { b"RPUSH" }
}

pub async fn exec_push(
    state: &Arc<ServerState>,
    key: &Bytes,
    values: &[Bytes],
    left: bool,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    // Every value is always inserted into the list first, exactly as a
    // non-blocking client would see it; any blocked `BLPOP` waiters are
    // then served by popping straight back off the front and propagating
    // the equivalent `LPOP`. Doing it this way (rather than bypassing the
    // list for a waiter) keeps a replica's list converging to the same
    // final state as the primary's: it only ever needs to replay the exact
    // commands it was sent, never an implicit hand-off it can't see.
    let len = {
        let mut shard = state.db.lock_shard(key).await;
        crate::core::storage::Db::expire_if_needed(&mut shard, key);
        let entry = shard
            .entry(key.clone())
            .or_insert_with(|| StoredValue::new(DataValue::List(VecDeque::new())));
        let list = match &mut entry.data {
            DataValue::List(list) => list,
            _ => return Err(ServerError::WrongType),
        };
        if left {
            for v in values {
                list.push_front(v.clone());
            }
        } else {
            list.extend(values.iter().cloned());
        }
        list.len()
    };

    let mut propagate = vec![RespFrame::bulk(list_propagate_name(left)), RespFrame::BulkString(key.clone())];
    propagate.extend(values.iter().cloned().map(RespFrame::BulkString));

    // The triggering push must be propagated before any derived `LPOP`s
    // drain_waiters hands out, so a replica replaying the same frames in the
    // same order reaches the same final list. drain_waiters only returns the
    // frames; it never propagates itself, so this function is the single
    // place that decides their relative order.
    let mut frames = vec![RespFrame::Array(propagate)];
    frames.extend(drain_waiters(state, key).await);

    Ok((RespFrame::Integer(len as i64), WriteOutcome::Wrote(frames)))
}

/// After a push, hands the list's front value to any blocked `BLPOP`
/// waiters in FIFO order, one pop per waiter, returning the derived
/// `LPOP key` frame for each handoff in the order the waiters were served.
async fn drain_waiters(state: &Arc<ServerState>, key: &Bytes) -> Vec<RespFrame> {
    let mut derived = Vec::new();
    loop {
        let popped = {
            let mut shard = state.db.lock_shard(key).await;
            let Some(entry) = shard.get_mut(key.as_ref()) else {
                return derived;
            };
            let DataValue::List(list) = &mut entry.data else {
                return derived;
            };
            let Some(value) = list.pop_front() else {
                return derived;
            };
            let now_empty = list.is_empty();
            if now_empty {
                shard.remove(key.as_ref());
            }
            value
        };

        match state.blocker_manager.try_wake(key, popped).await {
            None => {
                derived.push(RespFrame::Array(vec![
                    RespFrame::bulk(&b"LPOP"[..]),
                    RespFrame::BulkString(key.clone()),
                ]));
            }
            Some(value) => {
                // No waiter was actually queued (it timed out or never
                // existed); put the value back at the front and stop.
                let mut shard = state.db.lock_shard(key).await;
                let entry = shard
                    .entry(key.clone())
                    .or_insert_with(|| StoredValue::new(DataValue::List(VecDeque::new())));
                if let DataValue::List(list) = &mut entry.data {
                    list.push_front(value);
                }
                return derived;
            }
        }
    }
}

pub async fn exec_lrange(
    state: &Arc<ServerState>,
    key: &Bytes,
    start: i64,
    stop: i64,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let mut shard = state.db.lock_shard(key).await;
    if crate::core::storage::Db::expire_if_needed(&mut shard, key) {
        return Ok((RespFrame::Array(vec![]), WriteOutcome::DidNotWrite));
    }
    let list = match shard.get(key.as_ref()) {
        Some(StoredValue { data: DataValue::List(list), .. }) => list,
        Some(_) => return Err(ServerError::WrongType),
        None => return Ok((RespFrame::Array(vec![]), WriteOutcome::DidNotWrite)),
    };
    let len = list.len() as i64;
    let (lo, hi) = normalize_range(start, stop, len);
    if lo > hi || lo >= len {
        return Ok((RespFrame::Array(vec![]), WriteOutcome::DidNotWrite));
    }
    let items = list
        .iter()
        .skip(lo as usize)
        .take((hi - lo + 1) as usize)
        .cloned()
        .map(RespFrame::BulkString)
        .collect();
    Ok((RespFrame::Array(items), WriteOutcome::DidNotWrite))
}

fn normalize_range(start: i64, stop: i64, len: i64) -> (i64, i64) {
    let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    (norm(start), norm(stop).min(len - 1))
}

pub async fn exec_llen(
    state: &Arc<ServerState>,
    key: &Bytes,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let mut shard = state.db.lock_shard(key).await;
    if crate::core::storage::Db::expire_if_needed(&mut shard, key) {
        return Ok((RespFrame::Integer(0), WriteOutcome::DidNotWrite));
    }
    let len = match shard.get(key.as_ref()) {
        Some(StoredValue { data: DataValue::List(list), .. }) => list.len(),
        Some(_) => return Err(ServerError::WrongType),
        None => 0,
    };
    Ok((RespFrame::Integer(len as i64), WriteOutcome::DidNotWrite))
}

pub async fn exec_lpop(
    state: &Arc<ServerState>,
    key: &Bytes,
    count: Option<i64>,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let mut shard = state.db.lock_shard(key).await;
    crate::core::storage::Db::expire_if_needed(&mut shard, key);
    let Some(entry) = shard.get_mut(key.as_ref()) else {
        let reply = if count.is_some() { RespFrame::NullArray } else { RespFrame::NullBulkString };
        return Ok((reply, WriteOutcome::DidNotWrite));
    };
    let list = match &mut entry.data {
        DataValue::List(list) => list,
        _ => return Err(ServerError::WrongType),
    };

    let n = count.unwrap_or(1).max(0) as usize;
    let mut popped = Vec::new();
    for _ in 0..n.max(1) {
        match list.pop_front() {
            Some(v) => popped.push(v),
            None => break,
        }
        if count.is_none() {
            break;
        }
    }
    let now_empty = list.is_empty();
    drop(shard);
    if now_empty {
        let mut shard = state.db.lock_shard(key).await;
        shard.remove(key.as_ref());
    }

    if popped.is_empty() {
        let reply = if count.is_some() { RespFrame::NullArray } else { RespFrame::NullBulkString };
        return Ok((reply, WriteOutcome::DidNotWrite));
    }

    let mut propagate = vec![RespFrame::bulk(&b"LPOP"[..]), RespFrame::BulkString(key.clone())];
    if let Some(c) = count {
        propagate.push(RespFrame::bulk(c.to_string().into_bytes()));
    }
    let outcome = WriteOutcome::single(RespFrame::Array(propagate));

    let reply = match count {
        Some(_) => RespFrame::Array(popped.into_iter().map(RespFrame::BulkString).collect()),
        None => RespFrame::BulkString(popped.into_iter().next().unwrap()),
    };
    Ok((reply, outcome))
}

/// `BLPOP key timeout`. The empty-check and waiter registration happen
/// under the same shard-lock critical section so a concurrent push can
/// never land in the gap between them; see `core::blocking` for the
/// invariant this relies on.
pub async fn exec_blpop(
    state: &Arc<ServerState>,
    session_id: u64,
    key: &Bytes,
    timeout_secs: f64,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let receiver = {
        let mut shard = state.db.lock_shard(key).await;
        crate::core::storage::Db::expire_if_needed(&mut shard, key);
        if let Some(entry) = shard.get_mut(key.as_ref()) {
            let list = match &mut entry.data {
                DataValue::List(list) => list,
                _ => return Err(ServerError::WrongType),
            };
            if let Some(value) = list.pop_front() {
                if list.is_empty() {
                    shard.remove(key.as_ref());
                }
                return Ok((
                    RespFrame::Array(vec![RespFrame::BulkString(key.clone()), RespFrame::BulkString(value)]),
                    WriteOutcome::single(RespFrame::Array(vec![
                        RespFrame::bulk(&b"LPOP"[..]),
                        RespFrame::BulkString(key.clone()),
                    ])),
                ));
            }
        }
        state.blocker_manager.register(key.clone(), session_id)
    };

    let value = if timeout_secs <= 0.0 {
        receiver.await.ok()
    } else {
        match tokio::time::timeout(Duration::from_secs_f64(timeout_secs), receiver).await {
            Ok(r) => r.ok(),
            Err(_) => {
                state.blocker_manager.remove_waiter(key, session_id);
                None
            }
        }
    };

    match value {
        Some(value) => Ok((
            RespFrame::Array(vec![RespFrame::BulkString(key.clone()), RespFrame::BulkString(value)]),
            // The value was handed directly from a pusher's shard-locked
            // critical section, which already propagated its own write;
            // this wakeup itself does not independently mutate state.
            WriteOutcome::DidNotWrite,
        )),
        None => Ok((RespFrame::NullArray, WriteOutcome::DidNotWrite)),
    }
}
