// src/core/commands/string.rs

//! `SET`, `GET`, `INCR`, and `TYPE`.

use super::{arg_bytes, arg_str, arity_range, Command, WriteOutcome};
use crate::core::error::ServerError;
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::storage::{DataValue, StoredValue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn parse_set(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_range(args, 2, 4, "set")?;
    let key = arg_bytes(&args[0])?;
    let value = arg_bytes(&args[1])?;
    let px = if args.len() == 4 {
        let opt = arg_str(&args[2])?;
        if !opt.eq_ignore_ascii_case("px") {
            return Err(ServerError::Protocol(format!("unsupported SET option '{opt}'")));
        }
        let ms: u64 = arg_str(&args[3])?
            .parse()
            .map_err(|_| ServerError::NotInteger)?;
        Some(ms)
    } else if args.len() == 3 {
        return Err(ServerError::WrongArity("set"));
    } else {
        None
    };
    Ok(Command::Set { key, value, px })
}

pub fn parse_get(args: &[RespFrame]) -> Result<Command, ServerError> {
    super::arity_exact(args, 1, "get")?;
    Ok(Command::Get(arg_bytes(&args[0])?))
}

pub fn parse_incr(args: &[RespFrame]) -> Result<Command, ServerError> {
    super::arity_exact(args, 1, "incr")?;
    Ok(Command::Incr(arg_bytes(&args[0])?))
}

pub fn parse_type(args: &[RespFrame]) -> Result<Command, ServerError> {
    super::arity_exact(args, 1, "type")?;
    Ok(Command::Type(arg_bytes(&args[0])?))
}

pub async fn exec_set(
    state: &Arc<ServerState>,
    key: &Bytes,
    value: &Bytes,
    px: Option<u64>,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let mut shard = state.db.lock_shard(key).await;
    let stored = match px {
        Some(ms) => StoredValue::with_expiry(
            DataValue::Str(value.clone()),
            Instant::now() + Duration::from_millis(ms),
        ),
        None => StoredValue::new(DataValue::Str(value.clone())),
    };
    shard.insert(key.clone(), stored);
    drop(shard);

    let mut propagate = vec![RespFrame::bulk(&b"SET"[..]), RespFrame::BulkString(key.clone()), RespFrame::BulkString(value.clone())];
    if let Some(ms) = px {
        propagate.push(RespFrame::bulk(&b"PX"[..]));
        propagate.push(RespFrame::bulk(ms.to_string().into_bytes()));
    }
    Ok((RespFrame::ok(), WriteOutcome::single(RespFrame::Array(propagate))))
}

pub async fn exec_get(
    state: &Arc<ServerState>,
    key: &Bytes,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let mut shard = state.db.lock_shard(key).await;
    if crate::core::storage::Db::expire_if_needed(&mut shard, key) {
        return Ok((RespFrame::NullBulkString, WriteOutcome::DidNotWrite));
    }
    match shard.get(key.as_ref()) {
        Some(stored) => match &stored.data {
            DataValue::Str(s) => Ok((RespFrame::BulkString(s.clone()), WriteOutcome::DidNotWrite)),
            _ => Err(ServerError::WrongType),
        },
        None => Ok((RespFrame::NullBulkString, WriteOutcome::DidNotWrite)),
    }
}

pub async fn exec_incr(
    state: &Arc<ServerState>,
    key: &Bytes,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let mut shard = state.db.lock_shard(key).await;
    crate::core::storage::Db::expire_if_needed(&mut shard, key);

    let current = match shard.get(key.as_ref()) {
        Some(stored) => match &stored.data {
            DataValue::Str(s) => std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(ServerError::NotInteger)?,
            _ => return Err(ServerError::WrongType),
        },
        None => 0,
    };
    let next = current.checked_add(1).ok_or(ServerError::NotInteger)?;
    let expiry = shard.get(key.as_ref()).and_then(|s| s.expiry);
    let mut stored = StoredValue::new(DataValue::Str(Bytes::from(next.to_string())));
    stored.expiry = expiry;
    shard.insert(key.clone(), stored);
    drop(shard);

    Ok((
        RespFrame::Integer(next),
        WriteOutcome::single(RespFrame::Array(vec![
            RespFrame::bulk(&b"SET"[..]),
            RespFrame::BulkString(key.clone()),
            RespFrame::bulk(next.to_string().into_bytes()),
        ])),
    ))
}

pub async fn exec_type(
    state: &Arc<ServerState>,
    key: &Bytes,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let mut shard = state.db.lock_shard(key).await;
    if crate::core::storage::Db::expire_if_needed(&mut shard, key) {
        return Ok((RespFrame::SimpleString("none".into()), WriteOutcome::DidNotWrite));
    }
    let name = shard
        .get(key.as_ref())
        .map(|s| s.data.type_name())
        .unwrap_or("none");
    Ok((RespFrame::SimpleString(name.into()), WriteOutcome::DidNotWrite))
}
