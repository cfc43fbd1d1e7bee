// src/core/commands/mod.rs

//! The command table: parsing client frames into a `Command`, the
//! `CommandFlags`/`WriteOutcome` bookkeeping used to decide replication
//! propagation, and the dispatcher that executes a parsed command against
//! shared server state.

mod generic;
mod list;
mod streams;
mod string;
mod transaction;

pub use transaction::TransactionState;

use crate::core::error::ServerError;
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use bitflags::bitflags;
use bytes::Bytes;
use std::sync::Arc;

bitflags! {
    /// Per-command metadata used by the dispatcher and by replication to
    /// decide whether a command's effect needs to be propagated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u8 {
        const WRITE    = 0b0001;
        const READONLY = 0b0010;
        const ADMIN    = 0b0100;
    }
}

/// Whether executing a command changed server state, and if so, the exact
/// frames to forward to connected replicas, in commit order. Carrying the
/// resolved frames (rather than re-deriving them from the parsed `Command`)
/// lets a command like `XADD *` propagate the concrete ID it generated
/// instead of the non-deterministic `*` the client sent, and lets a command
/// whose effect touches more than one logical write (a push that also wakes
/// blocked poppers) propagate every one of them in the order they actually
/// committed.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    DidNotWrite,
    Wrote(Vec<RespFrame>),
}

impl WriteOutcome {
    /// Convenience for the common case of a single propagated frame.
    pub fn single(frame: RespFrame) -> Self {
        WriteOutcome::Wrote(vec![frame])
    }

    pub fn merge(self, other: WriteOutcome) -> WriteOutcome {
        match (self, other) {
            (WriteOutcome::DidNotWrite, o) => o,
            (s, WriteOutcome::DidNotWrite) => s,
            (WriteOutcome::Wrote(mut a), WriteOutcome::Wrote(b)) => {
                a.extend(b);
                WriteOutcome::Wrote(a)
            }
        }
    }
}

/// A fully parsed client command, ready for dispatch.
#[derive(Debug, Clone)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),
    Set {
        key: Bytes,
        value: Bytes,
        px: Option<u64>,
    },
    Get(Bytes),
    Incr(Bytes),
    Type(Bytes),
    LPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    RPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    LRange {
        key: Bytes,
        start: i64,
        stop: i64,
    },
    LLen(Bytes),
    LPop {
        key: Bytes,
        count: Option<i64>,
    },
    BLPop {
        key: Bytes,
        timeout_secs: f64,
    },
    XAdd {
        key: Bytes,
        id_spec: crate::core::storage::StreamIdSpec,
        fields: Vec<(Bytes, Bytes)>,
    },
    XRange {
        key: Bytes,
        lo: crate::core::storage::StreamId,
        hi: crate::core::storage::StreamId,
    },
    XRead {
        block_ms: Option<u64>,
        keys: Vec<Bytes>,
        ids: Vec<crate::core::storage::XReadFromId>,
    },
    Multi,
    Exec,
    Discard,
    Info(Option<Bytes>),
    ReplconfListeningPort(u16),
    ReplconfCapa,
    ReplconfGetAck,
    ReplconfAck(u64),
    Psync,
}

impl Command {
    /// Parses a command from a RESP array's elements; `name` is the
    /// lower-cased command name taken from the array's first element and
    /// `args` are the remaining elements.
    pub fn parse(name: &str, args: &[RespFrame]) -> Result<Command, ServerError> {
        match name {
            "ping" => generic::parse_ping(args),
            "echo" => generic::parse_echo(args),
            "info" => generic::parse_info(args),
            "replconf" => generic::parse_replconf(args),
            "psync" => generic::parse_psync(args),
            "set" => string::parse_set(args),
            "get" => string::parse_get(args),
            "incr" => string::parse_incr(args),
            "type" => string::parse_type(args),
            "lpush" => list::parse_push(args, true),
            "rpush" => list::parse_push(args, false),
            "lrange" => list::parse_lrange(args),
            "llen" => list::parse_llen(args),
            "lpop" => list::parse_lpop(args),
            "blpop" => list::parse_blpop(args),
            "xadd" => streams::parse_xadd(args),
            "xrange" => streams::parse_xrange(args),
            "xread" => streams::parse_xread(args),
            "multi" => {
                arity_exact(args, 0, "MULTI")?;
                Ok(Command::Multi)
            }
            "exec" => {
                arity_exact(args, 0, "EXEC")?;
                Ok(Command::Exec)
            }
            "discard" => {
                arity_exact(args, 0, "DISCARD")?;
                Ok(Command::Discard)
            }
            other => Err(ServerError::Internal(format!("unknown command '{other}'"))),
        }
    }

    pub fn flags(&self) -> CommandFlags {
        use Command::*;
        match self {
            Set { .. } | Incr(_) | LPush { .. } | RPush { .. } | LPop { .. } | BLPop { .. }
            | XAdd { .. } => CommandFlags::WRITE,
            Get(_) | Type(_) | LRange { .. } | LLen(_) | XRange { .. } | XRead { .. } => {
                CommandFlags::READONLY
            }
            _ => CommandFlags::ADMIN,
        }
    }

    /// Executes the command against shared state, returning the reply to
    /// send to the client and whether (and what) to propagate to replicas.
    pub async fn execute(
        &self,
        state: &Arc<ServerState>,
        session_id: u64,
    ) -> Result<(RespFrame, WriteOutcome), ServerError> {
        use Command::*;
        match self {
            Ping(msg) => generic::exec_ping(msg),
            Echo(msg) => generic::exec_echo(msg),
            Info(section) => generic::exec_info(state, section).await,
            ReplconfListeningPort(_) | ReplconfCapa => {
                Ok((RespFrame::ok(), WriteOutcome::DidNotWrite))
            }
            ReplconfGetAck | ReplconfAck(_) | Psync | Multi | Exec | Discard => {
                // Handled specially by the connection handler / replication
                // layer before reaching generic dispatch.
                Ok((RespFrame::ok(), WriteOutcome::DidNotWrite))
            }
            Set { key, value, px } => string::exec_set(state, key, value, *px).await,
            Get(key) => string::exec_get(state, key).await,
            Incr(key) => string::exec_incr(state, key).await,
            Type(key) => string::exec_type(state, key).await,
            LPush { key, values } => list::exec_push(state, key, values, true).await,
            RPush { key, values } => list::exec_push(state, key, values, false).await,
            LRange { key, start, stop } => list::exec_lrange(state, key, *start, *stop).await,
            LLen(key) => list::exec_llen(state, key).await,
            LPop { key, count } => list::exec_lpop(state, key, *count).await,
            BLPop { key, timeout_secs } => {
                list::exec_blpop(state, session_id, key, *timeout_secs).await
            }
            XAdd { key, id_spec, fields } => streams::exec_xadd(state, key, *id_spec, fields).await,
            XRange { key, lo, hi } => streams::exec_xrange(state, key, *lo, *hi).await,
            XRead { block_ms, keys, ids } => {
                streams::exec_xread(state, session_id, *block_ms, keys, ids).await
            }
        }
    }
}

pub fn arity_exact(args: &[RespFrame], expected: usize, name: &'static str) -> Result<(), ServerError> {
    if args.len() != expected {
        Err(ServerError::WrongArity(name))
    } else {
        Ok(())
    }
}

pub fn arity_range(
    args: &[RespFrame],
    min: usize,
    max: usize,
    name: &'static str,
) -> Result<(), ServerError> {
    if args.len() < min || args.len() > max {
        Err(ServerError::WrongArity(name))
    } else {
        Ok(())
    }
}

pub fn arity_at_least(args: &[RespFrame], min: usize, name: &'static str) -> Result<(), ServerError> {
    if args.len() < min {
        Err(ServerError::WrongArity(name))
    } else {
        Ok(())
    }
}

/// Extracts the bytes of a bulk-string or simple-string argument; any other
/// frame shape in an argument position is a protocol-level client error.
pub fn arg_bytes(frame: &RespFrame) -> Result<Bytes, ServerError> {
    match frame {
        RespFrame::BulkString(b) => Ok(b.clone()),
        RespFrame::SimpleString(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        _ => Err(ServerError::Protocol("expected bulk string argument".into())),
    }
}

pub fn arg_str(frame: &RespFrame) -> Result<String, ServerError> {
    let bytes = arg_bytes(frame)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ServerError::Protocol("non-UTF-8 argument".into()))
}
