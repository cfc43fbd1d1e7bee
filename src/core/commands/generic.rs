// src/core/commands/generic.rs

//! `PING`, `ECHO`, `INFO`, and the replication handshake commands
//! (`REPLCONF`, `PSYNC`) as seen from the command-table side; the byte-level
//! handoff and snapshot transfer live in `core::replication`.

use super::{arg_bytes, arg_str, arity_exact, arity_range, Command, WriteOutcome};
use crate::core::error::ServerError;
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub fn parse_ping(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_range(args, 0, 1, "ping")?;
    Ok(Command::Ping(args.first().map(arg_bytes).transpose()?))
}

pub fn parse_echo(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_exact(args, 1, "echo")?;
    Ok(Command::Echo(arg_bytes(&args[0])?))
}

pub fn parse_info(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_range(args, 0, 1, "info")?;
    Ok(Command::Info(args.first().map(arg_bytes).transpose()?))
}

pub fn parse_replconf(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_range(args, 2, 16, "replconf")?;
    let sub = arg_str(&args[0])?.to_ascii_lowercase();
    match sub.as_str() {
        "listening-port" => {
            arity_exact(args, 2, "replconf")?;
            let port: u16 = arg_str(&args[1])?
                .parse()
                .map_err(|_| ServerError::Protocol("invalid REPLCONF listening-port".into()))?;
            Ok(Command::ReplconfListeningPort(port))
        }
        "capa" => Ok(Command::ReplconfCapa),
        "getack" => {
            arity_exact(args, 2, "replconf")?;
            Ok(Command::ReplconfGetAck)
        }
        "ack" => {
            arity_exact(args, 2, "replconf")?;
            let offset: u64 = arg_str(&args[1])?
                .parse()
                .map_err(|_| ServerError::Protocol("invalid REPLCONF ACK offset".into()))?;
            Ok(Command::ReplconfAck(offset))
        }
        _ => Err(ServerError::Protocol(format!("unknown REPLCONF subcommand '{sub}'"))),
    }
}

pub fn parse_psync(args: &[RespFrame]) -> Result<Command, ServerError> {
    arity_exact(args, 2, "psync")?;
    let replid = arg_str(&args[0])?;
    let offset = arg_str(&args[1])?;
    if replid != "?" || offset != "-1" {
        return Err(ServerError::Protocol(
            "only full resync ('PSYNC ? -1') is supported".into(),
        ));
    }
    Ok(Command::Psync)
}

pub fn exec_ping(msg: &Option<Bytes>) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let reply = match msg {
        Some(m) => RespFrame::BulkString(m.clone()),
        None => RespFrame::SimpleString("PONG".into()),
    };
    Ok((reply, WriteOutcome::DidNotWrite))
}

pub fn exec_echo(msg: &Bytes) -> Result<(RespFrame, WriteOutcome), ServerError> {
    Ok((RespFrame::BulkString(msg.clone()), WriteOutcome::DidNotWrite))
}

pub async fn exec_info(
    state: &Arc<ServerState>,
    section: &Option<Bytes>,
) -> Result<(RespFrame, WriteOutcome), ServerError> {
    let wants_replication = section
        .as_ref()
        .map(|s| s.eq_ignore_ascii_case(b"replication"))
        .unwrap_or(true);
    if !wants_replication {
        return Ok((RespFrame::BulkString(Bytes::new()), WriteOutcome::DidNotWrite));
    }

    let role = if state.replication.replica_of.is_some() {
        "slave"
    } else {
        "master"
    };
    let offset = state.replication.master_repl_offset.load(Ordering::SeqCst);
    let body = format!(
        "# Replication\r\nrole:{role}\r\nmaster_replid:{}\r\nmaster_repl_offset:{offset}\r\n",
        state.replication.run_id,
    );
    Ok((
        RespFrame::BulkString(Bytes::from(body)),
        WriteOutcome::DidNotWrite,
    ))
}
