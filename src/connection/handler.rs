// src/connection/handler.rs

//! Manages the full lifecycle of one client connection: read a frame,
//! parse it into a `Command`, route it through transaction buffering or
//! straight to execution, and write back a reply.

use super::session::SessionState;
use crate::core::commands::{arg_str, Command, CommandFlags, WriteOutcome};
use crate::core::error::ServerError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::replication;
use crate::core::state::ServerState;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

pub struct ConnectionHandler {
    framed: Option<Framed<TcpStream, RespFrameCodec>>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    session_id: u64,
    session: SessionState,
}

impl ConnectionHandler {
    pub fn new(socket: TcpStream, addr: SocketAddr, state: Arc<ServerState>, session_id: u64) -> Self {
        Self {
            framed: Some(Framed::new(socket, RespFrameCodec)),
            addr,
            state,
            session_id,
            session: SessionState::new(),
        }
    }

    /// The connection's main loop. Returns once the client disconnects, a
    /// protocol error closes the connection, or the connection was handed
    /// off to replica streaming (in which case `self.framed` is `None`).
    pub async fn run(&mut self) -> Result<(), ServerError> {
        loop {
            let Some(framed) = self.framed.as_mut() else {
                return Ok(());
            };
            match framed.next().await {
                Some(Ok(frame)) => {
                    debug!(session_id = self.session_id, "received frame: {frame:?}");
                    match self.process_frame(frame).await {
                        Ok(true) => {}
                        Ok(false) => return Ok(()), // handed off to replication
                        Err(e) if e.is_connection_fatal() => {
                            warn!("connection {} error: {e}", self.addr);
                            return Err(e);
                        }
                        Err(e) => {
                            self.session.transaction.has_error = true;
                            self.send_error(e).await?;
                        }
                    }
                }
                Some(Err(e)) => {
                    if e.is_connection_fatal() {
                        debug!("connection {} closed: {e}", self.addr);
                    }
                    return Ok(());
                }
                None => {
                    debug!("connection {} closed by peer", self.addr);
                    return Ok(());
                }
            }
        }
    }

    /// Parses and dispatches one frame. Returns `Ok(false)` when the
    /// connection has been handed off to the replication subsystem and the
    /// main loop should stop driving `self.framed`.
    async fn process_frame(&mut self, frame: RespFrame) -> Result<bool, ServerError> {
        let RespFrame::Array(items) = frame else {
            return Err(ServerError::Protocol("expected command array".into()));
        };
        let Some((name_frame, args)) = items.split_first() else {
            return Err(ServerError::Protocol("empty command array".into()));
        };
        let name = arg_str(name_frame)?.to_ascii_lowercase();

        // Inside MULTI, a command that fails to parse (unknown name, arity
        // mismatch) replies with an error immediately but leaves the
        // transaction open for more queuing, rather than aborting it — only
        // a command that parsed fine and was then queued counts toward
        // EXECABORT.
        if self.session.transaction.active {
            return match Command::parse(&name, args) {
                Ok(command) => self.handle_queued(command).await,
                Err(e) => {
                    self.send_error(e).await?;
                    Ok(true)
                }
            };
        }

        let command = Command::parse(&name, args)?;

        if matches!(command, Command::Psync) {
            return self.handle_psync(command).await;
        }

        match &command {
            Command::Multi => {
                self.session.transaction.begin();
                self.reply(RespFrame::ok()).await?;
            }
            Command::Discard => {
                self.send_error(ServerError::Internal("DISCARD without MULTI".into())).await?;
            }
            Command::Exec => {
                self.send_error(ServerError::Internal("EXEC without MULTI".into())).await?;
            }
            _ => {
                let reply = self.dispatch(command).await?;
                self.reply(reply).await?;
            }
        }
        Ok(true)
    }

    async fn handle_queued(&mut self, command: Command) -> Result<bool, ServerError> {
        match command {
            Command::Multi => {
                self.send_error(ServerError::Internal("MULTI calls can not be nested".into()))
                    .await?;
            }
            Command::Discard => {
                self.session.transaction.discard();
                self.reply(RespFrame::ok()).await?;
            }
            Command::Exec => {
                let (queued, had_error) = self.session.transaction.take();
                if had_error {
                    self.send_error(ServerError::TransactionAborted).await?;
                } else {
                    let mut replies = Vec::with_capacity(queued.len());
                    for cmd in queued {
                        let reply = match self.dispatch(cmd).await {
                            Ok(r) => r,
                            Err(e) => RespFrame::Error(e.to_string()),
                        };
                        replies.push(reply);
                    }
                    self.reply(RespFrame::Array(replies)).await?;
                }
            }
            other => {
                self.session.transaction.queue(other);
                self.reply(RespFrame::SimpleString("QUEUED".into())).await?;
            }
        }
        Ok(true)
    }

    /// Executes a command, propagating its effect to replicas when one is
    /// connected and this instance is not itself a replica. A real client
    /// connection (unlike the replica worker's own session 0) may not issue
    /// write commands while this instance is itself a replica.
    async fn dispatch(&mut self, command: Command) -> Result<RespFrame, ServerError> {
        if self.state.replication.is_replica() && command.flags().contains(CommandFlags::WRITE) {
            return Err(ServerError::ReadOnlyReplica);
        }
        let (reply, outcome) = command.execute(&self.state, self.session_id).await?;
        if let WriteOutcome::Wrote(frames) = outcome {
            for frame in &frames {
                self.state.replication.propagate(frame);
            }
        }
        Ok(reply)
    }

    async fn handle_psync(&mut self, _command: Command) -> Result<bool, ServerError> {
        info!("connection {} handing off to replica streaming", self.addr);
        let Some(framed) = self.framed.take() else {
            return Err(ServerError::Internal("framed stream already taken".into()));
        };
        let state = self.state.clone();
        let session_id = self.session_id;
        tokio::spawn(async move {
            if let Err(e) = replication::handle_psync_handoff(state, session_id, framed).await {
                warn!("replica link {session_id} ended with error: {e}");
            }
        });
        Ok(false)
    }

    async fn reply(&mut self, frame: RespFrame) -> Result<(), ServerError> {
        if let Some(framed) = self.framed.as_mut() {
            framed.send(frame).await?;
        }
        Ok(())
    }

    async fn send_error(&mut self, e: ServerError) -> Result<(), ServerError> {
        self.reply(RespFrame::Error(e.to_string())).await
    }
}
