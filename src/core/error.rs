// src/core/error.rs

//! The central error type for the server, and its mapping onto RESP error replies.

use std::sync::Arc;
use thiserror::Error;

/// All failure modes the server can produce, from protocol-level parse
/// failures up to command-level validation errors.
#[derive(Debug, Error, Clone)]
pub enum ServerError {
    #[error("{0}")]
    Io(#[from] IoError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("{0}")]
    XaddIdOrder(&'static str),

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    TransactionAborted,

    #[error("READONLY You can't write against a read only replica.")]
    ReadOnlyReplica,

    #[error("ERR {0}")]
    Internal(String),
}

/// `std::io::Error` is not `Clone`, so it is wrapped to let `ServerError` be
/// cheaply cloned into transaction-queue and replication-log contexts.
#[derive(Debug, Clone)]
pub struct IoError(pub Arc<std::io::Error>);

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError(Arc::new(e))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(IoError::from(e))
    }
}

impl ServerError {
    /// True for errors that leave the connection unusable and must close it
    /// rather than be reported as a client-visible `-ERR` reply.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, ServerError::Io(_) | ServerError::Protocol(_))
    }
}
