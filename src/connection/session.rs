// src/connection/session.rs

//! Per-connection state that must not leak across connections: the
//! transaction buffer currently being queued via `MULTI`.

use crate::core::commands::TransactionState;

#[derive(Debug, Default)]
pub struct SessionState {
    pub transaction: TransactionState,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}
