// src/core/commands/transaction.rs

//! Per-connection `MULTI`/`EXEC`/`DISCARD` transaction buffering.
//!
//! Unlike the rest of the command set, transaction state belongs to the
//! connection, not the shared database: only the connection that opened a
//! `MULTI` block can see or run its queued commands, so it lives in
//! `connection::SessionState` rather than in a server-wide map keyed by
//! session ID.

use super::Command;

#[derive(Debug, Default)]
pub struct TransactionState {
    pub active: bool,
    pub queued: Vec<Command>,
    pub has_error: bool,
}

impl TransactionState {
    pub fn begin(&mut self) {
        self.active = true;
        self.queued.clear();
        self.has_error = false;
    }

    pub fn queue(&mut self, command: Command) {
        self.queued.push(command);
    }

    pub fn take(&mut self) -> (Vec<Command>, bool) {
        let queued = std::mem::take(&mut self.queued);
        let had_error = self.has_error;
        self.active = false;
        self.has_error = false;
        (queued, had_error)
    }

    pub fn discard(&mut self) {
        self.active = false;
        self.queued.clear();
        self.has_error = false;
    }
}
