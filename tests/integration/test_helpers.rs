// tests/integration/test_helpers.rs

//! Shared scaffolding for the in-process command tests: a `TestContext`
//! wrapping a real `ServerState` so a test can parse and execute a command
//! exactly as the connection handler does, without opening a socket.

use bytes::Bytes;
use keylin::config::Config;
use keylin::core::commands::Command;
use keylin::core::error::ServerError;
use keylin::core::protocol::RespFrame;
use keylin::core::state::ServerState;
use std::sync::Arc;

pub struct TestContext {
    pub state: Arc<ServerState>,
}

impl TestContext {
    pub fn new() -> Self {
        let config = Config {
            port: 0,
            replica_of: None,
            run_id: "0".repeat(40),
        };
        Self {
            state: Arc::new(ServerState::new(config)),
        }
    }

    /// Parses and executes a command given as plain string arguments,
    /// mirroring what the connection handler does with a decoded frame.
    pub async fn cmd(&self, parts: &[&str]) -> Result<RespFrame, ServerError> {
        let args: Vec<RespFrame> = parts[1..]
            .iter()
            .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        let command = Command::parse(&parts[0].to_ascii_lowercase(), &args)?;
        let (reply, _outcome) = command.execute(&self.state, 1).await?;
        Ok(reply)
    }
}
