// src/core/replication/mod.rs

//! Primary-side replica link handling and replica-side handshake/streaming
//! worker. Only full resynchronization is supported: there is no backlog,
//! so every new replica link replays the entire (fixed, empty) dataset
//! snapshot and then follows the live command stream from that point.

mod primary;
mod replica;
mod snapshot;

pub use primary::handle_psync_handoff;
pub use replica::run_replica_worker;
pub use snapshot::EMPTY_SNAPSHOT;
