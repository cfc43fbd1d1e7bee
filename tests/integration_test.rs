// tests/integration_test.rs
//
// In-process command tests: each exercises `Command::parse`/`execute`
// against a real `ServerState`, without opening a socket.

mod integration {
    pub mod test_helpers;

    pub mod blocking_test;
    pub mod expiry_test;
    pub mod generic_test;
    pub mod stream_test;
    pub mod transaction_test;
}
