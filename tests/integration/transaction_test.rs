// tests/integration/transaction_test.rs
//
// `MULTI`/`EXEC`/`DISCARD` are driven through the connection handler's
// `TransactionState`, not through `Command::execute` directly, so these
// tests replay the same queue/replay sequence the handler performs.

use super::test_helpers::TestContext;
use keylin::core::commands::{Command, TransactionState};
use keylin::core::protocol::RespFrame;

#[tokio::test]
async fn queued_commands_execute_in_order_on_exec() {
    let ctx = TestContext::new();
    let mut tx = TransactionState::default();
    tx.begin();
    tx.queue(Command::parse("set", &[RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"1"[..])]).unwrap());
    tx.queue(Command::parse("incr", &[RespFrame::bulk(&b"k"[..])]).unwrap());

    let (queued, had_error) = tx.take();
    assert!(!had_error);

    let mut replies = Vec::new();
    for command in queued {
        let (reply, _) = command.execute(&ctx.state, 1).await.unwrap();
        replies.push(reply);
    }
    assert_eq!(replies, vec![RespFrame::ok(), RespFrame::Integer(2)]);
}

#[tokio::test]
async fn discard_drops_all_queued_commands() {
    let mut tx = TransactionState::default();
    tx.begin();
    tx.queue(Command::parse("ping", &[]).unwrap());
    tx.discard();

    let (queued, _) = tx.take();
    assert!(queued.is_empty());
}
