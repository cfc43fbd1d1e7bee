// tests/integration/blocking_test.rs

use super::test_helpers::TestContext;
use keylin::core::commands::Command;
use keylin::core::protocol::RespFrame;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn blpop_on_a_nonempty_list_returns_immediately() {
    let ctx = TestContext::new();
    ctx.cmd(&["RPUSH", "k", "a", "b"]).await.unwrap();
    let reply = ctx.cmd(&["BLPOP", "k", "0"]).await.unwrap();
    assert_eq!(
        reply,
        RespFrame::Array(vec![RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"a"[..])])
    );
}

#[tokio::test]
async fn blpop_wakes_up_once_a_concurrent_push_arrives() {
    let ctx = TestContext::new();
    let state = ctx.state.clone();

    let waiter = tokio::spawn(async move {
        let command = Command::parse("blpop", &[RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"0"[..])]).unwrap();
        command.execute(&state, 1).await.unwrap().0
    });

    // Give the waiter time to register before the push arrives, so this
    // exercises the wakeup path rather than the immediate-pop fast path.
    tokio::time::sleep(Duration::from_millis(30)).await;
    ctx.cmd(&["RPUSH", "k", "value"]).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("BLPOP should have woken up")
        .unwrap();
    assert_eq!(
        reply,
        RespFrame::Array(vec![RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"value"[..])])
    );

    // The waiter consumed the value directly; nothing is left on the list.
    assert_eq!(ctx.cmd(&["LLEN", "k"]).await.unwrap(), RespFrame::Integer(0));
}

#[tokio::test]
async fn blpop_times_out_and_returns_a_null_array() {
    let ctx = TestContext::new();
    let reply = ctx.cmd(&["BLPOP", "missing", "0.05"]).await.unwrap();
    assert_eq!(reply, RespFrame::NullArray);
}

#[tokio::test]
async fn two_waiters_are_served_in_fifo_order() {
    let ctx = TestContext::new();
    let state1 = ctx.state.clone();
    let state2: Arc<_> = ctx.state.clone();

    let first = tokio::spawn(async move {
        let command = Command::parse("blpop", &[RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"0"[..])]).unwrap();
        command.execute(&state1, 1).await.unwrap().0
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = tokio::spawn(async move {
        let command = Command::parse("blpop", &[RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"0"[..])]).unwrap();
        command.execute(&state2, 2).await.unwrap().0
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    ctx.cmd(&["RPUSH", "k", "one"]).await.unwrap();
    ctx.cmd(&["RPUSH", "k", "two"]).await.unwrap();

    let first_reply = tokio::time::timeout(Duration::from_secs(1), first).await.unwrap().unwrap();
    let second_reply = tokio::time::timeout(Duration::from_secs(1), second).await.unwrap().unwrap();
    assert_eq!(
        first_reply,
        RespFrame::Array(vec![RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"one"[..])])
    );
    assert_eq!(
        second_reply,
        RespFrame::Array(vec![RespFrame::bulk(&b"k"[..]), RespFrame::bulk(&b"two"[..])])
    );
}
