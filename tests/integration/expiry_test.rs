// tests/integration/expiry_test.rs

use super::test_helpers::TestContext;
use keylin::core::protocol::RespFrame;

#[tokio::test]
async fn set_without_px_never_expires() {
    let ctx = TestContext::new();
    ctx.cmd(&["SET", "k", "v"]).await.unwrap();
    let reply = ctx.cmd(&["GET", "k"]).await.unwrap();
    assert_eq!(reply, RespFrame::bulk(&b"v"[..]));
}

#[tokio::test]
async fn set_with_px_expires_and_reads_back_nil() {
    let ctx = TestContext::new();
    ctx.cmd(&["SET", "k", "v", "PX", "20"]).await.unwrap();
    assert_eq!(ctx.cmd(&["GET", "k"]).await.unwrap(), RespFrame::bulk(&b"v"[..]));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(ctx.cmd(&["GET", "k"]).await.unwrap(), RespFrame::NullBulkString);
    assert_eq!(ctx.cmd(&["TYPE", "k"]).await.unwrap(), RespFrame::SimpleString("none".into()));
}

#[tokio::test]
async fn incr_preserves_an_existing_expiry() {
    let ctx = TestContext::new();
    ctx.cmd(&["SET", "k", "1", "PX", "20"]).await.unwrap();
    ctx.cmd(&["INCR", "k"]).await.unwrap();
    assert_eq!(ctx.cmd(&["GET", "k"]).await.unwrap(), RespFrame::bulk(&b"2"[..]));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(ctx.cmd(&["GET", "k"]).await.unwrap(), RespFrame::NullBulkString);
}

#[tokio::test]
async fn incr_on_non_integer_string_is_an_error() {
    let ctx = TestContext::new();
    ctx.cmd(&["SET", "k", "not-a-number"]).await.unwrap();
    assert!(ctx.cmd(&["INCR", "k"]).await.is_err());
}
