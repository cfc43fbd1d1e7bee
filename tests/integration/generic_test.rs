// tests/integration/generic_test.rs

use super::test_helpers::TestContext;
use keylin::core::protocol::RespFrame;

#[tokio::test]
async fn ping_without_message_replies_pong() {
    let ctx = TestContext::new();
    let reply = ctx.cmd(&["PING"]).await.unwrap();
    assert_eq!(reply, RespFrame::SimpleString("PONG".into()));
}

#[tokio::test]
async fn echo_replies_with_the_given_message() {
    let ctx = TestContext::new();
    let reply = ctx.cmd(&["ECHO", "hello world"]).await.unwrap();
    assert_eq!(reply, RespFrame::bulk(&b"hello world"[..]));
}

#[tokio::test]
async fn info_replication_reports_master_role_with_no_replicaof() {
    let ctx = TestContext::new();
    let reply = ctx.cmd(&["INFO", "replication"]).await.unwrap();
    let RespFrame::BulkString(body) = reply else {
        panic!("expected bulk string");
    };
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("role:master"));
    assert!(body.contains("master_repl_offset:0"));
}
