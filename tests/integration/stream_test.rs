// tests/integration/stream_test.rs

use super::test_helpers::TestContext;
use keylin::core::protocol::RespFrame;

#[tokio::test]
async fn xadd_with_explicit_zero_zero_is_rejected() {
    let ctx = TestContext::new();
    let err = ctx.cmd(&["XADD", "s", "0-0", "field", "value"]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "ERR The ID specified in XADD must be greater than 0-0"
    );
}

#[tokio::test]
async fn xadd_requires_strictly_increasing_explicit_ids() {
    let ctx = TestContext::new();
    ctx.cmd(&["XADD", "s", "5-5", "a", "1"]).await.unwrap();
    let err = ctx.cmd(&["XADD", "s", "5-5", "a", "2"]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "ERR The ID specified in XADD is equal or smaller than the target stream top item"
    );
    let err = ctx.cmd(&["XADD", "s", "4-9", "a", "3"]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "ERR The ID specified in XADD is equal or smaller than the target stream top item"
    );
}

#[tokio::test]
async fn xadd_auto_id_then_xrange_returns_inserted_entries() {
    let ctx = TestContext::new();
    let id1 = ctx.cmd(&["XADD", "s", "*", "a", "1"]).await.unwrap();
    let id2 = ctx.cmd(&["XADD", "s", "*", "a", "2"]).await.unwrap();
    assert_ne!(id1, id2);

    let reply = ctx.cmd(&["XRANGE", "s", "-", "+"]).await.unwrap();
    let RespFrame::Array(entries) = reply else {
        panic!("expected array");
    };
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn xread_without_block_on_no_new_entries_returns_null_array() {
    let ctx = TestContext::new();
    ctx.cmd(&["XADD", "s", "1-1", "a", "1"]).await.unwrap();
    let reply = ctx.cmd(&["XREAD", "STREAMS", "s", "1-1"]).await.unwrap();
    assert_eq!(reply, RespFrame::NullArray);
}

#[tokio::test]
async fn xread_blocks_until_a_matching_xadd_arrives() {
    let ctx = TestContext::new();
    let state = ctx.state.clone();

    let reader = tokio::spawn(async move {
        use keylin::core::commands::Command;
        let command = Command::parse(
            "xread",
            &[
                RespFrame::bulk(&b"BLOCK"[..]),
                RespFrame::bulk(&b"0"[..]),
                RespFrame::bulk(&b"STREAMS"[..]),
                RespFrame::bulk(&b"s"[..]),
                RespFrame::bulk(&b"0-0"[..]),
            ],
        )
        .unwrap();
        command.execute(&state, 1).await.unwrap().0
    });

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    ctx.cmd(&["XADD", "s", "5-0", "field", "value"]).await.unwrap();

    let reply = tokio::time::timeout(std::time::Duration::from_secs(1), reader)
        .await
        .expect("XREAD BLOCK should have woken up")
        .unwrap();
    let RespFrame::Array(per_stream) = reply else {
        panic!("expected array reply");
    };
    assert_eq!(per_stream.len(), 1);
}
