//! End-to-end tests for the stdio transport over in-memory pipes.

use std::time::Duration;

use scaffold_mcp::protocol::stdio::StdioTransport;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::time::timeout;

use scaffold_e2e_tests::harness::test_server;

type ClientReader = BufReader<ReadHalf<tokio::io::DuplexStream>>;
type ClientWriter = WriteHalf<tokio::io::DuplexStream>;

/// Spawn a transport over a duplex pipe and hand back the client ends, with
/// the `mcp/ready` announcement already consumed.
async fn attach() -> (tokio::io::Lines<ClientReader>, ClientWriter, Value) {
    let (client, server_side) = tokio::io::duplex(256 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let transport = StdioTransport::new(test_server());
    tokio::spawn(transport.run(server_read, server_write));

    let (client_read, client_write) = tokio::io::split(client);
    let mut lines = BufReader::new(client_read).lines();

    let ready_line = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for mcp/ready")
        .unwrap()
        .unwrap();
    let ready: Value = serde_json::from_str(&ready_line).unwrap();
    (lines, client_write, ready)
}

async fn next_json(lines: &mut tokio::io::Lines<ClientReader>) -> Value {
    let line = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for a response line")
        .unwrap()
        .expect("stream ended unexpectedly");
    serde_json::from_str(&line).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, line))
}

#[tokio::test]
async fn ready_announcement_matches_tools_list() {
    let (mut lines, mut writer, ready) = attach().await;
    assert_eq!(ready["method"], "mcp/ready");
    assert!(ready.get("id").is_none());

    writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
        .await
        .unwrap();
    let listed = next_json(&mut lines).await;

    assert_eq!(ready["params"]["tools"], listed["result"]["tools"]);
}

#[tokio::test]
async fn end_to_end_tool_call_over_stdio() {
    let (mut lines, mut writer, _) = attach().await;

    writer
        .write_all(
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"list_user_stories\",\"arguments\":{}}}\n",
        )
        .await
        .unwrap();

    let resp = next_json(&mut lines).await;
    assert_eq!(resp["jsonrpc"], "2.0");
    assert_eq!(resp["id"], 1);
    assert_eq!(resp["result"]["stories"][0]["id"], "US-1");
}

#[tokio::test]
async fn request_split_across_many_writes_is_reassembled() {
    let (mut lines, mut writer, _) = attach().await;

    let request = "{\"jsonrpc\":\"2.0\",\"id\":\"chunked\",\"method\":\"tools/call\",\"params\":{\"name\":\"list_user_stories\",\"arguments\":{}}}\n";
    for byte in request.as_bytes() {
        writer.write_all(std::slice::from_ref(byte)).await.unwrap();
        writer.flush().await.unwrap();
    }

    let resp = next_json(&mut lines).await;
    assert_eq!(resp["id"], "chunked");
    assert!(resp.get("result").is_some());
}

#[tokio::test]
async fn many_requests_in_one_write_all_answered() {
    let (mut lines, mut writer, _) = attach().await;

    let batch: String = (0..5)
        .map(|i| format!("{{\"jsonrpc\":\"2.0\",\"id\":{},\"method\":\"ping\"}}\n", i))
        .collect();
    writer.write_all(batch.as_bytes()).await.unwrap();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        let resp = next_json(&mut lines).await;
        seen.insert(resp["id"].as_i64().unwrap());
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn fast_call_completes_before_concurrent_slow_call() {
    let (mut lines, mut writer, _) = attach().await;

    // Slow report first, fast read second — the fast one must answer first.
    let both = "{\"jsonrpc\":\"2.0\",\"id\":\"slow\",\"method\":\"tools/call\",\"params\":{\"name\":\"generate_report\",\"arguments\":{}}}\n\
                {\"jsonrpc\":\"2.0\",\"id\":\"fast\",\"method\":\"tools/call\",\"params\":{\"name\":\"list_user_stories\",\"arguments\":{}}}\n";
    writer.write_all(both.as_bytes()).await.unwrap();

    let first = next_json(&mut lines).await;
    let second = next_json(&mut lines).await;
    assert_eq!(first["id"], "fast");
    assert_eq!(second["id"], "slow");
    assert_eq!(second["result"]["report"], "done");
}

#[tokio::test]
async fn parse_error_answers_32700_and_stream_survives() {
    let (mut lines, mut writer, _) = attach().await;

    writer.write_all(b"this is not json\n").await.unwrap();
    let err = next_json(&mut lines).await;
    assert_eq!(err["error"]["code"], -32700);
    assert_eq!(err["id"], Value::Null);

    // Transport must still serve the next request.
    writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
        .await
        .unwrap();
    let ok = next_json(&mut lines).await;
    assert_eq!(ok["id"], 2);
    assert!(ok.get("result").is_some());
}

#[tokio::test]
async fn failing_handler_yields_32603_not_a_dropped_connection() {
    let (mut lines, mut writer, _) = attach().await;

    writer
        .write_all(
            b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{\"name\":\"broken_workflow\",\"arguments\":{}}}\n",
        )
        .await
        .unwrap();

    let resp = next_json(&mut lines).await;
    assert_eq!(resp["id"], 3);
    assert_eq!(resp["error"]["code"], -32603);
    assert_eq!(resp["error"]["data"]["tool"], "broken_workflow");

    writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"ping\"}\n")
        .await
        .unwrap();
    assert_eq!(next_json(&mut lines).await["id"], 4);
}

#[tokio::test]
async fn eof_detaches_transport_cleanly() {
    let (client, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let transport = StdioTransport::new(test_server());
    let handle = tokio::spawn(transport.run(server_read, server_write));

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut lines = BufReader::new(client_read).lines();
    lines.next_line().await.unwrap(); // mcp/ready

    // Closing the input side is EOF; the transport detaches without error.
    client_write.shutdown().await.unwrap();
    let result = timeout(Duration::from_secs(5), handle).await.unwrap();
    assert!(result.unwrap().is_ok());
}
