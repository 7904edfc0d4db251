//! End-to-end tests for the HTTP/SSE transport: router-level via
//! `tower::ServiceExt::oneshot`, and full TCP round-trips for the SSE path.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tower::ServiceExt;

use scaffold_mcp::protocol::http::{HttpConfig, HttpTransport, build_router};
use scaffold_e2e_tests::harness::test_server;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn well_known_discovery_lists_tools_and_endpoints() {
    let app = build_router(test_server());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let doc = body_json(response).await;
    assert_eq!(doc["name"], "scaffold-mcp");
    assert_eq!(doc["endpoints"]["message"], "/message");
    assert_eq!(doc["endpoints"]["sse"], "/sse");
    let names: Vec<_> = doc["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"list_user_stories".to_string()));
}

#[tokio::test]
async fn capability_mirrors_agree_with_each_other() {
    let server = test_server();

    let info = build_router(server.clone())
        .oneshot(Request::builder().uri("/mcp").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let ready = build_router(server)
        .oneshot(
            Request::builder()
                .uri("/mcp/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let info = body_json(info).await;
    let ready = body_json(ready).await;
    assert!(ready["ready"].as_bool().unwrap());
    assert_eq!(info["tools"], ready["tools"]);
    assert_eq!(info["serverInfo"], ready["serverInfo"]);
}

#[tokio::test]
async fn responses_carry_permissive_cors_headers() {
    let app = build_router(test_server());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/mcp")
                .header(header::ORIGIN, "https://editor.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn options_preflight_short_circuits_without_body() {
    let app = build_router(test_server());
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/message")
                .header(header::ORIGIN, "https://editor.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn malformed_post_body_is_rejected_with_400() {
    let app = build_router(test_server());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/message")
                .body(Body::from("{definitely not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], -32700);
    assert_eq!(error["id"], Value::Null);
}

#[tokio::test]
async fn valid_post_is_acknowledged_with_202() {
    let app = build_router(test_server());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/message")
                .body(Body::from(
                    r#"{"jsonrpc":"2.0","id":5,"method":"tools/list"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let ack = body_json(response).await;
    assert_eq!(ack["status"], "accepted");
    assert_eq!(ack["id"], 5);
}

// ---------------------------------------------------------------------------
// Full TCP round-trips for the SSE path
// ---------------------------------------------------------------------------

async fn spawn_transport() -> SocketAddr {
    let transport = HttpTransport::new(HttpConfig {
        host: "127.0.0.1".into(),
        port: 0, // OS-assigned
        max_port_attempts: 1,
    });
    let (listener, addr) = transport.bind().await.unwrap();
    tokio::spawn(HttpTransport::serve(listener, test_server()));
    addr
}

/// Accumulate bytes from the stream until `needle` shows up.
async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut acc = String::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for '{}'; got: {}", needle, acc))
            .unwrap();
        assert!(n > 0, "stream closed before '{}'; got: {}", needle, acc);
        acc.push_str(&String::from_utf8_lossy(&buf[..n]));
        if acc.contains(needle) {
            return acc;
        }
    }
}

async fn open_sse(addr: SocketAddr, session_id: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /sse?sessionId={} HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n",
        session_id
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = read_until(&mut stream, "mcp/connected").await;
    assert!(head.contains("text/event-stream"), "{}", head);
    assert!(head.contains(session_id), "{}", head);
    stream
}

async fn post_message(addr: SocketAddr, session_id: Option<&str>, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let session_header = session_id
        .map(|id| format!("x-session-id: {}\r\n", id))
        .unwrap_or_default();
    let request = format!(
        "POST /message HTTP/1.1\r\nHost: localhost\r\n{}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        session_header,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    read_until(&mut stream, "\"status\":\"accepted\"").await
}

#[tokio::test]
async fn unknown_tool_error_arrives_as_sse_data_event() {
    let addr = spawn_transport().await;
    let mut sse = open_sse(addr, "e2e-errors").await;

    let ack = post_message(
        addr,
        Some("e2e-errors"),
        r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"does_not_exist","arguments":{}}}"#,
    )
    .await;
    assert!(ack.contains("202"), "{}", ack);

    let received = read_until(&mut sse, "-32601").await;
    assert!(received.contains("data:"), "{}", received);
    assert!(received.contains(r#""id":"a""#), "{}", received);
    assert!(received.contains("does_not_exist"), "{}", received);
}

#[tokio::test]
async fn tool_result_is_delivered_to_the_target_session() {
    let addr = spawn_transport().await;
    let mut sse = open_sse(addr, "e2e-target").await;

    post_message(
        addr,
        Some("e2e-target"),
        r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"list_user_stories","arguments":{}}}"#,
    )
    .await;

    let received = read_until(&mut sse, "US-1").await;
    assert!(received.contains(r#""id":7"#), "{}", received);
}

#[tokio::test]
async fn post_without_session_broadcasts_to_open_sessions() {
    let addr = spawn_transport().await;
    let mut sse_a = open_sse(addr, "broadcast-a").await;
    let mut sse_b = open_sse(addr, "broadcast-b").await;

    post_message(
        addr,
        None,
        r#"{"jsonrpc":"2.0","id":11,"method":"tools/list"}"#,
    )
    .await;

    let a = read_until(&mut sse_a, r#""id":11"#).await;
    let b = read_until(&mut sse_b, r#""id":11"#).await;
    assert!(a.contains("list_user_stories"));
    assert!(b.contains("list_user_stories"));
}

#[tokio::test]
async fn reconnect_with_same_session_id_takes_over_delivery() {
    let addr = spawn_transport().await;
    let _old = open_sse(addr, "shared-session").await;
    let mut new = open_sse(addr, "shared-session").await;

    post_message(
        addr,
        Some("shared-session"),
        r#"{"jsonrpc":"2.0","id":21,"method":"ping"}"#,
    )
    .await;

    let received = read_until(&mut new, r#""id":21"#).await;
    assert!(received.contains("data:"), "{}", received);
}
