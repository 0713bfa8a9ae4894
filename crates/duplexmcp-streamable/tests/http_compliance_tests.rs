//! HTTP surface compliance: status codes, header policy, session lifecycle,
//! stream conflicts, and the event replay property, exercised directly
//! against the axum handler.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use duplexmcp_protocol::types::{CallToolResult, Tool};
use duplexmcp_session::{Server, ServerOptions, tool_handler};
use duplexmcp_streamable::{
    StreamableServer, StreamableServerConfig, headers, parse_event_id,
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_server() -> Server {
    let server = Server::new("http-demo", "0.1.0", ServerOptions::default());
    server.add_tool(
        Tool::new("makeProgress"),
        tool_handler(|ctx, _args| async move {
            for step in 0..10 {
                ctx.progress("step", f64::from(step), Some(10.0)).await?;
            }
            Ok(CallToolResult::text("all done"))
        }),
    );
    server
}

fn streamable(config: StreamableServerConfig) -> StreamableServer {
    StreamableServer::new(test_server(), config)
}

fn initialize_body() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "probe", "version": "0"}
        }
    })
    .to_string()
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::ACCEPT, "application/json, text/event-stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn post_with_session(session_id: &str, body: impl Into<Body>) -> Request<Body> {
    let mut request = post(body);
    request.headers_mut().insert(
        headers::MCP_SESSION_ID,
        session_id.parse().expect("header value"),
    );
    request
}

async fn send(server: &StreamableServer, request: Request<Body>) -> Response<Body> {
    server.router("/mcp").oneshot(request).await.unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Extract (id, data) pairs from an SSE body.
fn sse_events(body: &str) -> Vec<(String, Value)> {
    let mut parser = duplexmcp_streamable::SseParser::new();
    parser
        .feed(body.as_bytes())
        .into_iter()
        .map(|e| {
            (
                e.id.expect("every event carries an id"),
                serde_json::from_str(&e.data).expect("event data is JSON"),
            )
        })
        .collect()
}

async fn establish_session(server: &StreamableServer) -> String {
    let response = send(server, post(initialize_body())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get(headers::MCP_SESSION_ID)
        .expect("session id issued")
        .to_str()
        .unwrap()
        .to_string();
    // Drain the SSE body carrying the initialize response.
    let body = body_text(response).await;
    assert!(body.contains("protocolVersion"));

    let response = send(
        server,
        post_with_session(
            &session_id,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    session_id
}

#[tokio::test]
async fn unsupported_method_is_405_with_allow() {
    let server = streamable(StreamableServerConfig::default());
    let request = Request::builder()
        .method("PUT")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get(header::ALLOW).unwrap(),
        "GET, POST"
    );
}

#[tokio::test]
async fn post_requires_both_accept_types() {
    let server = streamable(StreamableServerConfig::default());
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::ACCEPT, "application/json")
        .body(Body::from(initialize_body()))
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_requires_sse_accept() {
    let server = streamable(StreamableServerConfig::default());
    let request = Request::builder()
        .method("GET")
        .uri("/mcp")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_without_session_header_is_400_and_unknown_is_404() {
    let server = streamable(StreamableServerConfig::default());
    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    request
        .headers_mut()
        .insert(headers::MCP_SESSION_ID, "nope".parse().unwrap());
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_with_unknown_session_is_404() {
    let server = streamable(StreamableServerConfig::default());
    let response = send(&server, post_with_session("missing", initialize_body())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_body_is_413_and_closes_the_connection() {
    let server = streamable(StreamableServerConfig {
        max_body_bytes: 64,
        json_response: false,
    });
    let huge = format!(
        r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#,
        "x".repeat(512)
    );
    let response = send(&server, post(huge)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
}

#[tokio::test]
async fn malformed_body_is_400() {
    let server = streamable(StreamableServerConfig::default());
    let response = send(&server, post("{not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn initialize_issues_a_session_and_answers_over_sse() {
    let server = streamable(StreamableServerConfig::default());
    let response = send(&server, post(initialize_body())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(headers::MCP_SESSION_ID));
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("text/event-stream")
    );

    let events = sse_events(&body_text(response).await);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "1_0");
    assert_eq!(events[0].1["id"], json!(1));
    assert_eq!(events[0].1["result"]["serverInfo"]["name"], json!("http-demo"));
}

#[tokio::test]
async fn json_response_mode_answers_with_plain_json() {
    let server = streamable(StreamableServerConfig {
        max_body_bytes: 0,
        json_response: true,
    });
    let response = send(&server, post(initialize_body())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["id"], json!(1));
    assert!(body["result"]["capabilities"].is_object());
}

#[tokio::test]
async fn notifications_only_post_is_202_with_empty_body() {
    let server = streamable(StreamableServerConfig::default());
    let session_id = establish_session(&server).await;

    let response = send(
        &server,
        post_with_session(
            &session_id,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn batched_requests_share_one_stream() {
    let server = streamable(StreamableServerConfig::default());
    let session_id = establish_session(&server).await;

    let batch = json!([
        {"jsonrpc": "2.0", "id": 10, "method": "ping"},
        {"jsonrpc": "2.0", "id": 11, "method": "ping"}
    ])
    .to_string();
    let response = send(&server, post_with_session(&session_id, batch)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = sse_events(&body_text(response).await);
    assert_eq!(events.len(), 2);
    // One stream, gap-free indices, both responses present.
    let (stream, first) = parse_event_id(&events[0].0).unwrap();
    let (stream2, second) = parse_event_id(&events[1].0).unwrap();
    assert_eq!(stream, stream2);
    assert_eq!((first, second), (0, 1));
    let answered: Vec<i64> = events
        .iter()
        .map(|(_, v)| v["id"].as_i64().unwrap())
        .collect();
    assert_eq!(
        {
            let mut sorted = answered.clone();
            sorted.sort_unstable();
            sorted
        },
        vec![10, 11]
    );
}

#[tokio::test]
async fn replay_resumes_any_suffix_without_gaps_or_duplicates() {
    let server = streamable(StreamableServerConfig::default());
    let session_id = establish_session(&server).await;

    // One POST whose handler emits ten progress notifications, then the
    // response: events 0..=10 on one stream.
    let call = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "makeProgress",
            "_meta": {"progressToken": "replay-probe"}
        }
    })
    .to_string();
    let response = send(&server, post_with_session(&session_id, call)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let original = sse_events(&body_text(response).await);
    assert_eq!(original.len(), 11);
    let (stream_id, _) = parse_event_id(&original[0].0).unwrap();

    for (index, (id, _)) in original.iter().enumerate() {
        assert_eq!(*id, format!("{stream_id}_{index}"));
    }

    // Reconnect from every possible position and demand the exact suffix.
    for k in 0..original.len() {
        let request = Request::builder()
            .method("GET")
            .uri("/mcp")
            .header(header::ACCEPT, "text/event-stream")
            .header(headers::MCP_SESSION_ID, session_id.clone())
            .header(headers::LAST_EVENT_ID, format!("{stream_id}_{k}"))
            .body(Body::empty())
            .unwrap();
        let response = send(&server, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let replayed = sse_events(&body_text(response).await);
        let expected: Vec<_> = original[k + 1..].to_vec();
        assert_eq!(replayed, expected, "suffix after index {k}");
    }
}

#[tokio::test]
async fn concurrent_writers_for_one_stream_conflict() {
    let server = streamable(StreamableServerConfig::default());
    let session_id = establish_session(&server).await;

    let get = |session_id: String| {
        Request::builder()
            .method("GET")
            .uri("/mcp")
            .header(header::ACCEPT, "text/event-stream")
            .header(headers::MCP_SESSION_ID, session_id)
            .body(Body::empty())
            .unwrap()
    };

    // The first GET holds stream 0 open for as long as its body is alive.
    let held = send(&server, get(session_id.clone())).await;
    assert_eq!(held.status(), StatusCode::OK);

    let response = send(&server, get(session_id.clone())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_text(response)
            .await
            .contains("stream conflicts with ongoing stream")
    );

    // Dropping the first writer frees the stream for a successor.
    drop(held);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let response = send(&server, get(session_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_terminates_the_session() {
    let server = streamable(StreamableServerConfig::default());
    let session_id = establish_session(&server).await;
    assert_eq!(server.session_count(), 1);

    let mut request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    request
        .headers_mut()
        .insert(headers::MCP_SESSION_ID, session_id.parse().unwrap());
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.session_count(), 0);

    // The session is gone for POSTs and Gone for GETs.
    let response = send(
        &server,
        post_with_session(&session_id, json!({"jsonrpc":"2.0","id":9,"method":"ping"}).to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("GET")
        .uri("/mcp")
        .header(header::ACCEPT, "text/event-stream")
        .header(headers::MCP_SESSION_ID, session_id.as_str())
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn requests_before_initialized_get_the_gating_error() {
    let server = streamable(StreamableServerConfig::default());

    // Initialize establishes the session, but the client never confirms.
    let response = send(&server, post(initialize_body())).await;
    let session_id = response
        .headers()
        .get(headers::MCP_SESSION_ID)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let _ = body_text(response).await;

    let response = send(
        &server,
        post_with_session(
            &session_id,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"}).to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let events = sse_events(&body_text(response).await);
    assert_eq!(events.len(), 1);
    assert!(
        events[0].1["error"]["message"]
            .as_str()
            .unwrap()
            .contains("invalid during session initialization")
    );
}
