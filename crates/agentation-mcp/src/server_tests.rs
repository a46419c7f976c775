use super::*;

use agentation_protocols::{SamplingCapability, SamplingError, SamplingRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

struct Peer {
    lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
    input: WriteHalf<DuplexStream>,
}

impl Peer {
    async fn send(&mut self, value: Value) {
        let mut line = value.to_string();
        line.push('\n');
        self.input.write_all(line.as_bytes()).await.unwrap();
    }

    async fn send_raw(&mut self, raw: &str) {
        self.input.write_all(raw.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("line within timeout")
            .unwrap()
            .expect("server output open");
        serde_json::from_str(&line).unwrap()
    }
}

/// Start a server over in-memory pipes; returns the server and the client side.
fn start() -> (Arc<McpServer>, Peer, tokio::task::JoinHandle<Result<(), TransportError>>) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let (client_read, client_write) = tokio::io::split(client_io);

    let server = Arc::new(McpServer::new(
        Arc::new(RelayState::new()),
        LineWriter::new(server_write),
        Duration::from_secs(5),
    ));
    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.run(server_read).await })
    };
    let peer = Peer {
        lines: BufReader::new(client_read).lines(),
        input: client_write,
    };
    (server, peer, task)
}

async fn initialize(peer: &mut Peer, with_sampling: bool) -> Value {
    let capabilities = if with_sampling {
        json!({"sampling": {}})
    } else {
        json!({})
    };
    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": capabilities,
            "clientInfo": {"name": "test-client", "version": "1.0"}
        }
    }))
    .await;
    let response = peer.recv().await;
    peer.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    response
}

#[tokio::test]
async fn test_initialize_records_sampling_capability() {
    let (server, mut peer, _task) = start();
    let response = initialize(&mut peer, true).await;

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "agentation");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(server.sampler().client_supports_sampling());

    peer.send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await;
    assert_eq!(peer.recv().await["result"], json!({}));
    assert!(server.is_initialized());
}

#[tokio::test]
async fn test_tools_list_and_call() {
    let (_server, mut peer, _task) = start();
    initialize(&mut peer, false).await;

    peer.send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let list = peer.recv().await;
    assert_eq!(list["result"]["tools"][0]["name"], "get-pending-feedback");
    assert_eq!(list["result"]["tools"][1]["name"], "get-connection-status");

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {"name": "get-connection-status", "arguments": {}}
    }))
    .await;
    let call = peer.recv().await;
    let text = call["result"]["content"][0]["text"].as_str().unwrap();
    let body: Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["status"], "disconnected");
}

#[tokio::test]
async fn test_errors_for_unknown_method_and_garbage() {
    let (_server, mut peer, _task) = start();

    peer.send(json!({"jsonrpc": "2.0", "id": "x", "method": "resources/list"}))
        .await;
    let unknown = peer.recv().await;
    assert_eq!(unknown["id"], "x");
    assert_eq!(unknown["error"]["code"], -32601);

    peer.send_raw("this is not json\n").await;
    let garbage = peer.recv().await;
    assert_eq!(garbage["error"]["code"], -32700);
    assert!(garbage["id"].is_null());

    peer.send(json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {}}))
        .await;
    assert_eq!(peer.recv().await["error"]["code"], -32602);
}

#[tokio::test]
async fn test_sampling_round_trip_through_stdio() {
    let (server, mut peer, _task) = start();
    initialize(&mut peer, true).await;

    let sampler = server.sampler();
    let call = tokio::spawn(async move {
        sampler
            .create_message(SamplingRequest::user_text("# UI Feedback Request", 4096))
            .await
    });

    let request = peer.recv().await;
    assert_eq!(request["method"], "sampling/createMessage");
    assert_eq!(request["params"]["messages"][0]["content"]["text"], "# UI Feedback Request");
    peer.send(json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": {
            "role": "assistant",
            "content": {"type": "text", "text": "Increase font-size to 48px"},
            "model": "claude-3-5-sonnet",
            "stopReason": "endTurn"
        }
    }))
    .await;

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.content.as_text(), Some("Increase font-size to 48px"));
}

#[tokio::test]
async fn test_sampling_unsupported_without_declaration() {
    let (server, mut peer, _task) = start();
    initialize(&mut peer, false).await;

    let err = server
        .sampler()
        .create_message(SamplingRequest::user_text("hi", 16))
        .await
        .unwrap_err();
    assert_eq!(err, SamplingError::Unsupported);
}

#[tokio::test]
async fn test_end_of_input_stops_server_and_fails_sampling() {
    let (server, mut peer, task) = start();
    initialize(&mut peer, true).await;

    let sampler = server.sampler();
    let call = tokio::spawn(async move {
        sampler
            .create_message(SamplingRequest::user_text("hi", 16))
            .await
    });
    peer.recv().await;

    peer.input.shutdown().await.unwrap();
    task.await.unwrap().unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err, SamplingError::Failed("MCP client disconnected".to_string()));
    assert!(!server.sampler().is_available());
}
