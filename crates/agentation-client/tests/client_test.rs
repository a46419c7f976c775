//! Client session against a live relay and against scripted raw servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use agentation_client::{ClientError, ClientSession, SessionConfig, SessionStatus};
use agentation_protocols::{Annotation, Envelope, FeedbackHandler, FeedbackRequest, HandlerError};
use agentation_relay::{PLACEHOLDER_RESPONSE, RelayConfig, RelayServer};

struct ScriptedHandler;

#[async_trait]
impl FeedbackHandler for ScriptedHandler {
    async fn handle(&self, request: &FeedbackRequest) -> Result<String, HandlerError> {
        let feedback = request.payload.annotations[0].feedback().to_string();
        match feedback.as_str() {
            "too small" => Ok("Increase font-size to 48px".to_string()),
            "broken" => Err(HandlerError::failed("model unavailable")),
            "slow" => {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok("slow done".to_string())
            }
            other => Ok(format!("handled: {}", other)),
        }
    }
}

async fn start_relay(with_handler: bool) -> (RelayServer, String) {
    let relay = RelayServer::new(RelayConfig::new("127.0.0.1", 0));
    if with_handler {
        relay.set_feedback_handler(Arc::new(ScriptedHandler));
    }
    let addr = relay.start().await.unwrap();
    (relay, format!("ws://{}", addr))
}

fn session_with(request_timeout: Duration, reconnect_delay: Duration) -> ClientSession {
    let session = ClientSession::new(SessionConfig {
        request_timeout,
        reconnect_delay,
        ..SessionConfig::default()
    });
    session.set_page("http://localhost:3000/landing", "Landing");
    session
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_feedback_round_trip() {
    let (relay, url) = start_relay(true).await;
    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    session.connect(&url, false).await.unwrap();

    let response = session
        .submit_feedback(vec![Annotation::single(1, "#hero", "too small")], None)
        .await
        .unwrap();
    assert_eq!(response, "Increase font-size to 48px");
    assert_eq!(session.pending_count(), 0);

    let clients = relay.clients();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].page_url, "http://localhost:3000/landing");

    session.disconnect().await;
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_handler_failure_rejects_with_server_message() {
    let (relay, url) = start_relay(true).await;
    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    session.connect(&url, false).await.unwrap();

    let result = session
        .submit_feedback(vec![Annotation::single(1, "#cta", "broken")], None)
        .await;
    match result {
        Err(ClientError::Server(message)) => assert_eq!(message, "model unavailable"),
        other => panic!("expected server error, got {:?}", other),
    }

    // The connection survives a failed submission.
    let response = session
        .submit_feedback(vec![Annotation::single(2, "#cta", "too small")], None)
        .await
        .unwrap();
    assert_eq!(response, "Increase font-size to 48px");

    session.disconnect().await;
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_submissions_resolve_by_id() {
    let (relay, url) = start_relay(true).await;
    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    session.connect(&url, false).await.unwrap();

    let slow = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .submit_feedback(vec![Annotation::single(1, "#a", "slow")], None)
                .await
        })
    };
    wait_until(|| session.pending_count() == 1).await;
    let fast = session
        .submit_feedback(vec![Annotation::single(2, "#b", "quick")], None)
        .await
        .unwrap();
    assert_eq!(fast, "handled: quick");
    assert_eq!(slow.await.unwrap().unwrap(), "slow done");

    session.disconnect().await;
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_placeholder_response_without_handler() {
    let (relay, url) = start_relay(false).await;
    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    session.connect(&url, false).await.unwrap();

    let response = session
        .submit_feedback(vec![Annotation::single(1, "#hero", "too small")], None)
        .await
        .unwrap();
    assert_eq!(response, PLACEHOLDER_RESPONSE);

    session.disconnect().await;
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (relay, url) = start_relay(true).await;
    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    session.connect(&url, false).await.unwrap();
    session.connect(&url, false).await.unwrap();

    wait_until(|| relay.connection_count() == 1).await;
    assert_eq!(relay.state().transport_count(), 1);

    session.disconnect().await;
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_status_observer_sees_connection_and_capability() {
    let (relay, url) = start_relay(true).await;
    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    let seen: Arc<Mutex<Vec<SessionStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.on_status_change(move |status| sink.lock().push(status));

    session.connect(&url, false).await.unwrap();
    // The relay answers `connect` with a status reply.
    wait_until(|| seen.lock().iter().any(|s| s.mcp_connected.is_some())).await;

    let statuses = seen.lock().clone();
    assert_eq!(statuses[0], SessionStatus {
        connected: true,
        mcp_connected: None,
        sampling_supported: None,
    });
    assert!(
        statuses
            .iter()
            .any(|s| s.mcp_connected == Some(true) && s.sampling_supported == Some(true))
    );

    session.disconnect().await;
    assert_eq!(seen.lock().last().map(|s| s.connected), Some(false));
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_reports_connection_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    let result = session.connect(&format!("ws://{}", addr), true).await;
    assert!(matches!(result, Err(ClientError::ConnectionFailed(_))));
    assert!(!session.is_connected());
}

/// Accept connections and read frames without ever answering submissions.
async fn silent_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });
    (addr, accepts)
}

#[tokio::test]
async fn test_submission_times_out_and_is_forgotten() {
    let (addr, _) = silent_server().await;
    let session = session_with(Duration::from_millis(200), Duration::from_secs(3));
    session.connect(&format!("ws://{}", addr), false).await.unwrap();

    let result = session
        .submit_feedback(vec![Annotation::single(1, "#hero", "too small")], None)
        .await;
    assert!(matches!(result, Err(ClientError::Timeout(d)) if d == Duration::from_millis(200)));
    assert_eq!(session.pending_count(), 0);
    assert!(session.is_connected());

    session.disconnect().await;
}

/// Serve one WebSocket that drops after the first submission; refuse every later handshake.
///
/// Returns the instant of every accepted TCP connection.
async fn dropping_server() -> (SocketAddr, Arc<Mutex<Vec<Instant>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let log = accepts.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let first = {
                let mut log = log.lock();
                log.push(Instant::now());
                log.len() == 1
            };
            if !first {
                drop(stream);
                continue;
            }
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                // `connect`, then `submit-feedback`.
                for _ in 0..2 {
                    if ws.next().await.is_none() {
                        return;
                    }
                }
                drop(ws);
            });
        }
    });
    (addr, accepts)
}

#[tokio::test]
async fn test_connection_loss_rejects_pending_and_reconnect_is_bounded() {
    let (addr, accepts) = dropping_server().await;
    let session = session_with(Duration::from_secs(5), Duration::from_millis(50));
    session.connect(&format!("ws://{}", addr), false).await.unwrap();

    let result = session
        .submit_feedback(vec![Annotation::single(1, "#hero", "too small")], None)
        .await;
    assert!(matches!(result, Err(ClientError::ConnectionLost)));
    assert_eq!(session.pending_count(), 0);

    // One initial connection plus at most three reconnections.
    wait_until(|| accepts.lock().len() == 4).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepts.lock().len(), 4);
}

#[tokio::test]
async fn test_reconnect_attempts_are_spaced_by_delay() {
    let delay = Duration::from_millis(100);
    let (addr, accepts) = dropping_server().await;
    let session = session_with(Duration::from_secs(5), delay);
    session.connect(&format!("ws://{}", addr), false).await.unwrap();

    let _ = session
        .submit_feedback(vec![Annotation::single(1, "#hero", "too small")], None)
        .await;

    wait_until(|| accepts.lock().len() == 4).await;
    let accepts = accepts.lock().clone();
    for pair in accepts.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= delay, "attempts only {:?} apart", gap);
    }
}

/// Count TCP connections on `listener`; every stream is passed to `serve`.
fn count_accepts<F, Fut>(listener: TcpListener, serve: F) -> Arc<AtomicUsize>
where
    F: Fn(tokio::net::TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve(stream));
        }
    });
    accepts
}

#[tokio::test]
async fn test_server_normal_closure_does_not_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = count_accepts(listener, |stream| async move {
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        ws.next().await;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "done".into(),
        };
        let _ = ws.close(Some(frame)).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let session = session_with(Duration::from_secs(5), Duration::from_millis(50));
    session.connect(&format!("ws://{}", addr), false).await.unwrap();

    wait_until(|| !session.is_connected()).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_relay_shutdown_does_not_trigger_reconnect() {
    let (relay, url) = start_relay(true).await;
    let addr = relay.local_addr().unwrap();
    let session = session_with(Duration::from_secs(5), Duration::from_millis(50));
    session.connect(&url, false).await.unwrap();

    relay.stop().await.unwrap();
    wait_until(|| !session.is_connected()).await;

    // Take over the port so any reconnection attempt would be seen.
    let listener = TcpListener::bind(addr).await.unwrap();
    let accepts = count_accepts(listener, |stream| async move {
        let _ = tokio_tungstenite::accept_async(stream).await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_first_connect_never_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = count_accepts(listener, |stream| async move { drop(stream) });

    let session = session_with(Duration::from_secs(5), Duration::from_millis(50));
    let result = session.connect(&format!("ws://{}", addr), true).await;
    assert!(matches!(result, Err(ClientError::ConnectionFailed(_))));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_disconnect_during_reconnect_handshake_stays_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let later_frames: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
    let accepts = {
        let seen = Arc::new(AtomicUsize::new(0));
        let later_frames = later_frames.clone();
        count_accepts(listener, move |stream| {
            let first = seen.fetch_add(1, Ordering::SeqCst) == 0;
            let later_frames = later_frames.clone();
            async move {
                if first {
                    // Drop right after `connect` so the session reconnects.
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    ws.next().await;
                    drop(ws);
                    return;
                }
                // Hold the reconnection handshake open while the session disconnects.
                tokio::time::sleep(Duration::from_millis(400)).await;
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    later_frames.lock().push(message);
                }
            }
        })
    };

    let session = session_with(Duration::from_secs(5), Duration::from_millis(50));
    let seen: Arc<Mutex<Vec<SessionStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.on_status_change(move |status| sink.lock().push(status));
    session.connect(&format!("ws://{}", addr), false).await.unwrap();

    wait_until(|| accepts.load(Ordering::SeqCst) == 2).await;
    session.disconnect().await;

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!session.is_connected());
    assert_eq!(seen.lock().iter().filter(|s| s.connected).count(), 1);
    assert_eq!(accepts.load(Ordering::SeqCst), 2);
    assert!(
        later_frames
            .lock()
            .iter()
            .any(|m| matches!(m, Message::Close(Some(f)) if u16::from(f.code) == 1000))
    );
}

#[tokio::test]
async fn test_intentional_disconnect_closes_normally_without_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let frames: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
    let accepts = Arc::new(AtomicUsize::new(0));
    {
        let frames = frames.clone();
        let accepts = accepts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepts.fetch_add(1, Ordering::SeqCst);
                let frames = frames.clone();
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(message)) = ws.next().await {
                        frames.lock().push(message);
                    }
                });
            }
        });
    }

    let session = session_with(Duration::from_secs(5), Duration::from_millis(50));
    session.connect(&format!("ws://{}", addr), false).await.unwrap();
    session.disconnect().await;
    assert!(!session.is_connected());

    wait_until(|| {
        frames
            .lock()
            .iter()
            .any(|m| matches!(m, Message::Close(Some(f)) if u16::from(f.code) == 1000))
    })
    .await;
    let kinds: Vec<String> = frames
        .lock()
        .iter()
        .filter_map(|m| match m {
            Message::Text(text) => Envelope::decode(text.as_str()).ok(),
            _ => None,
        })
        .map(|e| e.kind.to_string())
        .collect();
    assert_eq!(kinds, vec!["connect".to_string(), "disconnect".to_string()]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    let result = session
        .submit_feedback(vec![Annotation::single(1, "#hero", "too small")], None)
        .await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_unhandled_kind_reaches_registered_handler() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Wait for `connect`, then push a kind the session does not process.
        ws.next().await;
        ws.send(Message::text(r#"{"type":"annotation-sync","payload":{"count":2}}"#.to_string()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let session = session_with(Duration::from_secs(5), Duration::from_secs(3));
    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.on("annotation-sync", move |envelope| {
        sink.lock().push(envelope.payload.clone().unwrap_or_default());
    });
    session.connect(&format!("ws://{}", addr), false).await.unwrap();

    wait_until(|| !seen.lock().is_empty()).await;
    assert_eq!(seen.lock()[0]["count"], 2);
    session.disconnect().await;
}
