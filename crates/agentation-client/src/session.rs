//! Client session: one relay connection, pending requests and reconnection.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use agentation_protocols::{
    Annotation, ConnectPayload, Envelope, ErrorCode, ErrorPayload, FeedbackResultPayload,
    MessageKind, NORMAL_CLOSURE, StatusPayload, SubmitFeedbackPayload, new_request_id,
};

use crate::config::SessionConfig;
use crate::design_terms::{DesignTermCatalog, DesignTermResolver, expand_design_terms};
use crate::error::ClientError;
use crate::pending::PendingRequests;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>;
type WsSource = SplitStream<WsStream>;

type StatusObserver = Arc<dyn Fn(SessionStatus) + Send + Sync>;
type ResultObserver = Arc<dyn Fn(&FeedbackResultPayload) + Send + Sync>;
type MessageHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Close code reported when the close frame carried none.
const NO_STATUS_RECEIVED: u16 = 1005;
/// Close code reported when the transport dropped without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Page the session is running on, announced in `connect` and `submit-feedback`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Status delivered to the status observer.
///
/// Connection changes carry only `connected`; `status` replies from the relay
/// also carry its capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub connected: bool,
    pub mcp_connected: Option<bool>,
    pub sampling_supported: Option<bool>,
}

impl SessionStatus {
    fn connection(connected: bool) -> Self {
        Self {
            connected,
            mcp_connected: None,
            sampling_supported: None,
        }
    }
}

impl From<StatusPayload> for SessionStatus {
    fn from(status: StatusPayload) -> Self {
        Self {
            connected: status.connected,
            mcp_connected: Some(status.mcp_connected),
            sampling_supported: Some(status.sampling_supported),
        }
    }
}

/// Transport state. Never held across an `.await`.
struct LinkState {
    sink: Option<WsSink>,
    server_url: String,
    connected: bool,
    has_ever_connected: bool,
    auto_reconnect: bool,
    reconnecting: bool,
    /// Bumped on every open and on `disconnect`; stale receive loops compare against it.
    generation: u64,
    recv_task: Option<JoinHandle<()>>,
}

struct SessionInner {
    config: SessionConfig,
    page: RwLock<PageInfo>,
    link: Mutex<LinkState>,
    /// Serializes connection attempts so `connect` is idempotent.
    connect_lock: tokio::sync::Mutex<()>,
    pending: PendingRequests,
    status_observer: RwLock<Option<StatusObserver>>,
    result_observer: RwLock<Option<ResultObserver>>,
    handlers: RwLock<HashMap<String, MessageHandler>>,
    resolver: RwLock<Arc<dyn DesignTermResolver>>,
}

/// Client session to the relay server.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

impl ClientSession {
    pub fn new(config: SessionConfig) -> Self {
        let server_url = config.server_url.clone();
        Self {
            inner: Arc::new(SessionInner {
                config,
                page: RwLock::new(PageInfo::default()),
                link: Mutex::new(LinkState {
                    sink: None,
                    server_url,
                    connected: false,
                    has_ever_connected: false,
                    auto_reconnect: true,
                    reconnecting: false,
                    generation: 0,
                    recv_task: None,
                }),
                connect_lock: tokio::sync::Mutex::new(()),
                pending: PendingRequests::default(),
                status_observer: RwLock::new(None),
                result_observer: RwLock::new(None),
                handlers: RwLock::new(HashMap::new()),
                resolver: RwLock::new(Arc::new(DesignTermCatalog::builtin())),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Set the page metadata sent with `connect` and `submit-feedback`.
    pub fn set_page(&self, url: impl Into<String>, title: impl Into<String>) {
        *self.inner.page.write() = PageInfo {
            url: url.into(),
            title: title.into(),
        };
    }

    pub fn page(&self) -> PageInfo {
        self.inner.page.read().clone()
    }

    /// Replace the design term resolver (the built-in catalog by default).
    pub fn set_design_term_resolver(&self, resolver: Arc<dyn DesignTermResolver>) {
        *self.inner.resolver.write() = resolver;
    }

    /// Observe connection changes and `status` replies.
    pub fn on_status_change<F>(&self, observer: F)
    where
        F: Fn(SessionStatus) + Send + Sync + 'static,
    {
        *self.inner.status_observer.write() = Some(Arc::new(observer));
    }

    /// Observe every `feedback-result`, matched or not.
    pub fn on_feedback_result<F>(&self, observer: F)
    where
        F: Fn(&FeedbackResultPayload) + Send + Sync + 'static,
    {
        *self.inner.result_observer.write() = Some(Arc::new(observer));
    }

    /// Handle messages of a kind the session does not process itself.
    pub fn on<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .insert(kind.into(), Arc::new(handler));
    }

    pub fn off(&self, kind: &str) {
        self.inner.handlers.write().remove(kind);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.lock().connected
    }

    /// Number of `submit_feedback` calls awaiting a result.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Outstanding correlation ids with their deadlines, earliest first.
    pub fn pending_requests(&self) -> Vec<(String, Instant)> {
        self.inner.pending.deadlines()
    }

    /// Open the connection and announce the page.
    ///
    /// Resolves immediately when already connected. With `silent`, a failure
    /// is logged at debug level only. After [`disconnect`](Self::disconnect)
    /// the session can still connect explicitly but never reconnects on its own.
    pub async fn connect(&self, url: &str, silent: bool) -> Result<(), ClientError> {
        let _attempt = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        self.inner.link.lock().server_url = url.to_string();
        SessionInner::open(&self.inner, url, silent).await
    }

    /// Close the connection on purpose.
    ///
    /// Sends `disconnect`, closes with code 1000, rejects outstanding requests
    /// and disables automatic reconnection for good.
    pub async fn disconnect(&self) {
        let (sink, recv_task, was_connected) = {
            let mut link = self.inner.link.lock();
            link.auto_reconnect = false;
            link.generation += 1;
            let was_connected = std::mem::replace(&mut link.connected, false);
            (link.sink.take(), link.recv_task.take(), was_connected)
        };

        if let Some(sink) = sink {
            let _ = send_on(&sink, &Envelope::disconnect()).await;
            close_normally(&sink, "Client requested disconnect").await;
        }
        if let Some(task) = recv_task {
            task.abort();
        }

        let rejected = self.inner.pending.reject_all(|| ClientError::Disconnected);
        if rejected > 0 {
            debug!("Rejected {} pending request(s) on disconnect", rejected);
        }
        if was_connected {
            info!("Disconnected from relay server");
            self.inner.notify_status(SessionStatus::connection(false));
        }
    }

    /// Submit annotations and wait for the AI's response.
    ///
    /// Fails with [`ClientError::Timeout`] when no result arrives within the
    /// configured deadline, [`ClientError::ConnectionLost`] when the connection
    /// drops first and [`ClientError::Server`] when the relay reports failure.
    pub async fn submit_feedback(
        &self,
        annotations: Vec<Annotation>,
        additional_context: Option<String>,
    ) -> Result<String, ClientError> {
        let sink = self.inner.live_sink().ok_or(ClientError::NotConnected)?;

        let id = new_request_id();
        let resolver = self.inner.resolver.read().clone();
        let page = self.page();
        let payload = SubmitFeedbackPayload {
            page_url: page.url,
            page_title: page.title,
            annotations: expand_design_terms(annotations, resolver.as_ref()),
            additional_context,
        };

        let timeout = self.inner.config.request_timeout;
        let (rx, deadline, _pending) = self.inner.pending.register(&id, timeout);
        send_on(&sink, &Envelope::submit_feedback(&id, &payload)).await?;
        debug!("Submitted feedback {} ({} annotation(s))", id, payload.annotations.len());

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionLost),
            Err(_) => {
                warn!("Feedback {} timed out after {:?}", id, timeout);
                Err(ClientError::Timeout(timeout))
            }
        }
    }

    /// Ask the relay for its capability status; the reply goes to the status observer.
    pub async fn request_status(&self) -> Result<(), ClientError> {
        let sink = self.inner.live_sink().ok_or(ClientError::NotConnected)?;
        send_on(&sink, &Envelope::status_request()).await
    }
}

impl SessionInner {
    fn live_sink(&self) -> Option<WsSink> {
        let link = self.link.lock();
        if link.connected { link.sink.clone() } else { None }
    }

    /// Open a transport, announce the page and start the receive loop.
    ///
    /// A `disconnect` that lands while the handshake is in flight wins: the
    /// new transport is closed with a normal closure and
    /// [`ClientError::Disconnected`] is returned.
    async fn open(self: &Arc<Self>, url: &str, silent: bool) -> Result<(), ClientError> {
        let started_at = self.link.lock().generation;
        let stream = match tokio_tungstenite::connect_async(url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                let first_attempt = !self.link.lock().has_ever_connected;
                if silent || !first_attempt {
                    debug!("Connection to {} failed: {}", url, e);
                } else {
                    warn!("Relay server not available at {}: {}", url, e);
                }
                return Err(ClientError::ConnectionFailed(e.to_string()));
            }
        };

        let (sink, source) = stream.split();
        let sink: WsSink = Arc::new(tokio::sync::Mutex::new(sink));

        let page = self.page.read().clone();
        let hello = Envelope::connect(&ConnectPayload {
            page_url: page.url,
            page_title: page.title,
        });
        send_on(&sink, &hello).await?;

        let generation = {
            let mut link = self.link.lock();
            if link.generation == started_at {
                link.generation += 1;
                link.sink = Some(sink.clone());
                link.connected = true;
                link.has_ever_connected = true;
                link.reconnecting = false;
                Some(link.generation)
            } else {
                link.reconnecting = false;
                None
            }
        };
        let Some(generation) = generation else {
            debug!("Disconnected while connecting to {}", url);
            close_normally(&sink, "Client requested disconnect").await;
            return Err(ClientError::Disconnected);
        };

        info!("Connected to relay server at {}", url);
        self.notify_status(SessionStatus::connection(true));

        let mut link = self.link.lock();
        if link.generation != generation {
            // Disconnected after the commit; `disconnect` already closed the sink.
            return Ok(());
        }
        let task = tokio::spawn(receive_loop(Arc::downgrade(self), source, generation));
        if let Some(previous) = link.recv_task.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn notify_status(&self, status: SessionStatus) {
        let observer = self.status_observer.read().clone();
        if let Some(observer) = observer {
            observer(status);
        }
    }

    fn handle_text(&self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to parse message from relay: {}", e);
                return;
            }
        };
        trace!("Received {} from relay", envelope.kind);

        match &envelope.kind {
            MessageKind::Status => match envelope.parse_payload::<StatusPayload>() {
                Ok(status) => self.notify_status(status.into()),
                Err(e) => warn!("Ignoring malformed status: {}", e),
            },
            MessageKind::FeedbackResult => {
                match envelope.parse_payload::<FeedbackResultPayload>() {
                    Ok(result) => self.handle_feedback_result(result),
                    Err(e) => warn!("Ignoring malformed feedback-result: {}", e),
                }
            }
            MessageKind::Error => match envelope.parse_payload::<ErrorPayload>() {
                Ok(error) => self.handle_error(envelope.id.as_deref(), error),
                Err(e) => warn!("Ignoring malformed error: {}", e),
            },
            kind => {
                let handler = self.handlers.read().get(kind.as_str()).cloned();
                match handler {
                    Some(handler) => handler(&envelope),
                    None => debug!("No handler for {} message", kind),
                }
            }
        }
    }

    fn handle_feedback_result(&self, result: FeedbackResultPayload) {
        let outcome = if result.success {
            Ok(result.response.clone().unwrap_or_default())
        } else {
            Err(ClientError::Server(
                result
                    .message
                    .clone()
                    .unwrap_or_else(|| "Feedback processing failed".to_string()),
            ))
        };
        if !self.pending.resolve(&result.request_id, outcome) {
            debug!("No pending request for {}", result.request_id);
        }

        let observer = self.result_observer.read().clone();
        if let Some(observer) = observer {
            observer(&result);
        }
    }

    /// An error carrying a request id fails that request only.
    fn handle_error(&self, request_id: Option<&str>, error: ErrorPayload) {
        warn!("Relay server error {}: {}", error.code, error.message);
        if let Some(id) = request_id {
            if self
                .pending
                .resolve(id, Err(ClientError::Server(error.message.clone())))
            {
                return;
            }
        }
        if matches!(error.code, ErrorCode::ConnectionFailed | ErrorCode::ServerError) {
            let rejected = self
                .pending
                .reject_all(|| ClientError::Server(error.message.clone()));
            if rejected > 0 {
                debug!("Rejected {} pending request(s) after {}", rejected, error.code);
            }
        }
    }

    /// Transport closed underneath the session.
    fn handle_close(self: &Arc<Self>, generation: u64, code: u16) {
        let schedule_reconnect = {
            let mut link = self.link.lock();
            if link.generation != generation || !link.connected {
                return;
            }
            link.connected = false;
            link.sink = None;
            link.recv_task = None;
            let reconnect = link.auto_reconnect
                && link.has_ever_connected
                && code != NORMAL_CLOSURE
                && !link.reconnecting
                && self.config.max_reconnect_attempts > 0;
            if reconnect {
                link.reconnecting = true;
            }
            reconnect
        };

        let rejected = self.pending.reject_all(|| ClientError::ConnectionLost);
        if rejected > 0 {
            warn!("Connection lost with {} pending request(s)", rejected);
        }
        info!("Disconnected from relay server (code {})", code);
        self.notify_status(SessionStatus::connection(false));

        if schedule_reconnect {
            tokio::spawn(reconnect_loop(Arc::downgrade(self)));
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = self.link.get_mut().recv_task.take() {
            task.abort();
        }
    }
}

async fn send_on(sink: &WsSink, envelope: &Envelope) -> Result<(), ClientError> {
    let text = envelope.encode()?;
    sink.lock().await.send(Message::text(text)).await?;
    Ok(())
}

/// Send a normal-closure close frame and flush it.
async fn close_normally(sink: &WsSink, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    };
    let mut sink = sink.lock().await;
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.flush().await;
}

/// Read frames until the transport closes, then report the close code.
async fn receive_loop(session: Weak<SessionInner>, mut source: WsSource, generation: u64) {
    let mut close_code = ABNORMAL_CLOSURE;

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let Some(inner) = session.upgrade() else {
                    return;
                };
                inner.handle_text(text.as_str());
            }
            Ok(Message::Close(frame)) => {
                close_code = frame
                    .map(|f| u16::from(f.code))
                    .unwrap_or(NO_STATUS_RECEIVED);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }

    if let Some(inner) = session.upgrade() {
        inner.handle_close(generation, close_code);
    }
}

/// Bounded reconnection after an unexpected close.
///
/// Boxed so the `open -> receive_loop -> reconnect_loop -> open` chain has a
/// nameable future type.
fn reconnect_loop(session: Weak<SessionInner>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some((delay, max_attempts)) = session
            .upgrade()
            .map(|s| (s.config.reconnect_delay, s.config.max_reconnect_attempts))
        else {
            return;
        };

        for attempt in 1..=max_attempts {
            tokio::time::sleep(delay).await;

            let Some(inner) = session.upgrade() else {
                return;
            };
            let _attempt = inner.connect_lock.lock().await;
            let url = {
                let mut link = inner.link.lock();
                if !link.auto_reconnect || link.connected {
                    link.reconnecting = false;
                    return;
                }
                link.server_url.clone()
            };

            info!("Reconnecting to {} (attempt {}/{})", url, attempt, max_attempts);
            match SessionInner::open(&inner, &url, true).await {
                Ok(()) | Err(ClientError::Disconnected) => return,
                Err(_) => {}
            }
        }

        if let Some(inner) = session.upgrade() {
            inner.link.lock().reconnecting = false;
            warn!("Giving up on relay server after {} reconnection attempts", max_attempts);
        }
    })
}
