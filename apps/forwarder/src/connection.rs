//! Connection state machine
//!
//! [`ConnectionManager`] owns the single physical WebSocket to the gateway.
//! It performs the hello/hello_ack handshake, dispatches inbound messages
//! while connected, and drives the fixed-schedule reconnect loop after an
//! unexpected close. All state transitions happen on the task running
//! [`ConnectionManager::run`] (or on the caller of the first connect), so they
//! are never concurrently in flight.

use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use hooktunnel_common::{
    Hello, Message, Result, TunnelError, TunnelRequest, TunnelSession,
    constants::{AUTH_FAILED_CODE, DISCONNECT_REASON},
    validation::sanitize_capabilities,
};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Error as WsError, Message as WsMessage,
        client::IntoClientRequest,
        http::{HeaderValue, StatusCode},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::forwarder::LocalForwarder;

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Pong and close frames, written ahead of responses
const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Forwarded responses waiting for the writer
const OUTGOING_CHANNEL_CAPACITY: usize = 100;

/// How long an explicit disconnect waits for the close frame to be written
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Why the connection loop stopped for good
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelExit {
    /// Explicit disconnect requested by the caller
    Disconnected,
    /// The gateway rejected the credentials
    AuthFailed(String),
    /// Every delay of the reconnect schedule was used without success
    RetriesExhausted { attempts: usize },
}

impl TunnelExit {
    /// Terminal failures as errors, `None` for a requested disconnect
    pub fn into_error(self) -> Option<TunnelError> {
        match self {
            TunnelExit::Disconnected => None,
            TunnelExit::AuthFailed(message) => Some(TunnelError::AuthFailed(message)),
            TunnelExit::RetriesExhausted { attempts } => {
                Some(TunnelError::RetriesExhausted(attempts))
            }
        }
    }
}

/// How a single physical connection ended
#[derive(Debug)]
enum SessionEnd {
    Disconnected,
    AuthFailed(String),
    Lost(String),
}

/// Next event from the read half
enum Inbound {
    Frame(WsMessage),
    Closed,
    Failed(String),
    Idle(Duration),
}

/// Connection manager handles WebSocket lifecycle and reconnection
pub(crate) struct ConnectionManager {
    config: Config,
    client_instance_id: String,
    state: watch::Sender<ConnectionState>,
    session: RwLock<Option<TunnelSession>>,
    forwarder: LocalForwarder,
}

impl ConnectionManager {
    pub(crate) fn new(
        mut config: Config,
        client_instance_id: String,
        forwarder: LocalForwarder,
    ) -> Self {
        let capabilities = sanitize_capabilities(config.capabilities);
        if capabilities != config.capabilities {
            warn!(
                "Adjusted advertised capabilities from {:?} to {:?}",
                config.capabilities, capabilities
            );
            config.capabilities = capabilities;
        }

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            client_instance_id,
            state,
            session: RwLock::new(None),
            forwarder,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn client_instance_id(&self) -> &str {
        &self.client_instance_id
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn session(&self) -> Option<TunnelSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Connection state: {:?} -> {:?}", previous, next);
        }
    }

    fn set_session(&self, session: Option<TunnelSession>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Move from `Disconnected` to `Connecting`, refusing any other start state
    pub(crate) fn begin_connect(&self) -> Result<()> {
        let mut current = ConnectionState::Disconnected;
        let started = self.state.send_if_modified(|state| {
            current = *state;
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });

        if started {
            debug!("Connection state: Disconnected -> Connecting");
            Ok(())
        } else {
            Err(TunnelError::InvalidState(format!(
                "cannot connect while {:?}",
                current
            )))
        }
    }

    /// Install a freshly negotiated session and mark the tunnel connected
    pub(crate) fn on_established(&self, session: TunnelSession) {
        self.set_session(Some(session));
        self.set_state(ConnectionState::Connected);
    }

    /// Abandon a failed first connect
    pub(crate) fn on_connect_failed(&self) {
        self.set_session(None);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Message announcing this agent to the gateway
    pub(crate) fn hello(&self) -> Hello {
        Hello {
            client_instance_id: self.client_instance_id.clone(),
            env: self.config.env,
            local_base_url: self.config.local_base_url(),
            capabilities: self.config.capabilities,
            client_version: self.config.client_version.clone(),
        }
    }

    /// Open the transport and complete the handshake within the connect timeout
    pub(crate) async fn establish_connection(&self) -> Result<(WebSocket, TunnelSession)> {
        tokio::time::timeout(self.config.connect_timeout, self.open_and_handshake())
            .await
            .map_err(|_| TunnelError::HandshakeTimeout)?
    }

    async fn open_and_handshake(&self) -> Result<(WebSocket, TunnelSession)> {
        debug!("Connecting to {}", self.config.tunnel_url);

        let mut request = self
            .config
            .tunnel_url
            .as_str()
            .into_client_request()
            .map_err(|e| TunnelError::ConnectionError(format!("Invalid URL: {}", e)))?;

        if let Some(ref api_key) = self.config.api_key {
            request.headers_mut().insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                    TunnelError::InvalidConfig(format!("API key is not a valid header: {}", e))
                })?,
            );
        }

        let (mut ws_stream, _) = connect_async(request).await.map_err(map_connect_error)?;

        debug!("WebSocket connected, sending hello");
        let hello = Message::Hello(self.hello()).encode()?;
        ws_stream
            .send(WsMessage::Text(hello.into()))
            .await
            .map_err(|e| TunnelError::WebSocketError(format!("Failed to send hello: {}", e)))?;

        let session = self.await_hello_ack(&mut ws_stream).await?;
        if session.env != self.config.env {
            warn!(
                "Gateway bound the session to {} (requested {})",
                session.env, self.config.env
            );
        }
        debug!("Session established: {} {:?}", session.session_id, session.policies);

        Ok((ws_stream, session))
    }

    async fn await_hello_ack(&self, ws_stream: &mut WebSocket) -> Result<TunnelSession> {
        while let Some(frame) = ws_stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match Message::decode(&text) {
                    Ok(Message::HelloAck(ack)) => {
                        return Ok(TunnelSession::from_ack(ack, self.config.env));
                    }
                    Ok(Message::Error { code, message }) if code == AUTH_FAILED_CODE => {
                        return Err(TunnelError::AuthFailed(message));
                    }
                    Ok(Message::Error { code, message }) => {
                        error!("Server error during handshake: {} - {}", code, message);
                    }
                    Ok(Message::Ping { timestamp }) => {
                        let pong = Message::Pong { timestamp }.encode()?;
                        ws_stream
                            .send(WsMessage::Text(pong.into()))
                            .await
                            .map_err(|e| TunnelError::WebSocketError(e.to_string()))?;
                    }
                    Ok(other) => {
                        warn!("Ignoring {} message before handshake completed", other.kind());
                    }
                    Err(e) => warn!("Discarding message: {}", e),
                },
                Ok(WsMessage::Close(frame)) => {
                    let reason = frame
                        .map(|f| format!(" ({}: {})", f.code, f.reason))
                        .unwrap_or_default();
                    return Err(TunnelError::ConnectionError(format!(
                        "Server closed connection during handshake{}",
                        reason
                    )));
                }
                Ok(_) => {}
                Err(e) => return Err(TunnelError::WebSocketError(e.to_string())),
            }
        }

        Err(TunnelError::ConnectionError(
            "Connection closed before handshake".to_string(),
        ))
    }

    /// Serve an established connection, reconnecting after unexpected closes,
    /// until a terminal condition is reached
    pub(crate) async fn run(&self, ws: WebSocket, mut shutdown: watch::Receiver<bool>) -> TunnelExit {
        let mut ws = ws;

        let exit = loop {
            let end = self.handle_connection(ws, &mut shutdown).await;
            self.set_session(None);

            match end {
                SessionEnd::Disconnected => {
                    info!("Disconnected from gateway");
                    break TunnelExit::Disconnected;
                }
                SessionEnd::AuthFailed(message) => {
                    error!("Authentication failed: {}", message);
                    break TunnelExit::AuthFailed(message);
                }
                SessionEnd::Lost(reason) => {
                    warn!("Connection lost: {}", reason);
                    match self.reconnect(&mut shutdown).await {
                        Ok(next) => ws = next,
                        Err(exit) => break exit,
                    }
                }
            }
        };

        self.set_state(ConnectionState::Disconnected);
        exit
    }

    /// Walk the backoff schedule until a connection is re-established
    async fn reconnect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::result::Result<WebSocket, TunnelExit> {
        let mut attempt = 0;

        loop {
            let Some(delay) = self.config.reconnect.delay_for(attempt) else {
                error!("Max reconnection attempts reached ({})", attempt);
                return Err(TunnelExit::RetriesExhausted { attempts: attempt });
            };
            attempt += 1;

            self.set_state(ConnectionState::Reconnecting);
            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay,
                attempt,
                self.config.reconnect.max_attempts()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(shutdown) => return Err(TunnelExit::Disconnected),
            }

            self.set_state(ConnectionState::Connecting);
            let result = tokio::select! {
                result = self.establish_connection() => result,
                _ = shutdown_requested(shutdown) => return Err(TunnelExit::Disconnected),
            };

            match result {
                Ok((ws, session)) => {
                    info!("Tunnel re-established (session {}...)", session.short_id());
                    self.on_established(session);
                    return Ok(ws);
                }
                Err(TunnelError::AuthFailed(message)) => {
                    return Err(TunnelExit::AuthFailed(message));
                }
                Err(e) => warn!("Reconnection failed: {}", e),
            }
        }
    }

    /// Handle active WebSocket connection with a split writer task
    async fn handle_connection(
        &self,
        ws_stream: WebSocket,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let (write, mut read) = ws_stream.split();

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CHANNEL_CAPACITY);
        let mut write_handle = tokio::spawn(spawn_write_task(write, control_rx, outgoing_rx));

        let idle_limit = self.idle_limit();

        let end = loop {
            tokio::select! {
                _ = shutdown_requested(shutdown) => {
                    let close = WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: DISCONNECT_REASON.into(),
                    }));
                    if control_tx.send(close).await.is_ok()
                        && tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut write_handle)
                            .await
                            .is_err()
                    {
                        warn!("Timed out sending close frame");
                    }
                    break SessionEnd::Disconnected;
                }
                inbound = next_inbound(&mut read, idle_limit) => match inbound {
                    Inbound::Frame(frame) => {
                        if let Some(end) = self.handle_frame(frame, &control_tx, &outgoing_tx).await {
                            break end;
                        }
                    }
                    Inbound::Closed => break SessionEnd::Lost("connection closed".to_string()),
                    Inbound::Failed(e) => break SessionEnd::Lost(e),
                    Inbound::Idle(limit) => {
                        break SessionEnd::Lost(format!("no traffic for {}s", limit.as_secs()));
                    }
                },
                result = &mut write_handle => {
                    break SessionEnd::Lost(format!("write task ended: {:?}", result));
                }
            }
        };

        // Responses still in flight fail to send once the writer is gone
        write_handle.abort();
        end
    }

    async fn handle_frame(
        &self,
        frame: WsMessage,
        control_tx: &mpsc::Sender<WsMessage>,
        outgoing_tx: &mpsc::Sender<WsMessage>,
    ) -> Option<SessionEnd> {
        match frame {
            WsMessage::Text(text) => {
                return self.handle_text_message(&text, control_tx, outgoing_tx).await;
            }
            WsMessage::Binary(_) => {
                warn!("Received unexpected binary message");
            }
            WsMessage::Ping(data) => {
                debug!("Received WebSocket ping");
                if control_tx.send(WsMessage::Pong(data)).await.is_err() {
                    return Some(SessionEnd::Lost("write task gone".to_string()));
                }
            }
            WsMessage::Pong(_) => {
                debug!("Received WebSocket pong");
            }
            WsMessage::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{}: {}", f.code, f.reason))
                    .unwrap_or_else(|| "no reason".to_string());
                info!("Server closed connection ({})", reason);
                return Some(SessionEnd::Lost(format!("closed by server ({})", reason)));
            }
            WsMessage::Frame(_) => {}
        }
        None
    }

    /// Handle incoming text messages
    async fn handle_text_message(
        &self,
        text: &str,
        control_tx: &mpsc::Sender<WsMessage>,
        outgoing_tx: &mpsc::Sender<WsMessage>,
    ) -> Option<SessionEnd> {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding message: {}", e);
                return None;
            }
        };

        match message {
            Message::Request(request) => {
                debug!("Received request: {:?}", request.request_id);
                self.spawn_forward(request, outgoing_tx.clone());
            }

            Message::Ping { timestamp } => {
                let pong = match (Message::Pong { timestamp }).encode() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode pong: {}", e);
                        return None;
                    }
                };
                if control_tx.send(WsMessage::Text(pong.into())).await.is_err() {
                    return Some(SessionEnd::Lost("write task gone".to_string()));
                }
                debug!("Sent pong");
            }

            Message::Error { code, message } if code == AUTH_FAILED_CODE => {
                return Some(SessionEnd::AuthFailed(message));
            }

            Message::Error { code, message } => {
                error!("Server error: {} - {}", code, message);
            }

            Message::HelloAck(ack) => {
                warn!(
                    "Ignoring hello_ack for session {} on an established connection",
                    ack.tunnel_session_id
                );
            }

            other => {
                warn!("Received unexpected message type: {}", other.kind());
            }
        }

        None
    }

    /// Forward on a separate task so slow local calls never delay the read loop
    fn spawn_forward(&self, request: TunnelRequest, outgoing_tx: mpsc::Sender<WsMessage>) {
        let forwarder = self.forwarder.clone();

        tokio::spawn(async move {
            let response = forwarder.forward(request).await;
            let request_id = response.request_id.clone();

            let json = match Message::Response(response).encode() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to encode response for {}: {}", request_id, e);
                    return;
                }
            };

            if outgoing_tx.send(WsMessage::Text(json.into())).await.is_err() {
                debug!("Connection gone, dropping response for {}", request_id);
            }
        });
    }

    /// Silence after which the connection is presumed dead: the gateway's idle
    /// timeout plus one ping interval of slack. `None` when the gateway sets no
    /// idle timeout.
    fn idle_limit(&self) -> Option<Duration> {
        self.session()
            .map(|session| session.policies)
            .filter(|policies| policies.idle_timeout_seconds > 0)
            .map(|policies| {
                Duration::from_secs(policies.idle_timeout_seconds + policies.ping_interval_seconds)
            })
    }
}

/// Resolves once a disconnect is requested or the client is gone.
///
/// The watch guard is released here, so callers may await in the select arm.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn map_connect_error(err: WsError) -> TunnelError {
    match err {
        WsError::Http(response)
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            TunnelError::AuthFailed(format!("gateway rejected credentials ({})", response.status()))
        }
        other => TunnelError::ConnectionError(other.to_string()),
    }
}

async fn next_inbound(read: &mut SplitStream<WebSocket>, idle_limit: Option<Duration>) -> Inbound {
    let next = match idle_limit {
        Some(limit) => match tokio::time::timeout(limit, read.next()).await {
            Ok(next) => next,
            Err(_) => return Inbound::Idle(limit),
        },
        None => read.next().await,
    };

    match next {
        Some(Ok(frame)) => Inbound::Frame(frame),
        Some(Err(e)) => Inbound::Failed(e.to_string()),
        None => Inbound::Closed,
    }
}

/// Write task sends outgoing messages through WebSocket, control frames first
async fn spawn_write_task(
    mut write: SplitSink<WebSocket, WsMessage>,
    mut control_rx: mpsc::Receiver<WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) {
    loop {
        let message = tokio::select! {
            biased;
            Some(message) = control_rx.recv() => message,
            Some(message) = outgoing_rx.recv() => message,
            else => break,
        };

        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = write.send(message).await {
            error!("Failed to send message: {}", e);
            break;
        }
        if closing {
            break;
        }
    }

    debug!("Write task exiting");
}
