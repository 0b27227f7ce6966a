//! In-process gateway and local service used by the integration tests

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use hooktunnel::{Config, ReconnectConfig};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message as WsMessage,
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::CloseFrame,
    },
};

pub type GatewaySocket = WebSocketStream<TcpStream>;

pub const API_KEY: &str = "hk_test_key";

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket endpoint standing in for the tunnel gateway
pub struct FakeGateway {
    listener: TcpListener,
    pub url: String,
}

impl FakeGateway {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws/tunnel", listener.local_addr().unwrap());
        Self { listener, url }
    }

    /// Accept the next upgrade, returning the socket and its Authorization header
    pub async fn accept(&self) -> (GatewaySocket, Option<String>) {
        let (stream, _) = tokio::time::timeout(RECV_TIMEOUT, self.listener.accept())
            .await
            .expect("no connection from agent")
            .unwrap();

        let captured = Arc::new(Mutex::new(None));
        let header = Arc::clone(&captured);
        let ws = accept_hdr_async(
            stream,
            move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                *header.lock().unwrap() = req
                    .headers()
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                Ok(resp)
            },
        )
        .await
        .unwrap();

        let authorization = captured.lock().unwrap().clone();
        (ws, authorization)
    }

    /// Drop the next connection before the upgrade, returning when it arrived
    pub async fn refuse_next(&self) -> Instant {
        let (stream, _) = tokio::time::timeout(RECV_TIMEOUT, self.listener.accept())
            .await
            .expect("no connection from agent")
            .unwrap();
        let arrived = Instant::now();
        drop(stream);
        arrived
    }

    /// Whether the agent opens another connection within `window`
    pub async fn accepts_within(&self, window: Duration) -> bool {
        tokio::time::timeout(window, self.listener.accept())
            .await
            .is_ok()
    }

    /// Refuse the next upgrade with the given HTTP status
    pub async fn reject(&self, status: StatusCode) {
        let (stream, _) = self.listener.accept().await.unwrap();
        let _ = accept_hdr_async(
            stream,
            move |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
                let mut resp = ErrorResponse::new(Some("rejected".to_string()));
                *resp.status_mut() = status;
                Err(resp)
            },
        )
        .await;
    }

    /// Accept a connection and acknowledge its hello
    pub async fn accept_session(&self, session_id: &str) -> (GatewaySocket, Value) {
        let (mut ws, _) = self.accept().await;
        let hello = recv_json(&mut ws).await;
        send_json(&mut ws, hello_ack(session_id, 0)).await;
        (ws, hello)
    }
}

pub fn hello_ack(session_id: &str, idle_timeout_seconds: u64) -> Value {
    json!({
        "type": "hello_ack",
        "tunnel_session_id": session_id,
        "tenant_id": "tenant_1",
        "env": "dev",
        "policies": {
            "idle_timeout_seconds": idle_timeout_seconds,
            "ping_interval_seconds": 0,
            "max_inflight_enforced": 50,
            "max_body_bytes_enforced": 10485760
        }
    })
}

pub fn request(request_id: &str, method: &str, path: &str) -> Value {
    json!({
        "type": "request",
        "request_id": request_id,
        "hook_id": "hook_1",
        "method": method,
        "path": path,
        "query": "",
        "headers": { "x-provider-signature": "sig" },
        "received_at": "2026-10-19T12:00:00Z",
        "remote_ip": "203.0.113.7",
        "provider": "github"
    })
}

pub async fn send_json(ws: &mut GatewaySocket, value: Value) {
    ws.send(WsMessage::Text(value.to_string().into()))
        .await
        .unwrap();
}

pub async fn send_text(ws: &mut GatewaySocket, text: &str) {
    ws.send(WsMessage::Text(text.to_string().into()))
        .await
        .unwrap();
}

/// Next JSON text frame, skipping transport-level frames
pub async fn recv_json(ws: &mut GatewaySocket) -> Value {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for agent")
            .expect("agent closed the connection")
            .unwrap();
        match frame {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            WsMessage::Close(frame) => panic!("unexpected close: {:?}", frame),
            _ => continue,
        }
    }
}

/// Read until the agent's close frame arrives
pub async fn recv_close(ws: &mut GatewaySocket) -> Option<CloseFrame> {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for close")?;
        if let Ok(WsMessage::Close(frame)) = frame {
            return frame;
        }
    }
}

/// Agent configuration pointed at the fake gateway and a local port
pub fn agent_config(gateway: &FakeGateway, local_port: u16) -> Config {
    let mut config = Config::new(local_port);
    config.tunnel_url = gateway.url.clone();
    config.api_key = Some(API_KEY.to_string());
    config.local_host = "127.0.0.1".to_string();
    config.connect_timeout = Duration::from_secs(2);
    config.request_timeout = Duration::from_secs(2);
    config.reconnect = ReconnectConfig::new(vec![Duration::from_millis(50); 3]);
    config
}

/// Local HTTP service.
///
/// `/ping` answers "pong", `/slow` answers after 500ms, anything else echoes
/// the request target.
pub async fn spawn_local_service() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream));
        }
    });

    port
}

async fn serve(mut stream: TcpStream) {
    let mut buf = vec![0u8; 16 * 1024];
    let mut read = 0;
    let head_end = loop {
        let n = match stream.read(&mut buf[read..]).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        read += n;
        if let Some(pos) = buf[..read].windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if read == buf.len() {
            return;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let body = match target.as_str() {
        "/ping" => "pong".to_string(),
        "/slow" => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "slow".to_string()
        }
        other => other.to_string(),
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nX-Served-By: local\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Unbound local port
pub fn unused_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
