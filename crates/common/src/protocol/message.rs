use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Hello, HelloAck, TunnelRequest, TunnelResponse};
use crate::error::{Result, TunnelError};
use crate::validation::{validate_request_id, validate_session_id};

/// All WebSocket messages are wrapped in this typed envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Handshake
    Hello(Hello),
    HelloAck(HelloAck),

    /// Data plane messages
    Request(TunnelRequest),
    Response(TunnelResponse),

    /// Heartbeat. The timestamp is opaque to the agent and echoed as received.
    Ping { timestamp: Value },
    Pong { timestamp: Value },

    /// Error reported by the gateway
    Error { code: String, message: String },
}

impl Message {
    /// Parse a text frame and check the fields the agent relies on
    pub fn decode(text: &str) -> Result<Self> {
        let message: Message = serde_json::from_str(text)
            .map_err(|e| TunnelError::InvalidMessage(format!("Failed to parse message: {}", e)))?;
        message.validate()?;
        Ok(message)
    }

    /// Serialize into the JSON text carried by a WebSocket frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::HelloAck(_) => "hello_ack",
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Error { .. } => "error",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Message::HelloAck(ack) => validate_session_id(&ack.tunnel_session_id)
                .map_err(|e| TunnelError::InvalidMessage(e.to_string())),
            Message::Request(request) => {
                validate_request_id(&request.request_id)
                    .map_err(|e| TunnelError::InvalidMessage(e.to_string()))?;
                if request.method.trim().is_empty() {
                    return Err(TunnelError::InvalidMessage(format!(
                        "request {} has an empty method",
                        request.request_id
                    )));
                }
                Ok(())
            }
            Message::Response(response) => validate_request_id(&response.request_id)
                .map_err(|e| TunnelError::InvalidMessage(e.to_string())),
            _ => Ok(()),
        }
    }
}
