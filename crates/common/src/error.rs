use thiserror::Error;

/// Error types for the tunnel agent
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Timeout waiting for handshake acknowledgment")]
    HandshakeTimeout,

    #[error("Local service unavailable: {0}")]
    LocalServiceUnavailable(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Reconnection failed after {0} attempts")]
    RetriesExhausted(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl TunnelError {
    /// Transport-level failures may be retried by the reconnect loop.
    /// Authentication and configuration problems never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TunnelError::ConnectionError(_)
                | TunnelError::WebSocketError(_)
                | TunnelError::HandshakeTimeout
        )
    }

    /// Actionable hint shown to the operator for terminal failures
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            TunnelError::AuthRequired => {
                Some("Set HOOKTUNNEL_API_KEY or pass --api-key with your API key")
            }
            TunnelError::AuthFailed(_) => {
                Some("Check your API key and try again with a fresh key from the dashboard")
            }
            TunnelError::ConnectionError(_)
            | TunnelError::WebSocketError(_)
            | TunnelError::HandshakeTimeout => {
                Some("Check your internet connection and the tunnel endpoint, then try again")
            }
            TunnelError::RetriesExhausted(_) => {
                Some("The gateway stayed unreachable; run `hooktunnel connect` again once it is back")
            }
            TunnelError::LocalServiceUnavailable(_) => {
                Some("Make sure your local server is running")
            }
            TunnelError::InvalidConfig(_) => Some("Run `hooktunnel --help` for valid options"),
            _ => None,
        }
    }
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
