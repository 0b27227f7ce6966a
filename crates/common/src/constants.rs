/// Default tunnel gateway endpoint
pub const DEFAULT_TUNNEL_URL: &str = "wss://tunnel.hooktunnel.com/ws/tunnel";

/// Default host of the operator's local service
pub const DEFAULT_LOCAL_HOST: &str = "localhost";

/// Time allowed for the WebSocket upgrade plus the hello/hello_ack exchange
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Timeout for a single call against the local service
pub const REQUEST_TIMEOUT_SECS: u64 = 25;

/// Delays between successive reconnect attempts, in order
pub const RECONNECT_SCHEDULE_SECS: [u64; 5] = [1, 2, 5, 10, 30];

/// Advertised in-flight request capacity
pub const DEFAULT_MAX_INFLIGHT: u32 = 50;

/// Upper bound accepted for the advertised in-flight capacity
pub const MAX_INFLIGHT_LIMIT: u32 = 1000;

/// Advertised maximum body size (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Upper bound accepted for the advertised body size (100 MiB)
pub const MAX_BODY_BYTES_LIMIT: u64 = 100 * 1024 * 1024;

/// Error code the gateway uses for rejected credentials
pub const AUTH_FAILED_CODE: &str = "AUTH_FAILED";

/// Close reason sent on an explicit disconnect
pub const DISCONNECT_REASON: &str = "Client disconnecting";

/// Status reported when the local service cannot be reached
pub const BAD_GATEWAY_STATUS: u16 = 502;
