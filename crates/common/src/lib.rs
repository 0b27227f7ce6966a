//! Shared protocol types and utilities for the hooktunnel agent
//!
//! This crate holds the wire messages exchanged with the tunnel gateway, the
//! session model negotiated during the handshake, and the helpers used to
//! move HTTP requests and responses through a JSON text channel.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use models::TunnelSession;
pub use protocol::{
    Capabilities, Environment, Hello, HelloAck, Message, SessionPolicies, TunnelRequest,
    TunnelResponse,
};
pub use utils::{
    decode_body, encode_body, generate_client_instance_id, headers_to_map, is_hop_by_hop,
    map_to_headers,
};
