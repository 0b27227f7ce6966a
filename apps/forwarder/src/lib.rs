//! HookTunnel agent
//!
//! Holds one persistent WebSocket to the HookTunnel gateway, replays every
//! tunneled webhook against a service on the local machine and returns the
//! local response over the same connection.

pub mod activity;
pub mod client;
pub mod config;
pub mod connection;
pub mod forwarder;

pub use activity::{ActivityLog, ActivityLogEntry};
pub use client::TunnelClient;
pub use config::{Config, ReconnectConfig};
pub use connection::{ConnectionState, TunnelExit};
pub use forwarder::LocalForwarder;
