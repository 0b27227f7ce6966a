use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_INFLIGHT};

/// Gateway environment a tunnel is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Dev, Environment::Staging, Environment::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("invalid environment '{s}' (valid environments: dev, staging, prod)")
            })
    }
}

/// Capacity hints the agent advertises to the gateway.
///
/// These are advisory: the gateway enforces its own limits and reports them
/// back in [`SessionPolicies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub max_inflight: u32,
    pub max_body_bytes: u64,
    pub supports_gzip: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            supports_gzip: false,
        }
    }
}

/// First message sent by the agent once the transport is open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    /// Stable for the lifetime of the agent process, shared by all reconnects
    pub client_instance_id: String,
    pub env: Environment,
    /// Base URL of the local service requests are forwarded to
    pub local_base_url: String,
    pub capabilities: Capabilities,
    pub client_version: String,
}

/// Limits the gateway applies to this session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionPolicies {
    #[serde(default)]
    pub idle_timeout_seconds: u64,
    #[serde(default)]
    pub ping_interval_seconds: u64,
    #[serde(default)]
    pub max_inflight_enforced: u32,
    #[serde(default)]
    pub max_body_bytes_enforced: u64,
}

/// Gateway acknowledgment of a hello, opening a tunnel session.
///
/// Only the session id is required. `env` is `None` when the gateway omits it
/// or names an environment this agent does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloAck {
    pub tunnel_session_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(
        default,
        deserialize_with = "lenient_environment",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<Environment>,
    #[serde(default)]
    pub policies: SessionPolicies,
}

fn lenient_environment<'de, D>(deserializer: D) -> Result<Option<Environment>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|env| env.parse().ok()))
}
