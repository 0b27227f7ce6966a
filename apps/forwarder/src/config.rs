use hooktunnel_common::{
    Capabilities, Environment, Result, TunnelError,
    constants::{
        CONNECT_TIMEOUT_SECS, DEFAULT_LOCAL_HOST, DEFAULT_TUNNEL_URL, RECONNECT_SCHEDULE_SECS,
        REQUEST_TIMEOUT_SECS,
    },
};
use std::time::Duration;
use url::Url;

/// Configuration for the tunnel agent
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the tunnel gateway
    pub tunnel_url: String,

    /// Bearer credential presented on the WebSocket upgrade
    pub api_key: Option<String>,

    /// Gateway environment to bind the tunnel to
    pub env: Environment,

    /// Host of the local service
    pub local_host: String,

    /// Port of the local service
    pub local_port: u16,

    /// Capacity hints sent in the hello message
    pub capabilities: Capabilities,

    /// Budget for the transport upgrade plus handshake acknowledgment
    pub connect_timeout: Duration,

    /// Request timeout when calling local service
    pub request_timeout: Duration,

    /// Reconnection strategy
    pub reconnect: ReconnectConfig,

    /// Version reported in the hello message
    pub client_version: String,
}

impl Config {
    /// Configuration with defaults for everything but the local port
    pub fn new(local_port: u16) -> Self {
        Self {
            tunnel_url: DEFAULT_TUNNEL_URL.to_string(),
            api_key: None,
            env: Environment::default(),
            local_host: DEFAULT_LOCAL_HOST.to_string(),
            local_port,
            capabilities: Capabilities::default(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            reconnect: ReconnectConfig::default(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Local service address, e.g. "http://localhost:3000"
    pub fn local_base_url(&self) -> String {
        format!("http://{}:{}", self.local_host, self.local_port)
    }

    /// Reject configurations the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.tunnel_url).map_err(|e| {
            TunnelError::InvalidConfig(format!("invalid tunnel URL '{}': {}", self.tunnel_url, e))
        })?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(TunnelError::InvalidConfig(format!(
                "tunnel URL must use ws:// or wss://, got '{}'",
                endpoint.scheme()
            )));
        }

        if self.local_port == 0 {
            return Err(TunnelError::InvalidConfig(
                "port must be a number between 1 and 65535".to_string(),
            ));
        }

        Url::parse(&self.local_base_url()).map_err(|e| {
            TunnelError::InvalidConfig(format!("invalid local host '{}': {}", self.local_host, e))
        })?;

        if self.reconnect.schedule.is_empty() {
            return Err(TunnelError::InvalidConfig(
                "reconnect schedule must contain at least one delay".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reconnection configuration: a fixed, ordered list of delays.
///
/// Attempt `n` (zero based) waits `schedule[n]`; once every entry has been
/// used the agent gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub schedule: Vec<Duration>,
}

impl ReconnectConfig {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self { schedule }
    }

    /// Delay before the given attempt, `None` once the schedule is exhausted
    pub fn delay_for(&self, attempt: usize) -> Option<Duration> {
        self.schedule.get(attempt).copied()
    }

    pub fn max_attempts(&self) -> usize {
        self.schedule.len()
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(
            RECONNECT_SCHEDULE_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new(3000);

        assert_eq!(config.local_base_url(), "http://localhost:3000");
        assert_eq!(config.tunnel_url, "wss://tunnel.hooktunnel.com/ws/tunnel");
        assert_eq!(config.env, Environment::Dev);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(25));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_reconnect_schedule() {
        let reconnect = ReconnectConfig::default();

        assert_eq!(reconnect.max_attempts(), 5);
        let delays: Vec<u64> = (0..5)
            .map(|n| reconnect.delay_for(n).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 5, 10, 30]);
        assert_eq!(reconnect.delay_for(5), None);
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = Config::new(3000);
        config.tunnel_url = "https://tunnel.hooktunnel.com".to_string();
        assert!(matches!(config.validate(), Err(TunnelError::InvalidConfig(_))));

        config.tunnel_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(TunnelError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_port_zero_and_empty_schedule() {
        let config = Config::new(0);
        assert!(config.validate().is_err());

        let mut config = Config::new(3000);
        config.reconnect = ReconnectConfig::new(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_local_host() {
        let mut config = Config::new(3000);
        config.local_host = "bad host".to_string();
        assert!(config.validate().is_err());
    }
}
