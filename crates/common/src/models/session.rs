use serde::{Deserialize, Serialize};

use crate::protocol::{Environment, HelloAck, SessionPolicies};

/// State of one established tunnel session.
///
/// A session lives exactly as long as the physical connection it was
/// negotiated on; a reconnect always produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSession {
    /// Gateway-assigned, opaque session identifier
    pub session_id: String,

    pub tenant_id: String,

    pub env: Environment,

    /// Limits the gateway enforces for this session
    pub policies: SessionPolicies,
}

impl TunnelSession {
    /// Session negotiated by `ack`, bound to `requested` unless the gateway
    /// named a different environment
    pub fn from_ack(ack: HelloAck, requested: Environment) -> Self {
        Self {
            session_id: ack.tunnel_session_id,
            tenant_id: ack.tenant_id,
            env: ack.env.unwrap_or(requested),
            policies: ack.policies,
        }
    }

    /// Abbreviated session id for display
    pub fn short_id(&self) -> &str {
        match self.session_id.char_indices().nth(8) {
            Some((idx, _)) => &self.session_id[..idx],
            None => &self.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(session_id: &str) -> HelloAck {
        HelloAck {
            tunnel_session_id: session_id.to_string(),
            tenant_id: "tenant_1".to_string(),
            env: Some(Environment::Prod),
            policies: SessionPolicies {
                idle_timeout_seconds: 300,
                ping_interval_seconds: 30,
                max_inflight_enforced: 10,
                max_body_bytes_enforced: 2048,
            },
        }
    }

    #[test]
    fn test_session_from_hello_ack() {
        let session = TunnelSession::from_ack(ack("sess_1"), Environment::Dev);

        assert_eq!(session.session_id, "sess_1");
        assert_eq!(session.tenant_id, "tenant_1");
        assert_eq!(session.env, Environment::Prod);
        assert_eq!(session.policies.idle_timeout_seconds, 300);
        assert_eq!(session.policies.max_inflight_enforced, 10);
    }

    #[test]
    fn test_short_id() {
        let session = |id| TunnelSession::from_ack(ack(id), Environment::Dev);
        assert_eq!(session("sess_0123456789").short_id(), "sess_012");
        assert_eq!(session("sess_1").short_id(), "sess_1");
    }

    #[test]
    fn test_missing_env_falls_back_to_requested() {
        let mut minimal = ack("sess_1");
        minimal.env = None;
        minimal.tenant_id = String::new();

        let session = TunnelSession::from_ack(minimal, Environment::Staging);
        assert_eq!(session.env, Environment::Staging);
        assert_eq!(session.tenant_id, "");
    }
}
