use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::utils::decode_body;
use crate::validation::{ValidationError, validate_path};

/// An inbound webhook call relayed by the gateway to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelRequest {
    /// Unique identifier to correlate request and response
    pub request_id: String,

    /// Gateway hook that received the call
    #[serde(default)]
    pub hook_id: String,

    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    pub method: String,

    /// Request path, without query string
    pub path: String,

    /// Raw query string without the leading `?`, empty when absent
    #[serde(default)]
    pub query: String,

    /// HTTP headers as sent by the webhook provider
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request body encoded in Base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_base64: Option<String>,

    #[serde(default)]
    pub received_at: String,

    #[serde(default)]
    pub remote_ip: String,

    /// Webhook provider detected by the gateway (stripe, github, ...)
    #[serde(default)]
    pub provider: String,
}

impl TunnelRequest {
    /// Create a new request without headers or body
    pub fn new(request_id: String, method: String, path: String) -> Self {
        Self {
            request_id,
            hook_id: String::new(),
            method,
            path,
            query: String::new(),
            headers: HashMap::new(),
            body_base64: None,
            received_at: String::new(),
            remote_ip: String::new(),
            provider: String::new(),
        }
    }

    /// Check if the request has a body
    pub fn has_body(&self) -> bool {
        self.body_base64.as_deref().is_some_and(|b| !b.is_empty())
    }

    /// Decoded body bytes, `None` when the request carries no body
    pub fn body(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        match self.body_base64.as_deref() {
            Some(encoded) if self.has_body() => decode_body(encoded).map(Some),
            _ => Ok(None),
        }
    }

    /// Header lookup, ignoring ASCII case of the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sanitized path with the query string appended when present
    pub fn path_and_query(&self) -> Result<String, ValidationError> {
        let path = validate_path(&self.path)?;
        let query = self.query.trim_start_matches('?');
        if query.is_empty() {
            Ok(path)
        } else {
            Ok(format!("{}?{}", path, query))
        }
    }
}
