use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::BAD_GATEWAY_STATUS;
use crate::utils::encode_body;

/// The agent's reply to a [`TunnelRequest`](super::TunnelRequest)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelResponse {
    /// Must match the request_id from the corresponding request
    pub request_id: String,

    /// HTTP status code (200, 404, 502, etc.)
    pub status: u16,

    /// Response headers from the local service
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body encoded in Base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_base64: Option<String>,

    /// Set when the local service could not be reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TunnelResponse {
    /// Create a new response without headers or body
    pub fn new(request_id: String, status: u16) -> Self {
        Self {
            request_id,
            status,
            headers: HashMap::new(),
            body_base64: None,
            error: None,
        }
    }

    /// Response reporting that the local service could not be reached
    pub fn bad_gateway(request_id: String, error: impl Into<String>) -> Self {
        let mut response = Self::new(request_id, BAD_GATEWAY_STATUS);
        response
            .headers
            .insert("content-type".to_string(), "text/plain".to_string());
        response.error = Some(error.into());
        response
    }

    /// Attach the body, Base64 encoded
    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body_base64 = Some(encode_body(body));
        self
    }

    /// Check if the local forward failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
