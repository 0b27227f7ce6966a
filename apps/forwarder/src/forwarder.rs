//! Replays tunneled requests against the operator's local service

use hooktunnel_common::{
    Result, TunnelError, TunnelRequest, TunnelResponse, headers_to_map, is_hop_by_hop,
    map_to_headers, validation::strip_control_chars,
};
use reqwest::{Client, Method, header::CONTENT_LENGTH};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::activity::{ActivityLog, ActivityLogEntry};

/// Forwards requests to the local service and records every outcome
#[derive(Debug, Clone)]
pub struct LocalForwarder {
    client: Client,
    local_address: String,
    activity: ActivityLog,
}

impl LocalForwarder {
    pub fn new(local_address: String, timeout: Duration, activity: ActivityLog) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TunnelError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            local_address,
            activity,
        })
    }

    /// Full URL of the local target for a request
    pub fn target_url(&self, request: &TunnelRequest) -> Result<String> {
        let path_and_query = request
            .path_and_query()
            .map_err(|e| TunnelError::InvalidMessage(e.to_string()))?;
        Ok(format!(
            "{}{}",
            self.local_address.trim_end_matches('/'),
            path_and_query
        ))
    }

    /// Forward a request, always producing exactly one response.
    ///
    /// Failures to reach the local service become a 502 response carrying the
    /// error description.
    pub async fn forward(&self, request: TunnelRequest) -> TunnelResponse {
        let start_time = Instant::now();
        let method = strip_control_chars(&request.method);
        let path = strip_control_chars(&request.path);
        debug!("Forwarding: {} {} ({:?})", method, path, request.request_id);

        let response = match self.execute(&request).await {
            Ok(response) => response,
            Err(e) => TunnelResponse::bad_gateway(request.request_id.clone(), e.to_string()),
        };

        let elapsed = start_time.elapsed();
        if response.is_error() {
            warn!(
                "{} {} {} ({}ms): {}",
                method,
                path,
                response.status,
                elapsed.as_millis(),
                response.error.as_deref().unwrap_or_default()
            );
        } else {
            info!(
                "{} {} {} ({}ms)",
                method,
                path,
                response.status,
                elapsed.as_millis()
            );
        }

        self.activity.record(ActivityLogEntry::new(
            &request,
            response.status,
            elapsed,
            response.is_error(),
        ));

        response
    }

    async fn execute(&self, request: &TunnelRequest) -> Result<TunnelResponse> {
        let url = self.target_url(request)?;

        let method = Method::from_bytes(request.method.trim().as_bytes()).map_err(|_| {
            TunnelError::InvalidMessage(format!("Unsupported HTTP method: {}", request.method))
        })?;

        let mut headers = map_to_headers(&request.headers);
        retain_end_to_end(&mut headers);
        // The body is re-sent as-is, its length is recomputed by the client
        headers.remove(CONTENT_LENGTH);

        let mut req_builder = self.client.request(method, &url).headers(headers);

        let body = request
            .body()
            .map_err(|e| TunnelError::InvalidMessage(format!("Failed to decode body: {}", e)))?;
        if let Some(body_bytes) = body {
            req_builder = req_builder.body(body_bytes);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| TunnelError::LocalServiceUnavailable(error_chain(&e)))?;

        let status = response.status().as_u16();
        let mut response_headers = response.headers().clone();
        retain_end_to_end(&mut response_headers);

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| TunnelError::LocalServiceUnavailable(error_chain(&e)))?;

        let mut tunnel_response =
            TunnelResponse::new(request.request_id.clone(), status).with_body(&body_bytes);
        tunnel_response.headers = headers_to_map(&response_headers);

        Ok(tunnel_response)
    }
}

/// Drop connection-management headers from a header map
fn retain_end_to_end(headers: &mut reqwest::header::HeaderMap) {
    let hop_by_hop: Vec<_> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name.as_str()))
        .cloned()
        .collect();
    for name in hop_by_hop {
        headers.remove(name);
    }
}

/// Render an error with its sources, e.g. "error sending request: connection refused"
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
