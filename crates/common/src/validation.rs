//! Structural validation for data exchanged with the gateway
//!
//! Gateway-assigned identifiers are opaque: any non-empty string is accepted
//! and echoed back unchanged. Paths are cleaned before they reach the local
//! service, and outbound capability values are trimmed to sane bounds before
//! they are advertised.

use once_cell::sync::Lazy;
use std::borrow::Cow;
use regex::Regex;
use thiserror::Error;

use crate::constants::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_INFLIGHT, MAX_BODY_BYTES_LIMIT, MAX_INFLIGHT_LIMIT,
};
use crate::protocol::Capabilities;

/// Control characters, never forwarded or logged as part of a path
static CONTROL_CHARS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Cc}").unwrap());

/// Maximum length for HTTP paths
pub const MAX_PATH_LENGTH: usize = 2048;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Request ID is empty")]
    EmptyRequestId,

    #[error("Session ID is empty")]
    EmptySessionId,

    #[error("Path too long: {0} bytes (max: {1})")]
    PathTooLong(usize, usize),
}

/// Validate a request ID
///
/// Request IDs are opaque gateway identifiers. Only an empty id is rejected,
/// since a response could not be correlated with it.
///
/// # Examples
///
/// ```
/// use hooktunnel_common::validation::validate_request_id;
///
/// assert!(validate_request_id("r1").is_ok());
/// assert!(validate_request_id("evt/123 AbC+/==").is_ok());
/// assert!(validate_request_id("").is_err());
/// ```
pub fn validate_request_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptyRequestId);
    }
    Ok(())
}

/// Validate a tunnel session ID, opaque like request IDs
pub fn validate_session_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    Ok(())
}

/// Remove control characters so untrusted text is safe to log or forward
///
/// ```
/// use hooktunnel_common::validation::strip_control_chars;
///
/// assert_eq!(strip_control_chars("/hooks\x1b[2J\n"), "/hooks[2J");
/// ```
pub fn strip_control_chars(text: &str) -> Cow<'_, str> {
    CONTROL_CHARS_REGEX.replace_all(text, "")
}

/// Validate and sanitize HTTP path
///
/// - Removes control characters
/// - Enforces length limits
/// - Ensures path starts with /
pub fn validate_path(path: &str) -> Result<String, ValidationError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(ValidationError::PathTooLong(path.len(), MAX_PATH_LENGTH));
    }

    let sanitized = strip_control_chars(path);

    if sanitized.is_empty() {
        Ok("/".to_string())
    } else if sanitized.starts_with('/') {
        Ok(sanitized.into_owned())
    } else {
        Ok(format!("/{}", sanitized))
    }
}

/// Trim capability values to what can be meaningfully advertised
///
/// Zero falls back to the default, anything above the hard ceiling is capped.
pub fn sanitize_capabilities(capabilities: Capabilities) -> Capabilities {
    let max_inflight = match capabilities.max_inflight {
        0 => DEFAULT_MAX_INFLIGHT,
        n => n.min(MAX_INFLIGHT_LIMIT),
    };
    let max_body_bytes = match capabilities.max_body_bytes {
        0 => DEFAULT_MAX_BODY_BYTES,
        n => n.min(MAX_BODY_BYTES_LIMIT),
    };

    Capabilities {
        max_inflight,
        max_body_bytes,
        supports_gzip: capabilities.supports_gzip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_request_ids_are_accepted() {
        for id in [
            "r1",
            "req_550e8400-e29b-41d4-a716-446655440000",
            "evt/123",
            "_r1",
            "req 1",
            "AbC+/==",
            &"a".repeat(4096),
        ] {
            assert!(validate_request_id(id).is_ok(), "rejected {:?}", id);
        }
    }

    #[test]
    fn test_empty_ids_are_rejected() {
        assert!(matches!(
            validate_request_id(""),
            Err(ValidationError::EmptyRequestId)
        ));
        assert!(validate_session_id("c2Vzcw+/abc==").is_ok());
        assert!(matches!(
            validate_session_id(""),
            Err(ValidationError::EmptySessionId)
        ));
    }

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("/plain/path"), "/plain/path");
        assert!(matches!(strip_control_chars("/plain"), Cow::Borrowed(_)));
        assert_eq!(strip_control_chars("GE\u{7f}T\r\n"), "GET");
    }

    #[test]
    fn test_validate_path() {
        assert_eq!(validate_path("/foo/bar").unwrap(), "/foo/bar");
        assert_eq!(validate_path("foo/bar").unwrap(), "/foo/bar");
        assert_eq!(validate_path("").unwrap(), "/");

        // Control characters removed
        let sanitized = validate_path("/foo\x00/bar\n/baz\t").unwrap();
        assert_eq!(sanitized, "/foo/bar/baz");

        // Too long
        let long_path = "/".to_string() + &"a".repeat(3000);
        assert!(matches!(
            validate_path(&long_path),
            Err(ValidationError::PathTooLong(3001, MAX_PATH_LENGTH))
        ));
    }

    #[test]
    fn test_sanitize_capabilities_keeps_valid_values() {
        let caps = Capabilities {
            max_inflight: 8,
            max_body_bytes: 4096,
            supports_gzip: true,
        };
        assert_eq!(sanitize_capabilities(caps), caps);
    }

    #[test]
    fn test_sanitize_capabilities_trims_invalid_values() {
        let zeroed = sanitize_capabilities(Capabilities {
            max_inflight: 0,
            max_body_bytes: 0,
            supports_gzip: false,
        });
        assert_eq!(zeroed, Capabilities::default());

        let oversized = sanitize_capabilities(Capabilities {
            max_inflight: u32::MAX,
            max_body_bytes: u64::MAX,
            supports_gzip: false,
        });
        assert_eq!(oversized.max_inflight, MAX_INFLIGHT_LIMIT);
        assert_eq!(oversized.max_body_bytes, MAX_BODY_BYTES_LIMIT);
    }
}
