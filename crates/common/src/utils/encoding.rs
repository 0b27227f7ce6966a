use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Encode a request/response body for transport inside a JSON text frame
pub fn encode_body(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Decode a `body_base64` field back into raw bytes
pub fn decode_body(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
