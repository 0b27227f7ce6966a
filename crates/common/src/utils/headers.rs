use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Connection-management headers that only make sense for a single hop and
/// must not be replayed against a different endpoint
pub const HOP_BY_HOP_HEADERS: [&str; 11] = [
    "host",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Check whether a header name is hop-by-hop, ignoring case
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Convert HTTP headers to the wire format
///
/// Repeated headers are folded into one comma separated value.
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();

    for (name, value) in headers.iter() {
        let val = String::from_utf8_lossy(value.as_bytes());

        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&val);
            })
            .or_insert_with(|| val.into_owned());
    }

    map
}

/// Convert wire headers into an HTTP HeaderMap
///
/// Names are case-insensitive; entries that are not valid HTTP are skipped.
pub fn map_to_headers(map: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(map.len());

    for (name, value) in map.iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(header_name, header_value);
        }
    }

    headers
}
