mod encoding;
mod headers;
mod id;

pub use encoding::{decode_body, encode_body};
pub use headers::{HOP_BY_HOP_HEADERS, headers_to_map, is_hop_by_hop, map_to_headers};
pub use id::generate_client_instance_id;
