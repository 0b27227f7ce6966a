mod hello;
mod message;
mod request;
mod response;

pub use hello::{Capabilities, Environment, Hello, HelloAck, SessionPolicies};
pub use message::Message;
pub use request::TunnelRequest;
pub use response::TunnelResponse;
