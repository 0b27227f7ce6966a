mod session;

pub use session::TunnelSession;
