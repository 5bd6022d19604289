pub mod constants;
pub mod envelope;
pub mod nonce;

// Re-export primary types for convenience.
pub use constants::RequestKind;
pub use envelope::{ClientPacket, FeedMessage, ProtocolError, ServerPacket, TopicRequest};
pub use nonce::generate_nonce;
