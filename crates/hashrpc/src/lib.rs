//! Typed message dispatch keyed by type-name hashes.
//!
//! Every message type carries a stable name. hashrpc hashes that name into a
//! 32-bit and a 64-bit id, frames outgoing messages as `{command id, body}`
//! envelopes, and routes incoming envelopes to the handler registered for the id.
//!
//! # Crate Structure
//!
//! - [`hash`]: XXH32/XXH64 and message ids
//! - [`transport`]: Unix domain socket streams
//! - [`frame`]: envelope codec, hash width, stream packet framing
//! - [`channel`]: handler registry and message channels
//! - [`peer`]: server/client endpoints and transports (behind `peer` feature)
//!
//! ```
//! use hashrpc::channel::{ClientChannel, JsonBody};
//! use hashrpc::hash::Message;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     seq: u32,
//! }
//!
//! impl Message for Ping {
//!     const NAME: &'static str = "Game.PingMessage";
//! }
//!
//! let mut channel = ClientChannel::<JsonBody>::new();
//! channel.register_handler::<Ping, _>(|ping| assert_eq!(ping.seq, 1)).unwrap();
//!
//! let packet = channel.encode_message(&Ping { seq: 1 }).unwrap();
//! assert!(channel.invoke_handler(&packet).is_handled());
//! ```

/// Re-export hashing types.
pub mod hash {
    pub use hashrpc_hash::*;
}

/// Re-export transport types.
pub mod transport {
    pub use hashrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hashrpc_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use hashrpc_channel::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use hashrpc_peer::*;
}

pub use hashrpc_channel::{ClientChannel, Dispatch, MessageChannel, ServerChannel};
pub use hashrpc_frame::RpcHashWidth;
pub use hashrpc_hash::{Message, MessageId};
