//! Typed message dispatch for hashrpc.
//!
//! A [`MessageChannel`] decodes incoming envelopes, picks the command id at the
//! configured [`RpcHashWidth`](hashrpc_frame::RpcHashWidth), and calls the handler
//! registered for that message type. Message bodies are produced and consumed by a
//! [`BodyCodec`]; the channel itself never looks inside them.

pub mod body;
pub mod channel;
pub mod error;
pub mod handler;
pub mod registry;

pub use body::{BincodeBody, BodyCodec, JsonBody};
pub use channel::{
    ChannelConfig, ClientChannel, DuplicatePolicy, HandlerGroup, MessageChannel, ServerChannel,
};
pub use error::{ChannelError, Result};
pub use handler::{Inbound, InboundHandler, Outbound, OutboundHandler, PeerId, Role};
pub use registry::{Dispatch, DispatchRegistry};
