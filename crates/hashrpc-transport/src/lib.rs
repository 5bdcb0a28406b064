//! Local stream transport for hashrpc.
//!
//! Unix domain sockets carry framed packets between endpoints on one host. This is
//! the lowest layer of the workspace: it moves bytes and knows nothing about
//! envelopes or message identifiers.

pub mod error;

#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use stream::{PeerCredentials, RpcStream};
#[cfg(unix)]
pub use uds::UnixDomainSocket;
