use std::time::Duration;

use bytes::Bytes;
use hashrpc_channel::PeerId;

use crate::error::Result;

/// Peer id a client-side transport reports for its server.
pub const SERVER_PEER: PeerId = 0;

/// Something that happened on a transport since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    /// One complete packet from `peer`.
    Received { peer: PeerId, data: Bytes },
}

/// A packet-preserving link to one or more peers.
///
/// Implementations own connection lifecycle; endpoints only see the resulting
/// events. Client-side transports use [`SERVER_PEER`] for the remote end.
pub trait Transport {
    /// Wait up to `timeout` for activity and return every event gathered.
    ///
    /// An empty vector means nothing happened before the timeout.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>>;

    /// Queue one packet for `peer`.
    fn send(&mut self, peer: PeerId, packet: &[u8]) -> Result<()>;

    /// Close the link to `peer`. A `Disconnected` event follows on the next poll.
    fn disconnect(&mut self, peer: PeerId) -> Result<()>;
}
