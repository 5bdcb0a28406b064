use hashrpc_channel::PeerId;

/// Errors that can occur in endpoint and transport operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Socket-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hashrpc_transport::TransportError),

    /// Packet or envelope framing error.
    #[error("frame error: {0}")]
    Frame(#[from] hashrpc_frame::FrameError),

    /// Message encoding or handler registration error.
    #[error("channel error: {0}")]
    Channel(#[from] hashrpc_channel::ChannelError),

    /// The peer is not (or no longer) connected.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The client endpoint has no open connection.
    #[error("not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, PeerError>;
