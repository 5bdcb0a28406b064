use hashrpc_hash::MessageId;

/// Errors raised by local channel operations.
///
/// Incoming traffic never produces one of these: undecodable envelopes, unknown
/// commands and bad message bodies are dropped and logged instead.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Envelope encoding failed.
    #[error("frame error: {0}")]
    Frame(#[from] hashrpc_frame::FrameError),

    /// JSON body serialization/deserialization error.
    #[error("json body error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode body serialization/deserialization error.
    #[error("bincode body error: {0}")]
    Bincode(#[from] bincode::Error),

    /// A handler is already registered and the channel rejects duplicates.
    #[error("handler for {name} ({id}) is already registered")]
    DuplicateHandler { name: String, id: MessageId },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
