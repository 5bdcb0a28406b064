/// Errors that can occur while encoding or decoding envelopes and packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer ended before a declared header or field was complete.
    #[error("truncated input (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// The envelope declares more fields than this protocol version knows.
    #[error("envelope declares {found} fields, at most {expected} supported")]
    TooManyFields { expected: u8, found: u8 },

    /// A field length prefix is negative (and not the null marker).
    #[error("invalid field length {0}")]
    InvalidLength(i32),

    /// Bytes remain after the last declared field.
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),

    /// A command id does not have the byte length the configured width requires.
    #[error("command is {found} bytes, width requires {expected}")]
    CommandWidthMismatch { expected: usize, found: usize },

    /// An unsupported hash width was supplied by configuration.
    #[error("unsupported rpc hash width: {0}")]
    InvalidHashWidth(String),

    /// The packet header contains an invalid magic number.
    #[error("invalid packet magic (expected 0x4852 \"HR\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Queuing a packet would exceed the outbound bound for this stream.
    #[error("outbound queue full ({queued} bytes queued, max {max})")]
    Backpressure { queued: usize, max: usize },

    /// Queued bytes made no progress within the write timeout.
    #[error("write stalled for {waited_ms} ms with {queued} bytes queued")]
    WriteStalled { queued: usize, waited_ms: u128 },

    /// An I/O error occurred while reading or writing packets.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

impl FrameError {
    /// True when the error means "no data yet" on a non-blocking or timed read.
    pub fn is_would_block(&self) -> bool {
        matches!(
            self,
            Self::Io(err) if matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            )
        )
    }
}
