//! The two-field command envelope.
//!
//! Wire format:
//! ```text
//! ┌──────────────┬──────────────────┬─────────────┬──────────────────┬─────────────┐
//! │ Fields (1B)  │ Command len      │ Command     │ Payload len      │ Payload     │
//! │ 0x02         │ (i32 LE)         │ (len bytes) │ (i32 LE)         │ (len bytes) │
//! └──────────────┴──────────────────┴─────────────┴──────────────────┴─────────────┘
//! ```
//!
//! A field count of `0xFF` marks a null envelope and a length of `-1` marks a null
//! field; both decode as empty. Envelopes from older peers may declare fewer
//! fields, and the missing ones decode as empty. Declaring more fields than this
//! version knows is rejected.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hashrpc_hash::MessageId;

use crate::error::{FrameError, Result};
use crate::width::{CommandId, RpcHashWidth};

/// Number of fields in the current envelope layout.
pub const ENVELOPE_FIELDS: u8 = 2;

/// Field-count byte that marks a null envelope.
pub const NULL_ENVELOPE: u8 = 0xFF;

/// Length prefix that marks a null field.
const NULL_FIELD: i32 = -1;

const FIELD_COUNT_SIZE: usize = 1;
const LENGTH_PREFIX_SIZE: usize = 4;

/// A decoded envelope: routing command plus opaque message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Command identifier bytes, little-endian at the link's hash width.
    pub command: Bytes,
    /// Serialized message body. Never inspected by framing.
    pub payload: Bytes,
}

impl Envelope {
    /// Create an envelope from raw command and payload bytes.
    pub fn new(command: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
            payload: payload.into(),
        }
    }

    /// Create an envelope addressed to message `id` at `width`.
    pub fn for_message(width: RpcHashWidth, id: MessageId, payload: impl Into<Bytes>) -> Self {
        Self::new(width.encode_command(id), payload)
    }

    /// Parse the command bytes at `width`.
    pub fn command_id(&self, width: RpcHashWidth) -> Result<CommandId> {
        width.parse_command(&self.command)
    }

    /// Encoded size of this envelope in bytes.
    pub fn wire_size(&self) -> usize {
        FIELD_COUNT_SIZE + 2 * LENGTH_PREFIX_SIZE + self.command.len() + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_envelope(&self.command, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Append an encoded envelope to `dst`.
///
/// Fails only when a field is too long for its `i32` length prefix.
pub fn encode_envelope(command: &[u8], payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let command_len = field_len(command)?;
    let payload_len = field_len(payload)?;

    dst.reserve(FIELD_COUNT_SIZE + 2 * LENGTH_PREFIX_SIZE + command.len() + payload.len());
    dst.put_u8(ENVELOPE_FIELDS);
    dst.put_i32_le(command_len);
    dst.put_slice(command);
    dst.put_i32_le(payload_len);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one envelope occupying all of `src`.
pub fn decode_envelope(src: &[u8]) -> Result<Envelope> {
    let mut buf = src;
    if !buf.has_remaining() {
        return Err(FrameError::Truncated {
            needed: FIELD_COUNT_SIZE,
            available: 0,
        });
    }

    let declared = buf.get_u8();
    if declared == NULL_ENVELOPE {
        expect_end(buf)?;
        return Ok(Envelope::default());
    }
    if declared > ENVELOPE_FIELDS {
        return Err(FrameError::TooManyFields {
            expected: ENVELOPE_FIELDS,
            found: declared,
        });
    }

    let command = if declared >= 1 {
        read_field(&mut buf)?
    } else {
        Bytes::new()
    };
    let payload = if declared >= 2 {
        read_field(&mut buf)?
    } else {
        Bytes::new()
    };
    expect_end(buf)?;

    Ok(Envelope { command, payload })
}

fn field_len(field: &[u8]) -> Result<i32> {
    i32::try_from(field.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: field.len(),
        max: i32::MAX as usize,
    })
}

fn read_field(buf: &mut &[u8]) -> Result<Bytes> {
    if buf.remaining() < LENGTH_PREFIX_SIZE {
        return Err(FrameError::Truncated {
            needed: LENGTH_PREFIX_SIZE,
            available: buf.remaining(),
        });
    }

    let len = buf.get_i32_le();
    if len == NULL_FIELD {
        return Ok(Bytes::new());
    }
    let len = usize::try_from(len).map_err(|_| FrameError::InvalidLength(len))?;
    if buf.remaining() < len {
        return Err(FrameError::Truncated {
            needed: len,
            available: buf.remaining(),
        });
    }

    let field = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(field)
}

fn expect_end(buf: &[u8]) -> Result<()> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(FrameError::TrailingBytes(buf.len()))
    }
}
