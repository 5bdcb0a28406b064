//! Wire formats for hashrpc.
//!
//! Two layers live here:
//! - the command envelope: a two-field object holding the command id (4 or 8
//!   little-endian bytes, depending on [`RpcHashWidth`]) and the serialized body;
//! - packet framing for byte streams: a 2-byte magic ("HR") and a 4-byte
//!   little-endian length in front of every packet.
//!
//! Transports that already preserve message boundaries carry envelopes directly.

pub mod envelope;
pub mod error;
pub mod packet;
pub mod reader;
pub mod width;
pub mod writer;

pub use envelope::{decode_envelope, encode_envelope, Envelope, ENVELOPE_FIELDS, NULL_ENVELOPE};
pub use error::{FrameError, Result};
pub use packet::{
    decode_packet, encode_packet, PacketConfig, DEFAULT_MAX_PACKET, DEFAULT_MAX_PENDING,
    DEFAULT_WRITE_TIMEOUT, HEADER_SIZE, MAGIC,
};
pub use reader::PacketReader;
pub use width::{CommandId, RpcHashWidth};
pub use writer::PacketWriter;
