use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Packet header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "HR" (0x48 0x52).
pub const MAGIC: [u8; 2] = [0x48, 0x52];

/// Default maximum packet size: 16 KiB.
pub const DEFAULT_MAX_PACKET: usize = 16 * 1024;

/// Encode one packet for a byte-stream transport.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────┐
/// │ Magic (2B)   │ Length    │ Packet           │
/// │ 0x48 0x52    │ (4B LE)   │ (Length bytes)   │
/// │ "HR"         │           │                  │
/// └──────────────┴───────────┴──────────────────┘
/// ```
/// The packet is usually an encoded envelope; framing never looks inside it.
pub fn encode_packet(packet: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(packet.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: packet.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + packet.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_slice(packet);
    Ok(())
}

/// Decode one packet from the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete packet yet; on success
/// the packet bytes are consumed.
pub fn decode_packet(src: &mut BytesMut, max_packet: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if len > max_packet {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_packet,
        });
    }

    if src.len() < HEADER_SIZE + len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

/// Default bound on bytes queued for a peer that is not reading: 256 KiB.
pub const DEFAULT_MAX_PENDING: usize = 16 * DEFAULT_MAX_PACKET;

/// Default time queued bytes may wait for the stream to accept them: 5 s.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for packet readers and writers.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Maximum packet size in bytes. Default: 16 KiB.
    pub max_packet_size: usize,
    /// Maximum bytes [`PacketWriter::enqueue`](crate::PacketWriter::enqueue) may hold
    /// unsent. Default: 256 KiB.
    pub max_pending: usize,
    /// How long queued bytes may make no progress before the writer gives up.
    /// `None` waits forever. Default: 5 s.
    pub write_timeout: Option<Duration>,
}

impl PacketConfig {
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET,
            max_pending: DEFAULT_MAX_PENDING,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let mut buf = BytesMut::new();
        encode_packet(b"abc", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x48, 0x52, 3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn decode_consumes_one_packet() {
        let mut buf = BytesMut::new();
        encode_packet(b"first", &mut buf).unwrap();
        encode_packet(b"second", &mut buf).unwrap();

        let first = decode_packet(&mut buf, DEFAULT_MAX_PACKET)
            .unwrap()
            .unwrap();
        assert_eq!(first.as_ref(), b"first");
        let second = decode_packet(&mut buf, DEFAULT_MAX_PACKET)
            .unwrap()
            .unwrap();
        assert_eq!(second.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_input_waits_for_more() {
        let mut buf = BytesMut::from(&MAGIC[..]);
        assert!(decode_packet(&mut buf, DEFAULT_MAX_PACKET).unwrap().is_none());

        let mut buf = BytesMut::new();
        encode_packet(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_packet(&mut buf, DEFAULT_MAX_PACKET).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn empty_packet() {
        let mut buf = BytesMut::new();
        encode_packet(b"", &mut buf).unwrap();
        let packet = decode_packet(&mut buf, DEFAULT_MAX_PACKET)
            .unwrap()
            .unwrap();
        assert!(packet.is_empty());
    }

    #[test]
    fn invalid_magic() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0][..]);
        assert!(matches!(
            decode_packet(&mut buf, DEFAULT_MAX_PACKET),
            Err(FrameError::InvalidMagic)
        ));
    }

    #[test]
    fn oversized_packet_rejected_from_header() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le((DEFAULT_MAX_PACKET + 1) as u32);
        assert!(matches!(
            decode_packet(&mut buf, DEFAULT_MAX_PACKET),
            Err(FrameError::PayloadTooLarge { size, max })
                if size == DEFAULT_MAX_PACKET + 1 && max == DEFAULT_MAX_PACKET
        ));
    }

    #[test]
    fn config_builders() {
        let cfg = PacketConfig::default()
            .with_max_packet_size(64)
            .with_max_pending(256)
            .with_write_timeout(None);
        assert_eq!(cfg.max_packet_size, 64);
        assert_eq!(cfg.max_pending, 256);
        assert_eq!(cfg.write_timeout, None);
        assert_eq!(
            PacketConfig::default().write_timeout,
            Some(DEFAULT_WRITE_TIMEOUT)
        );
    }
}
